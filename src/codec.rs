//! Password-based authenticated encryption for persisted state.
//!
//! Blob layout (before base64): `salt[64] || iv[16] || tag[16] || ciphertext`.
//! The key is derived per blob with PBKDF2-HMAC-SHA512 over the embedded salt,
//! then used with AES-256-GCM (16-byte nonce, detached 16-byte tag). These
//! offsets are part of the on-disk format and must not change.

use aes_gcm::{
    AesGcm, KeyInit, Nonce, Tag,
    aead::{AeadInPlace, consts::U16},
    aes::Aes256,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 64;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;
pub const MIN_ITERATIONS: u32 = 100_000;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Authentication failed: wrong password or tampered data")]
    AuthenticationFailed,

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation needs at least 100000 iterations, got {iterations}")]
    WeakParameters { iterations: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    iterations: u32,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    pub fn new() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }

    pub fn with_iterations(iterations: u32) -> CodecResult<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(CodecError::WeakParameters { iterations });
        }
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, self.iterations, &mut key[..]);
        key
    }

    fn cipher(&self, password: &str, salt: &[u8]) -> CodecResult<Aes256Gcm16> {
        let key = self.derive_key(password, salt);
        Aes256Gcm16::new_from_slice(&key[..])
            .map_err(|e| CodecError::Encryption(e.to_string()))
    }

    /// Encrypts `data` under `password`. Fresh salt and IV per call, so equal
    /// inputs never produce equal blobs.
    pub fn encrypt(&self, data: &[u8], password: &str) -> CodecResult<String> {
        let mut rng = rand::rng();
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let cipher = self.cipher(password, &salt)?;
        let mut buffer = data.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&buffer);
        Ok(BASE64.encode(blob))
    }

    pub fn decrypt(&self, blob: &str, password: &str) -> CodecResult<Vec<u8>> {
        let raw = BASE64
            .decode(blob.trim())
            .map_err(|e| CodecError::MalformedInput(format!("invalid base64: {e}")))?;
        if raw.len() < HEADER_LEN {
            return Err(CodecError::MalformedInput(format!(
                "blob is {} bytes, header alone needs {HEADER_LEN}",
                raw.len()
            )));
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let cipher = self.cipher(password, salt)?;
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(iv),
                b"",
                &mut buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| CodecError::AuthenticationFailed)?;
        Ok(buffer)
    }

    /// Lowercase hex SHA-256.
    pub fn hash(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Constant-time comparison against a hex digest from [`Codec::hash`].
    pub fn verify_hash(data: &[u8], expected_hex: &str) -> bool {
        let actual = Self::hash(data);
        let expected = expected_hex.trim().to_ascii_lowercase();
        if actual.len() != expected.len() {
            return false;
        }
        actual.as_bytes().ct_eq(expected.as_bytes()).into()
    }
}
