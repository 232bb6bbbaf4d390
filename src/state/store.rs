use super::{FileBackend, StateBackend, StateError, StateResult};
use crate::bloom::FilterState;
use crate::codec::Codec;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::debug;

/// Encrypts, writes, reads and validates persisted state. Owns no logic
/// beyond the encode/validate round trip.
#[derive(Clone)]
pub struct StateStore {
    codec: Codec,
    backend: Arc<dyn StateBackend>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::file()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateStore {{ iterations: {} }}", self.codec.iterations())
    }
}

impl StateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            codec: Codec::new(),
            backend,
        }
    }

    /// Store backed by plain files.
    pub fn file() -> Self {
        Self::new(Arc::new(FileBackend))
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn exists(&self, location: &str) -> StateResult<bool> {
        self.backend.exists(location)
    }

    pub fn remove(&self, location: &str) -> StateResult<()> {
        self.backend.remove(location)
    }

    pub fn save_value<T: Serialize + ?Sized>(
        &self,
        value: &T,
        location: &str,
        password: &str,
    ) -> StateResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StateError::Backend(format!("Failed to encode state: {e}")))?;
        let blob = self.codec.encrypt(&bytes, password)?;
        self.backend.write(location, &blob)?;
        debug!(location, bytes = bytes.len(), "State saved");
        Ok(())
    }

    /// Reads and decrypts. A payload that decrypts but doesn't parse as `T`
    /// is reported as [`StateError::CorruptState`].
    pub fn load_value<T: DeserializeOwned>(
        &self,
        location: &str,
        password: &str,
    ) -> StateResult<T> {
        let blob = self
            .backend
            .read(location)?
            .ok_or_else(|| StateError::NotFound(location.to_string()))?;
        let bytes = self.codec.decrypt(&blob, password)?;
        serde_json::from_slice(&bytes).map_err(|e| StateError::CorruptState(e.to_string()))
    }

    pub fn save(&self, state: &FilterState, location: &str, password: &str) -> StateResult<()> {
        self.save_value(state, location, password)
    }

    pub fn load(&self, location: &str, password: &str) -> StateResult<FilterState> {
        let state: FilterState = self.load_value(location, password)?;
        state
            .validate()
            .map_err(|e| StateError::CorruptState(e.to_string()))?;
        Ok(state)
    }
}
