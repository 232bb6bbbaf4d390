use crate::codec::CodecError;
use thiserror::Error;

pub type StateResult<T> = std::result::Result<T, StateError>;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("No state stored at {0}")]
    NotFound(String),

    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[cfg(feature = "redb")]
    #[error("ReDB error: {0}")]
    Redb(#[from] redb::Error),
}
