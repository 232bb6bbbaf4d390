use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failure reported by a filter, cache or store collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TierError(pub String);

impl TierError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type TierResult<T> = std::result::Result<T, TierError>;
