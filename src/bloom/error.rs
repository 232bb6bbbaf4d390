use thiserror::Error;

pub type FilterResult<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unsupported element type: {0}")]
    UnsupportedType(String),

    #[error("Invalid filter state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        FilterError::Serialization(err.to_string())
    }
}
