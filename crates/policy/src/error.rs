//! Policy specific errors for the Palisade sanitization engine.

#[derive(thiserror::Error, Debug, Clone)]
pub enum PolicyError {
    #[error("Invalid container class: {0:?}")]
    InvalidContainerClass(String),

    #[error("Invalid id suffix: {0:?}")]
    InvalidIdSuffix(String),
}

/// Result type for policy construction.
pub type PolicyResult<T> = Result<T, PolicyError>;
