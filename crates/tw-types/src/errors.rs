use thiserror::Error;

/// Main error type for TurboWorks optimization loops
#[derive(Error, Debug)]
pub enum TwError {
    /// Missing or contradictory addressing / required parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed space, or a space that must be finite and is not.
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("The search space has been exhausted: all {size} points have been evaluated")]
    ExhaustedSpace { size: usize },

    #[error("The key {key} was not found anywhere in the {collection} collection")]
    KeyNotFound { key: String, collection: String },

    #[error("Predictor {backend} did not call correctly: {message}")]
    Predictor { backend: String, message: String },

    /// Malformed or empty data, or type-mismatched argument containers.
    #[error("Input error: {0}")]
    Input(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query execution failed: {query}, error: {error}")]
    QueryFailed { query: String, error: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Document corrupted: {message}")]
    Corrupt { message: String },
}

/// Result type alias for TurboWorks operations
pub type TwResult<T> = Result<T, TwError>;

impl TwError {
    pub fn predictor(backend: impl Into<String>, message: impl ToString) -> Self {
        TwError::Predictor {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn key_not_found(key: impl Into<String>, collection: impl Into<String>) -> Self {
        TwError::KeyNotFound {
            key: key.into(),
            collection: collection.into(),
        }
    }
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TwError::Configuration(format!($($arg)*))
    };
}

/// Macro for creating input errors
#[macro_export]
macro_rules! input_error {
    ($($arg:tt)*) => {
        $crate::TwError::Input(format!($($arg)*))
    };
}

/// Macro for creating domain errors
#[macro_export]
macro_rules! domain_error {
    ($($arg:tt)*) => {
        $crate::TwError::Domain(format!($($arg)*))
    };
}
