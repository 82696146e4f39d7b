use ort::Error as OrtError;
use std::fmt;
use std::io;

/// Represents the different types of errors that can occur while preparing data,
/// training, predicting or updating an expense classifier.
#[derive(Debug)]
pub enum ClassifierError {
    /// Error occurred while loading or using the tokenizer
    TokenizerError(String),
    /// Error occurred while loading or running the ONNX encoder, or with persisted model parameters
    ModelError(String),
    /// Error occurred during the build phase
    BuildError(String),
    /// Error occurred while making predictions
    PredictionError(String),
    /// Error occurred due to invalid input parameters or records
    ValidationError(String),
    /// A category (or encoded index) that the label encoder was never fitted on
    UnseenLabel(String),
    /// Filesystem error while reading or writing artifacts
    IoError(io::Error),
    /// Malformed CSV or JSON content
    DataError(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenizerError(msg) => write!(f, "Tokenizer error: {}", msg),
            Self::ModelError(msg) => write!(f, "Model error: {}", msg),
            Self::BuildError(msg) => write!(f, "Build error: {}", msg),
            Self::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::UnseenLabel(msg) => write!(f, "Unseen label: {}", msg),
            Self::IoError(err) => write!(f, "IO error: {}", err),
            Self::DataError(msg) => write!(f, "Data error: {}", msg),
        }
    }
}

impl std::error::Error for ClassifierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::BuildError(err.to_string())
    }
}

impl From<io::Error> for ClassifierError {
    fn from(err: io::Error) -> Self {
        ClassifierError::IoError(err)
    }
}

impl From<csv::Error> for ClassifierError {
    fn from(err: csv::Error) -> Self {
        ClassifierError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::DataError(err.to_string())
    }
}

impl From<tempfile::PersistError> for ClassifierError {
    fn from(err: tempfile::PersistError) -> Self {
        ClassifierError::IoError(err.error)
    }
}
