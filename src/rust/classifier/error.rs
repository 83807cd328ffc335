use std::io;

/// Represents the different types of errors that can occur in the part-number classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The pipeline cannot run with the given input or configuration
    /// (missing columns, an empty class, invalid hyperparameters)
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Error occurred while reading or parsing the input data
    #[error("Data error: {0}")]
    DataError(String),
    /// The input contains a character that is not part of the frozen vocabulary
    #[error("Unknown symbol {symbol:?} at position {position}")]
    UnknownSymbol { symbol: char, position: usize },
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred while building, training or running the network
    #[error("Model error: {0}")]
    ModelError(String),
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<candle_core::Error> for ClassifierError {
    fn from(err: candle_core::Error) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}

impl From<csv::Error> for ClassifierError {
    fn from(err: csv::Error) -> Self {
        ClassifierError::DataError(err.to_string())
    }
}

impl From<io::Error> for ClassifierError {
    fn from(err: io::Error) -> Self {
        ClassifierError::DataError(err.to_string())
    }
}
