//! Error types for the forecasting core

use thiserror::Error;

/// Forecasting errors
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Training failed for {model}: {reason}")]
    Training { model: String, reason: String },

    #[error("No models trained successfully (attempted: {})", .attempted.join(", "))]
    NoModelsTrained { attempted: Vec<String> },

    #[error("Prediction failed for {model}: {reason}")]
    Prediction { model: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ForecastError {
    pub fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Training {
            model: model.into(),
            reason: reason.into(),
        }
    }

    pub fn prediction(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Prediction {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable error kind, for the job layer
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Training { .. } => "training_error",
            Self::NoModelsTrained { .. } => "no_models_trained",
            Self::Prediction { .. } => "prediction_error",
            Self::Io(_) | Self::Csv(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Whether an ensemble may recover from this error by skipping one model
    pub fn is_model_local(&self) -> bool {
        matches!(self, Self::Training { .. } | Self::Prediction { .. })
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
