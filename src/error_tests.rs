//! Tests for error types

#[cfg(test)]
mod tests {
    use super::super::error::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = ForecastError::InsufficientData {
            required: 252,
            actual: 10,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: need at least 252 rows, got 10"
        );
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_no_models_trained_lists_attempts() {
        let err = ForecastError::NoModelsTrained {
            attempted: vec!["xgboost".to_string(), "ridge".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No models trained successfully (attempted: xgboost, ridge)"
        );
    }

    #[test]
    fn test_model_local_errors() {
        assert!(ForecastError::training("xgboost", "too few rows").is_model_local());
        assert!(ForecastError::prediction("ridge", "shape").is_model_local());
        assert!(!ForecastError::Validation("missing close".into()).is_model_local());
        assert!(!ForecastError::NoModelsTrained { attempted: vec![] }.is_model_local());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ForecastError = io.into();
        assert_eq!(err.kind(), "io_error");
        assert!(err.to_string().contains("gone"));
    }
}
