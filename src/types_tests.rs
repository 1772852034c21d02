//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(d: u32, close: f64) -> Bar {
        Bar {
            date: day(d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_raw_series_from_bars() {
        let series = RawSeries::from_bars("AAPL", &[bar(1, 10.0), bar(2, 11.0)]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.symbol(), "AAPL");
        assert_eq!(series.column("CLOSE"), Some(&[10.0, 11.0][..]));
        assert_eq!(series.last_date(), Some(day(2)));
    }

    #[test]
    fn test_raw_series_rejects_unordered_dates() {
        let result = RawSeries::from_bars("AAPL", &[bar(2, 10.0), bar(1, 11.0)]);
        assert!(matches!(result, Err(crate::error::ForecastError::Validation(_))));
    }

    #[test]
    fn test_raw_series_rejects_duplicate_dates() {
        let result = RawSeries::from_bars("AAPL", &[bar(1, 10.0), bar(1, 11.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_series_rejects_ragged_columns() {
        let result = RawSeries::new(
            "AAPL",
            vec![day(1), day(2)],
            vec![("close".to_string(), vec![1.0])],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_without_column_and_tail() {
        let series =
            RawSeries::from_bars("AAPL", &[bar(1, 10.0), bar(2, 11.0), bar(3, 12.0)]).unwrap();
        let trimmed = series.without_column("Volume");
        assert!(trimmed.column("volume").is_none());
        assert!(trimmed.column("close").is_some());

        let tail = series.tail(2);
        assert_eq!(tail.dates(), &[day(2), day(3)]);
        assert_eq!(tail.column("close"), Some(&[11.0, 12.0][..]));
    }

    #[test]
    fn test_model_selector_parse() {
        let defaults = vec!["xgboost".to_string(), "ridge".to_string()];
        assert_eq!(
            ModelSelector::parse("ensemble", &defaults),
            ModelSelector::Ensemble(defaults.clone())
        );
        assert_eq!(
            ModelSelector::parse("ensemble:lightgbm, Ridge", &defaults),
            ModelSelector::Ensemble(vec!["lightgbm".to_string(), "ridge".to_string()])
        );
        assert_eq!(
            ModelSelector::parse("XGBoost", &defaults),
            ModelSelector::Single("xgboost".to_string())
        );
    }

    #[test]
    fn test_model_selector_serialization() {
        let single = ModelSelector::Single("ridge".to_string());
        assert_eq!(serde_json::to_string(&single).unwrap(), r#"{"single":"ridge"}"#);
        let ensemble: ModelSelector =
            serde_json::from_str(r#"{"ensemble":["xgboost","catboost"]}"#).unwrap();
        assert_eq!(ensemble.label(), "ensemble");
        assert_eq!(ensemble.model_types().len(), 2);
    }

    #[test]
    fn test_performance_metrics_exact() {
        let m = PerformanceMetrics::evaluate(&[100.0, 110.0], &[100.0, 110.0]);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mape, 0.0);
        assert_eq!(m.directional_accuracy, 100.0);
    }

    #[test]
    fn test_performance_metrics_uses_trailing_actuals() {
        // Only the last two actual values are compared
        let m = PerformanceMetrics::evaluate(&[1.0, 2.0, 100.0, 200.0], &[110.0, 190.0]);
        assert!((m.mae - 10.0).abs() < 1e-12);
        assert!((m.rmse - 10.0).abs() < 1e-12);
        assert!((m.mape - 7.5).abs() < 1e-9);
        assert_eq!(m.directional_accuracy, 100.0);
    }

    #[test]
    fn test_performance_metrics_truncates_predictions() {
        let m = PerformanceMetrics::evaluate(&[10.0, 9.0], &[10.0, 11.0, 12.0]);
        assert_eq!(m.directional_accuracy, 0.0);
        assert!((m.mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_performance_metrics_empty() {
        assert_eq!(PerformanceMetrics::evaluate(&[], &[1.0]), PerformanceMetrics::default());
    }

    #[test]
    fn test_forecast_point_skips_missing_interval() {
        let point = ForecastPoint {
            date: day(5),
            predicted_price: 101.5,
            confidence_lower: None,
            confidence_upper: None,
            probability_up: 0.5,
        };
        let json = serde_json::to_string(&point).unwrap();
        assert!(!json.contains("confidence_lower"));
        assert!(json.contains("\"date\":\"2024-01-05\""));
    }

    #[test]
    fn test_metrics_with_zero_close_survive_json() {
        let metrics = PerformanceMetrics::evaluate(&[0.0, 2.0], &[1.0, 3.0]);
        assert!(metrics.mape.is_infinite());

        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"mape\":null"));

        let back: PerformanceMetrics = serde_json::from_str(&json).unwrap();
        assert!(back.mape.is_nan());
        assert_eq!(back.mae, 1.0);
        assert_eq!(back.directional_accuracy, 100.0);
    }
}
