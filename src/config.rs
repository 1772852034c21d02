//! Configuration management
//!
//! Settings are read from an optional TOML file and then overridden by
//! environment variables prefixed with `FORECAST`. Every section has
//! serde defaults, so an empty file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ForecastError, Result};
use crate::indicators::IndicatorKind;
use crate::learners::{BoostingParams, RidgeParams};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub features: FeatureConfig,
    pub forecast: ForecastConfig,
    pub models: ModelsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from `path` (missing file is fine) plus environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("FORECAST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.forecast.validate()?;
        self.models.validate()?;
        if self.storage.model_cache_size == 0 {
            return Err(invalid("storage.model_cache_size must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ForecastError {
    ForecastError::Validation(msg.into())
}

/// Feature engineering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Indicators to calculate
    pub indicators: Vec<IndicatorKind>,
    /// Lag periods for close/volume/return lags
    pub lag_periods: Vec<usize>,
    /// Window sizes for rolling statistics
    pub rolling_windows: Vec<usize>,
    pub sma_windows: Vec<usize>,
    pub ema_windows: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
    pub williams_period: usize,
    pub cci_period: usize,
    pub adx_period: usize,
    pub realized_volatility_windows: Vec<usize>,
    pub momentum_periods: Vec<usize>,
    pub volume_windows: Vec<usize>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorKind::ALL.to_vec(),
            lag_periods: vec![1, 2, 3, 5, 10, 20, 50, 100, 200],
            rolling_windows: vec![5, 10, 20, 50, 100, 200],
            sma_windows: vec![5, 10, 20, 50, 100, 200],
            ema_windows: vec![5, 10, 20, 50, 100],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std: 2.0,
            stochastic_k: 14,
            stochastic_d: 3,
            williams_period: 14,
            cci_period: 20,
            adx_period: 14,
            realized_volatility_windows: vec![5, 10, 20, 50],
            momentum_periods: vec![1, 3, 5, 10, 20],
            volume_windows: vec![5, 10, 20, 50],
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lag_periods.iter().any(|&k| k == 0) {
            return Err(invalid("features.lag_periods must be positive"));
        }
        // Sample std over a single value is undefined for every row
        if self
            .rolling_windows
            .iter()
            .chain(&self.realized_volatility_windows)
            .any(|&w| w < 2)
        {
            return Err(invalid(
                "features.rolling_windows and realized_volatility_windows must be at least 2",
            ));
        }
        if self
            .sma_windows
            .iter()
            .chain(&self.ema_windows)
            .chain(&self.momentum_periods)
            .chain(&self.volume_windows)
            .any(|&w| w == 0)
        {
            return Err(invalid("features windows and periods must be positive"));
        }
        let periods = [
            self.rsi_period,
            self.macd_fast,
            self.macd_slow,
            self.macd_signal,
            self.stochastic_k,
            self.stochastic_d,
            self.williams_period,
            self.cci_period,
            self.adx_period,
        ];
        if periods.contains(&0) || self.bollinger_period < 2 {
            return Err(invalid("features indicator periods must be positive"));
        }
        if !self.bollinger_std.is_finite() || self.bollinger_std < 0.0 {
            return Err(invalid("features.bollinger_std must be non-negative"));
        }
        Ok(())
    }
}

/// Forecast orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Minimum raw rows required before forecasting
    pub min_historical_data_days: usize,
    pub default_horizon: usize,
    pub max_forecast_horizon: usize,
    /// Holdout fraction for `train_model`
    pub test_size: f64,
    /// Model types blended by the `ensemble` selector
    pub ensemble_models: Vec<String>,
    /// Added to error terms before inverting them into weights
    pub weight_epsilon: f64,
    /// z-score of the ensemble confidence interval
    pub confidence_z: f64,
    /// Band width of the single-model path, as a fraction of prediction std
    pub single_model_band_fraction: f64,
    /// Confidence reported by the single-model path
    pub single_model_confidence: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_historical_data_days: 252,
            default_horizon: 7,
            max_forecast_horizon: 90,
            test_size: 0.2,
            ensemble_models: vec![
                "xgboost".to_string(),
                "lightgbm".to_string(),
                "catboost".to_string(),
            ],
            weight_epsilon: 1e-8,
            confidence_z: 1.96,
            single_model_band_fraction: 0.1,
            single_model_confidence: 0.8,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_forecast_horizon == 0 {
            return Err(invalid("forecast.max_forecast_horizon must be at least 1"));
        }
        self.check_horizon(self.default_horizon)?;
        self.check_test_size(self.test_size)?;
        if self.min_historical_data_days == 0 {
            return Err(invalid("forecast.min_historical_data_days must be at least 1"));
        }
        if !(self.weight_epsilon > 0.0 && self.weight_epsilon.is_finite()) {
            return Err(invalid("forecast.weight_epsilon must be positive"));
        }
        if !(self.confidence_z > 0.0 && self.confidence_z.is_finite()) {
            return Err(invalid("forecast.confidence_z must be positive"));
        }
        if !(0.0..=1.0).contains(&self.single_model_confidence) {
            return Err(invalid("forecast.single_model_confidence must be in [0, 1]"));
        }
        Ok(())
    }

    pub fn check_horizon(&self, horizon: usize) -> Result<()> {
        if horizon == 0 || horizon > self.max_forecast_horizon {
            return Err(invalid(format!(
                "horizon {} outside [1, {}]",
                horizon, self.max_forecast_horizon
            )));
        }
        Ok(())
    }

    pub fn check_test_size(&self, test_size: f64) -> Result<()> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(invalid(format!("test_size {} outside (0, 1)", test_size)));
        }
        Ok(())
    }
}

/// Learner hyper-parameters, keyed by model type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Rows below which a learner refuses to train
    pub min_training_rows: usize,
    pub xgboost: BoostingParams,
    pub lightgbm: BoostingParams,
    pub catboost: BoostingParams,
    pub ridge: RidgeParams,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            min_training_rows: 10,
            xgboost: BoostingParams::xgboost(),
            lightgbm: BoostingParams::lightgbm(),
            catboost: BoostingParams::catboost(),
            ridge: RidgeParams::default(),
        }
    }
}

impl ModelsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_training_rows < 2 {
            return Err(invalid("models.min_training_rows must be at least 2"));
        }
        for (name, params) in [
            ("xgboost", &self.xgboost),
            ("lightgbm", &self.lightgbm),
            ("catboost", &self.catboost),
        ] {
            params
                .validate()
                .map_err(|e| invalid(format!("models.{}: {}", name, e)))?;
        }
        if !(self.ridge.alpha > 0.0 && self.ridge.alpha.is_finite()) {
            return Err(invalid("models.ridge.alpha must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Trained models kept in memory
    pub model_cache_size: usize,
    /// Directory for forecast result JSON files
    pub results_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_cache_size: 10,
            results_dir: "./results".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn results_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.results_dir).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
