//! Stock Price Forecaster
//!
//! Feature engineering over daily OHLCV bars and performance-weighted
//! ensemble forecasting of future closes.
//!
//! ## Architecture
//!
//! ```text
//! CSV / RawSeries → FeatureEngineer → TrainingSet → EnsembleEngine ─┐
//!                        ↑                              ↑            ├→ ForecastResult
//!                   Indicators                  BaseLearner registry ┘
//!                                                       ↕
//!                                          ModelStore (LRU cache)
//! ```

pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod forecast;
pub mod indicators;
pub mod learners;
pub mod storage;
pub mod types;

#[cfg(test)]
mod types_tests;
#[cfg(test)]
mod error_tests;
