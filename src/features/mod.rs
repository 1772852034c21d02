//! Feature engineering pipeline
//!
//! Turns a [`RawSeries`] into a wide [`FeatureMatrix`]: base OHLCV columns,
//! technical indicators, lags, rolling statistics, calendar fields, realized
//! volatility, price shape and volume features. Rows with any non-finite
//! value are dropped at the end, so the matrix never carries warm-up rows.


use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

use crate::config::FeatureConfig;
use crate::error::{ForecastError, Result};
use crate::indicators::{self, IndicatorKind};
use crate::types::{RawSeries, REQUIRED_COLUMNS};

/// Date-indexed feature rows with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(dates: Vec<NaiveDate>, names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if dates.len() != rows.len() {
            return Err(ForecastError::Validation(format!(
                "{} dates for {} feature rows",
                dates.len(),
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != names.len()) {
            return Err(ForecastError::Validation(format!(
                "feature row has {} values, expected {}",
                row.len(),
                names.len()
            )));
        }
        Ok(Self { dates, names, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Copy of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Rows `[start, end)`
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        Self {
            dates: self.dates[start..end].to_vec(),
            names: self.names.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    pub fn head(&self, n: usize) -> Self {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> Self {
        self.slice(self.len().saturating_sub(n), self.len())
    }
}

/// Feature rows paired with the close `horizon` steps ahead
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub features: FeatureMatrix,
    pub targets: Vec<f64>,
    pub horizon: usize,
}

impl TrainingSet {
    /// Shift the `close` column back by `horizon` rows; the last `horizon`
    /// rows have no future target and are dropped.
    pub fn from_features(matrix: &FeatureMatrix, horizon: usize) -> Result<Self> {
        if horizon == 0 {
            return Err(ForecastError::Validation(
                "target horizon must be at least 1".to_string(),
            ));
        }
        let close = matrix.column("close").ok_or_else(|| {
            ForecastError::Validation("feature matrix has no close column".to_string())
        })?;

        let usable = matrix.len().saturating_sub(horizon);
        let targets = close[horizon.min(close.len())..].to_vec();

        Ok(Self {
            features: matrix.head(usable),
            targets,
            horizon,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Chronological split: the first `floor(n * (1 - test_size))` rows
    /// train, the rest are held out. Both halves keep at least one row when
    /// possible.
    pub fn split(&self, test_size: f64) -> (TrainingSet, TrainingSet) {
        let n = self.len();
        let cut = if n >= 2 {
            ((n as f64 * (1.0 - test_size)).floor() as usize).clamp(1, n - 1)
        } else {
            n
        };

        let train = TrainingSet {
            features: self.features.slice(0, cut),
            targets: self.targets[..cut].to_vec(),
            horizon: self.horizon,
        };
        let test = TrainingSet {
            features: self.features.slice(cut, n),
            targets: self.targets[cut..].to_vec(),
            horizon: self.horizon,
        };
        (train, test)
    }
}

/// Column store used while stages run. Inserting an existing name replaces
/// the column in place so the column order stays stable.
struct Frame {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
}

impl Frame {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&idx) => self.columns[idx] = values,
            None => {
                self.index.insert(name.clone(), self.names.len());
                self.names.push(name);
                self.columns.push(values);
            }
        }
    }
}

/// Validated OHLCV columns of one series
struct Ohlcv<'a> {
    open: &'a [f64],
    high: &'a [f64],
    low: &'a [f64],
    close: &'a [f64],
    volume: &'a [f64],
}

impl<'a> Ohlcv<'a> {
    fn from_series(raw: &'a RawSeries) -> Result<Self> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for (name, _) in raw.columns() {
            let lower = name.to_lowercase();
            if let Some(previous) = seen.insert(lower.clone(), name) {
                return Err(ForecastError::Validation(format!(
                    "columns '{}' and '{}' collide as '{}'",
                    previous, name, lower
                )));
            }
        }

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !seen.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::Validation(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let ohlcv = Self {
            open: required(raw, "open"),
            high: required(raw, "high"),
            low: required(raw, "low"),
            close: required(raw, "close"),
            volume: required(raw, "volume"),
        };
        ohlcv.check_bars(raw.dates())?;
        Ok(ohlcv)
    }

    fn check_bars(&self, dates: &[NaiveDate]) -> Result<()> {
        for (i, date) in dates.iter().enumerate() {
            let (o, h, l, c, v) = (
                self.open[i],
                self.high[i],
                self.low[i],
                self.close[i],
                self.volume[i],
            );
            let fields = [o, h, l, c, v];
            if fields.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(ForecastError::Validation(format!(
                    "bar {} has a non-finite or negative value",
                    date
                )));
            }
            if h < l || h < o.max(c) || l > o.min(c) {
                return Err(ForecastError::Validation(format!(
                    "bar {} breaks the high/low range (o={}, h={}, l={}, c={})",
                    date, o, h, l, c
                )));
            }
        }
        Ok(())
    }
}

// Presence is checked before lookup
fn required<'a>(raw: &'a RawSeries, name: &str) -> &'a [f64] {
    raw.column(name).unwrap_or(&[])
}

/// Builds feature matrices from raw OHLCV history
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Run every stage and drop rows with undefined values
    pub fn engineer(&self, raw: &RawSeries) -> Result<FeatureMatrix> {
        let ohlcv = Ohlcv::from_series(raw)?;
        let mut frame = Frame::new();

        frame.insert("open", ohlcv.open.to_vec());
        frame.insert("high", ohlcv.high.to_vec());
        frame.insert("low", ohlcv.low.to_vec());
        frame.insert("close", ohlcv.close.to_vec());
        frame.insert("volume", ohlcv.volume.to_vec());

        self.add_technical_indicators(&mut frame, &ohlcv);
        self.add_lag_features(&mut frame, &ohlcv);
        self.add_rolling_statistics(&mut frame, &ohlcv);
        add_calendar_features(&mut frame, raw.dates());
        self.add_volatility_features(&mut frame, &ohlcv);
        self.add_price_features(&mut frame, &ohlcv);
        self.add_volume_features(&mut frame, &ohlcv);

        let matrix = drop_undefined_rows(frame, raw.dates())?;

        tracing::info!(
            "Engineered {} features for {}: {} of {} rows kept",
            matrix.num_features(),
            raw.symbol(),
            matrix.len(),
            raw.len()
        );
        Ok(matrix)
    }

    fn add_technical_indicators(&self, frame: &mut Frame, data: &Ohlcv) {
        let cfg = &self.config;
        let close = data.close;

        for kind in &cfg.indicators {
            match kind {
                IndicatorKind::Sma => {
                    for &w in &cfg.sma_windows {
                        let avg = indicators::sma(close, w);
                        let ratio = indicators::price_ratio(close, &avg);
                        frame.insert(format!("sma_{}", w), avg);
                        frame.insert(format!("price_sma_{}_ratio", w), ratio);
                    }
                }
                IndicatorKind::Ema => {
                    for &w in &cfg.ema_windows {
                        let avg = indicators::ema(close, w);
                        let ratio = indicators::price_ratio(close, &avg);
                        frame.insert(format!("ema_{}", w), avg);
                        frame.insert(format!("price_ema_{}_ratio", w), ratio);
                    }
                }
                IndicatorKind::Rsi => {
                    frame.insert("rsi", indicators::rsi(close, cfg.rsi_period));
                }
                IndicatorKind::Macd => {
                    let m = indicators::macd(close, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
                    frame.insert("macd", m.macd);
                    frame.insert("macd_signal", m.signal);
                    frame.insert("macd_histogram", m.histogram);
                }
                IndicatorKind::BollingerBands => {
                    let bb =
                        indicators::bollinger_bands(close, cfg.bollinger_period, cfg.bollinger_std);
                    frame.insert("bb_upper", bb.upper);
                    frame.insert("bb_lower", bb.lower);
                    frame.insert("bb_middle", bb.middle);
                    frame.insert("bb_width", bb.width);
                    frame.insert("bb_position", bb.position);
                }
                IndicatorKind::Stochastic => {
                    let s = indicators::stochastic(
                        data.high,
                        data.low,
                        close,
                        cfg.stochastic_k,
                        cfg.stochastic_d,
                    );
                    frame.insert("stoch_k", s.k);
                    frame.insert("stoch_d", s.d);
                }
                IndicatorKind::WilliamsR => {
                    frame.insert(
                        "williams_r",
                        indicators::williams_r(data.high, data.low, close, cfg.williams_period),
                    );
                }
                IndicatorKind::Cci => {
                    frame.insert(
                        "cci",
                        indicators::cci(data.high, data.low, close, cfg.cci_period),
                    );
                }
                IndicatorKind::Adx => {
                    frame.insert(
                        "adx_approx",
                        indicators::adx_approx(data.high, data.low, close, cfg.adx_period),
                    );
                }
            }
        }
    }

    fn add_lag_features(&self, frame: &mut Frame, data: &Ohlcv) {
        for &k in &self.config.lag_periods {
            frame.insert(format!("close_lag_{}", k), indicators::shift(data.close, k));
            frame.insert(format!("volume_lag_{}", k), indicators::shift(data.volume, k));
            frame.insert(
                format!("return_lag_{}", k),
                indicators::pct_change(data.close, k),
            );
        }
    }

    fn add_rolling_statistics(&self, frame: &mut Frame, data: &Ohlcv) {
        let returns = indicators::pct_change(data.close, 1);
        for &w in &self.config.rolling_windows {
            frame.insert(
                format!("close_rolling_mean_{}", w),
                indicators::rolling_mean(data.close, w),
            );
            frame.insert(
                format!("close_rolling_std_{}", w),
                indicators::rolling_std(data.close, w),
            );
            frame.insert(
                format!("close_rolling_min_{}", w),
                indicators::rolling_min(data.close, w),
            );
            frame.insert(
                format!("close_rolling_max_{}", w),
                indicators::rolling_max(data.close, w),
            );
            frame.insert(
                format!("volume_rolling_mean_{}", w),
                indicators::rolling_mean(data.volume, w),
            );
            frame.insert(
                format!("volume_rolling_std_{}", w),
                indicators::rolling_std(data.volume, w),
            );
            frame.insert(
                format!("volatility_{}", w),
                indicators::rolling_std(&returns, w),
            );
        }
    }

    fn add_volatility_features(&self, frame: &mut Frame, data: &Ohlcv) {
        let returns = indicators::pct_change(data.close, 1);
        for &w in &self.config.realized_volatility_windows {
            frame.insert(
                format!("realized_volatility_{}", w),
                indicators::rolling_std(&returns, w),
            );
        }
    }

    fn add_price_features(&self, frame: &mut Frame, data: &Ohlcv) {
        let n = data.close.len();
        let (open, high, low, close) = (data.open, data.high, data.low, data.close);

        frame.insert("price_change", indicators::diff(close, 1));
        frame.insert("price_change_pct", indicators::pct_change(close, 1));

        let hl: Vec<f64> = (0..n).map(|i| high[i] - low[i]).collect();
        let oc: Vec<f64> = (0..n).map(|i| close[i] - open[i]).collect();
        let hl_pct = (0..n).map(|i| hl[i] / close[i]).collect();
        let oc_pct = (0..n).map(|i| oc[i] / open[i]).collect();
        let position = (0..n).map(|i| (close[i] - low[i]) / hl[i]).collect();
        frame.insert("hl_spread", hl);
        frame.insert("hl_spread_pct", hl_pct);
        frame.insert("oc_spread", oc);
        frame.insert("oc_spread_pct", oc_pct);
        frame.insert("price_position", position);

        for &p in &self.config.momentum_periods {
            frame.insert(format!("momentum_{}", p), indicators::pct_change(close, p));
        }
    }

    fn add_volume_features(&self, frame: &mut Frame, data: &Ohlcv) {
        let volume = data.volume;

        frame.insert("volume_change", indicators::diff(volume, 1));
        frame.insert("volume_change_pct", indicators::pct_change(volume, 1));

        for &w in &self.config.volume_windows {
            let avg = indicators::rolling_mean(volume, w);
            let ratio = indicators::price_ratio(volume, &avg);
            frame.insert(format!("volume_sma_{}", w), avg);
            frame.insert(format!("volume_ratio_{}", w), ratio);
        }

        let flow: Vec<f64> = volume
            .iter()
            .zip(indicators::pct_change(data.close, 1))
            .map(|(v, r)| v * r)
            .collect();
        frame.insert("volume_price_trend", indicators::cumsum_skip_nan(&flow));
        frame.insert("obv", indicators::obv(data.close, volume));
    }
}

fn add_calendar_features(frame: &mut Frame, dates: &[NaiveDate]) {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let month_end = |d: &NaiveDate| d.succ_opt().map_or(true, |next| next.month() != d.month());

    frame.insert(
        "day_of_week",
        dates
            .iter()
            .map(|d| d.weekday().num_days_from_monday() as f64)
            .collect(),
    );
    frame.insert("day_of_month", dates.iter().map(|d| d.day() as f64).collect());
    frame.insert("month", dates.iter().map(|d| d.month() as f64).collect());
    frame.insert(
        "quarter",
        dates.iter().map(|d| ((d.month() - 1) / 3 + 1) as f64).collect(),
    );
    frame.insert("year", dates.iter().map(|d| d.year() as f64).collect());
    frame.insert(
        "is_month_end",
        dates.iter().map(|d| flag(month_end(d))).collect(),
    );
    frame.insert(
        "is_quarter_end",
        dates
            .iter()
            .map(|d| flag(month_end(d) && d.month() % 3 == 0))
            .collect(),
    );
    frame.insert(
        "is_year_end",
        dates
            .iter()
            .map(|d| flag(d.month() == 12 && d.day() == 31))
            .collect(),
    );
}

fn drop_undefined_rows(frame: Frame, dates: &[NaiveDate]) -> Result<FeatureMatrix> {
    let mut kept_dates = Vec::new();
    let mut rows = Vec::new();

    for (i, date) in dates.iter().enumerate() {
        let row: Vec<f64> = frame.columns.iter().map(|c| c[i]).collect();
        if row.iter().all(|v| v.is_finite()) {
            kept_dates.push(*date);
            rows.push(row);
        }
    }

    let dropped = dates.len() - rows.len();
    if dropped > 0 {
        tracing::debug!("Dropped {} rows with undefined features", dropped);
    }
    FeatureMatrix::new(kept_dates, frame.names, rows)
}
