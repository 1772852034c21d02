//! Unit tests for indicator library

use super::*;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_sma_warmup_and_values() {
    let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let result = sma(&prices, 3);
    assert!(result[0].is_nan());
    assert!(result[1].is_nan());
    assert_close(result[2], 2.0);
    assert_close(result[4], 4.0);
}

#[test]
fn test_sma_longer_than_series() {
    let result = sma(&[1.0, 2.0], 5);
    assert!(result.iter().all(|v| v.is_nan()));
}

#[test]
fn test_ema_bias_adjusted() {
    // span 3 => alpha 0.5, weights 1, 0.5
    let result = ema(&[2.0, 4.0], 3);
    assert_close(result[0], 2.0);
    assert_close(result[1], (4.0 + 0.5 * 2.0) / 1.5);
}

#[test]
fn test_ema_tracks_recent_values() {
    let prices: Vec<f64> = (1..=20).map(|i| i as f64).collect();
    let result = ema(&prices, 5);
    assert!(result[19] > 10.5);
    assert!(result[19] < 20.0);
}

#[test]
fn test_price_ratio() {
    let ratio = price_ratio(&[10.0, 12.0], &[5.0, 12.0]);
    assert_eq!(ratio, vec![2.0, 1.0]);
}

#[test]
fn test_rsi_uptrend_saturates() {
    let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let result = rsi(&prices, 14);
    assert!(result[..14].iter().all(|v| v.is_nan()));
    // zero average loss: RS is infinite, RSI hits 100
    assert_close(result[14], 100.0);
    assert_close(result[29], 100.0);
}

#[test]
fn test_rsi_flat_prices_undefined() {
    let prices = vec![50.0; 20];
    let result = rsi(&prices, 14);
    assert!(result[19].is_nan());
}

#[test]
fn test_rsi_mixed() {
    let prices = vec![10.0, 11.0, 10.0, 11.0, 10.0];
    let result = rsi(&prices, 4);
    assert_close(result[4], 50.0);
}

#[test]
fn test_macd_histogram_is_line_minus_signal() {
    let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
    let result = macd(&prices, 12, 26, 9);
    for i in 0..prices.len() {
        assert_close(result.histogram[i], result.macd[i] - result.signal[i]);
    }
}

#[test]
fn test_macd_positive_in_uptrend() {
    let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
    let result = macd(&prices, 12, 26, 9);
    assert!(result.macd[59] > 0.0);
}

#[test]
fn test_bollinger_bands_ordering() {
    let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
    let bands = bollinger_bands(&prices, 20, 2.0);
    for i in 19..40 {
        assert!(bands.lower[i] <= bands.middle[i]);
        assert!(bands.middle[i] <= bands.upper[i]);
        assert!(bands.width[i] > 0.0);
    }
    assert!(bands.position[10].is_nan());
}

#[test]
fn test_bollinger_position_at_mean() {
    let prices = vec![1.0, 3.0, 2.0];
    let bands = bollinger_bands(&prices, 3, 2.0);
    assert_close(bands.position[2], 0.5);
}

#[test]
fn test_stochastic_bounds() {
    let close: Vec<f64> = (0..30).map(|i| 50.0 + (i as f64 * 0.7).cos() * 3.0).collect();
    let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
    let result = stochastic(&high, &low, &close, 14, 3);
    for v in result.k.iter().filter(|v| !v.is_nan()) {
        assert!((0.0..=100.0).contains(v));
    }
    assert!(result.d[14].is_nan());
    assert!(!result.d[15].is_nan());
}

#[test]
fn test_williams_r_range() {
    let close = vec![10.0, 11.0, 12.0];
    let high = vec![10.5, 11.5, 12.0];
    let low = vec![9.5, 10.5, 11.5];
    let result = williams_r(&high, &low, &close, 3);
    // close at the highest high
    assert_close(result[2], 0.0);
}

#[test]
fn test_cci_zero_deviation_is_undefined() {
    let flat = vec![10.0; 25];
    let result = cci(&flat, &flat, &flat, 20);
    assert!(result[24].is_nan());
}

#[test]
fn test_cci_sign_follows_trend() {
    let close: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
    let result = cci(&high, &low, &close, 20);
    assert!(result[29] > 0.0);
}

#[test]
fn test_adx_approx_is_mean_true_range() {
    let close = vec![10.0, 11.0, 10.0, 12.0];
    let high = vec![10.5, 11.5, 11.0, 12.5];
    let low = vec![9.5, 10.0, 9.0, 10.0];
    let tr = true_range(&high, &low, &close);
    assert!(tr[0].is_nan());
    assert_close(tr[1], 1.5);
    assert_close(tr[2], 2.0);
    assert_close(tr[3], 2.5);

    let adx = adx_approx(&high, &low, &close, 2);
    assert!(adx[1].is_nan());
    assert_close(adx[2], 1.75);
    assert_close(adx[3], 2.25);
}

#[test]
fn test_obv_accumulates_signed_volume() {
    let close = vec![10.0, 11.0, 11.0, 9.0];
    let volume = vec![100.0, 200.0, 300.0, 50.0];
    assert_eq!(obv(&close, &volume), vec![100.0, 300.0, 300.0, 250.0]);
}

#[test]
fn test_pct_change_and_shift() {
    let values = vec![100.0, 110.0, 121.0];
    let change = pct_change(&values, 1);
    assert!(change[0].is_nan());
    assert_close(change[1], 0.1);
    assert_close(change[2], 0.1);
    let lagged = shift(&values, 2);
    assert!(lagged[1].is_nan());
    assert_eq!(lagged[2], 100.0);
}

#[test]
fn test_rolling_std_is_sample_std() {
    let result = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
    assert_close(result[7], (32.0f64 / 7.0).sqrt());
}

#[test]
fn test_rolling_window_with_nan_is_undefined() {
    let result = rolling_mean(&[f64::NAN, 1.0, 2.0, 3.0], 2);
    assert!(result[1].is_nan());
    assert_close(result[2], 1.5);
}

#[test]
fn test_cumsum_skip_nan() {
    let result = cumsum_skip_nan(&[f64::NAN, 1.0, f64::NAN, 2.0]);
    assert!(result[0].is_nan());
    assert_eq!(result[1], 1.0);
    assert!(result[2].is_nan());
    assert_eq!(result[3], 3.0);
}

#[test]
fn test_indicator_kind_names() {
    assert_eq!(IndicatorKind::BollingerBands.as_str(), "bollinger_bands");
    let parsed: IndicatorKind = serde_json::from_str("\"williams_r\"").unwrap();
    assert_eq!(parsed, IndicatorKind::WilliamsR);
    assert_eq!(IndicatorKind::ALL.len(), 9);
}
