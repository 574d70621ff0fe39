//! Decimal <-> f64 conversions shared by the scoring code, plus saturating
//! conversions for configured intervals.
//!
//! Money stays in `Decimal`; weights, confidences and risk ratios are `f64`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Convert a ratio back to `Decimal`, trimmed to 10 places so binary float
/// noise does not leak into amounts.
pub fn f64_to_dec(v: f64) -> Decimal {
    if !v.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64_retain(v)
        .map(|d| d.round_dp(10))
        .unwrap_or(Decimal::ZERO)
}

/// Scale a decimal amount by a float factor
pub fn scale(amount: Decimal, factor: f64) -> Decimal {
    (amount * f64_to_dec(factor)).round_dp(8)
}

/// `ms * factor` as signed milliseconds, saturating at `i64::MAX`
pub fn scaled_ms(ms: u64, factor: i64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX).saturating_mul(factor)
}

/// Configured seconds as signed milliseconds, saturating at `i64::MAX`
pub fn secs_to_ms(secs: u64) -> i64 {
    scaled_ms(secs, 1000)
}

/// `now + secs`, clamped to the latest representable instant
pub fn add_secs(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    now.checked_add_signed(Duration::milliseconds(secs_to_ms(secs)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Simple returns between consecutive samples; zero bases are skipped
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0].abs() > f64::EPSILON)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}
