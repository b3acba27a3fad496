//! Relative Strength Index with Wilder smoothing.
//!
//! The first average gain/loss is the simple mean of the first `period`
//! changes; every later change is folded in as
//! `avg = (avg * (period - 1) + x) / period`.

/// Fixed RSI level at which an open long is considered reversed.
pub const REVERSAL_LONG_EXIT: f64 = 70.0;
/// Fixed RSI level at which an open short is considered reversed.
pub const REVERSAL_SHORT_EXIT: f64 = 30.0;

/// Compute RSI over `closes` (oldest first).
///
/// Returns `None` when `period` is zero or there are fewer than
/// `period + 1` closes. A flat series is 50; a series with no losses is 100.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let p = period as f64;
    let mut changes = closes.windows(2).map(|w| w[1] - w[0]);

    let (mut avg_gain, mut avg_loss) = changes
        .by_ref()
        .take(period)
        .fold((0.0, 0.0), |(g, l), c| (g + c.max(0.0), l + (-c).max(0.0)));
    avg_gain /= p;
    avg_loss /= p;

    for change in changes {
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
    }

    Some(match (avg_gain == 0.0, avg_loss == 0.0) {
        (true, true) => 50.0,
        (_, true) => 100.0,
        _ => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(start: f64, changes: &[f64]) -> Vec<f64> {
        let mut closes = vec![start];
        for c in changes {
            let last = *closes.last().unwrap();
            closes.push(last + c);
        }
        closes
    }

    #[test]
    fn test_requires_period_plus_one() {
        assert_eq!(wilder_rsi(&[1.0; 14], 14), None);
        assert!(wilder_rsi(&[1.0; 15], 14).is_some());
        assert_eq!(wilder_rsi(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_flat_and_one_sided_series() {
        assert_eq!(wilder_rsi(&[100.0; 20], 14), Some(50.0));

        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(wilder_rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(wilder_rsi(&falling, 14), Some(0.0));
    }

    #[test]
    fn test_gain_share_over_first_window() {
        // One gain of 29.8 against losses totalling 70.2.
        let mut changes = vec![29.8];
        changes.extend([-5.4; 13]);
        let rsi = wilder_rsi(&series(1000.0, &changes), 14).unwrap();
        assert!((rsi - 29.8).abs() < 1e-9, "rsi = {rsi}");

        // One gain of 30.2 against losses totalling 69.8.
        let mut changes = vec![30.2];
        changes.extend([-5.4; 12]);
        changes.push(-5.0);
        let rsi = wilder_rsi(&series(1000.0, &changes), 14).unwrap();
        assert!((rsi - 30.2).abs() < 1e-9, "rsi = {rsi}");
    }

    #[test]
    fn test_smoothing_weights_recent_changes() {
        let mut changes = vec![1.0; 14];
        changes.push(-14.0);
        let rsi = wilder_rsi(&series(100.0, &changes), 14).unwrap();
        // avg_gain = 13/14, avg_loss = 1
        let expected = 100.0 - 100.0 / (1.0 + 13.0 / 14.0);
        assert!((rsi - expected).abs() < 1e-9);
    }
}
