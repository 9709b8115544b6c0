//! Day-level price statistics
//!
//! Tariff-style bands over local hours: off-peak 1 (00-08), peak (08-20) and
//! off-peak 2 (20-24). Bands are only filled once the day has enough hours to
//! cover them; everything else is plain arithmetic over the full day.

use crate::types::DailyStats;

/// Hours needed before off-peak 1 is computed
pub const OFF_PEAK_1_MIN_HOURS: usize = 8;

/// Hours needed before peak and off-peak 2 are computed
pub const PEAK_MIN_HOURS: usize = 20;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Compute statistics for one day
///
/// # Arguments
///
/// * `prices` - Prices in hour order (index 0 = 00:00)
/// * `current_price` - Price of the current hour, compared against the average
///
/// Never divides by zero: an empty day yields [`DailyStats::empty`].
///
/// # Example
///
/// ```
/// # use opcom_dam_prices::stats::compute;
/// let prices: Vec<f64> = (1..=24).map(|i| i as f64 * 10.0).collect();
/// let stats = compute(&prices, 100.0);
/// assert_eq!(stats.average, 125.0);
/// assert_eq!(stats.min, 10.0);
/// assert_eq!(stats.max, 240.0);
/// assert!(stats.low_price);
/// ```
pub fn compute(prices: &[f64], current_price: f64) -> DailyStats {
    if prices.is_empty() {
        return DailyStats::empty();
    }

    let average = mean(prices);

    let off_peak_1 = if prices.len() >= OFF_PEAK_1_MIN_HOURS {
        mean(&prices[..8])
    } else {
        0.0
    };

    let (peak, off_peak_2) = if prices.len() >= PEAK_MIN_HOURS {
        (mean(&prices[8..20]), mean(&prices[20..]))
    } else {
        (0.0, 0.0)
    };

    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let price_percent_to_average = if average > 0.0 {
        current_price / average
    } else {
        1.0
    };

    DailyStats {
        average,
        off_peak_1,
        off_peak_2,
        peak,
        min,
        max,
        mean: average,
        low_price: current_price < average,
        price_percent_to_average,
    }
}
