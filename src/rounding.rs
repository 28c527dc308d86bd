//! Numeric policy for every derived quantity.
//!
//! All derivations round half away from zero, and each one rounds exactly
//! once, at the step spelled out below. Re-running a derivation on its own
//! output returns the same value, which is what keeps reconciliation
//! idempotent.

/// Round to the nearest integer, ties away from zero.
pub fn nearest(value: f64) -> f64 {
    value.round()
}

/// Round to `places` decimal places, ties away from zero.
pub fn decimals(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// Sampling ratio in percent: `round(100 * sampling / total)`.
///
/// The ratio is kept as a whole percentage.
pub fn ratio_percent(sampling_weight: f64, total_weight: f64) -> f64 {
    nearest(100.0 * sampling_weight / total_weight)
}

/// Sampling weight from a total and a ratio: `round(total * pct) / 100`.
///
/// The product is rounded to an integer before the division by 100.
pub fn sampling_weight(total_weight: f64, ratio_pct: f64) -> f64 {
    nearest(total_weight * ratio_pct) / 100.0
}

/// Total weight from a sampling weight and a ratio:
/// `round(sampling * (100 / pct) * 100) / 100`, i.e. two decimal places.
pub fn total_weight(sampling_weight: f64, ratio_pct: f64) -> f64 {
    nearest(sampling_weight * (100.0 / ratio_pct) * 100.0) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_ties_away_from_zero() {
        assert_eq!(nearest(2.5), 3.0);
        assert_eq!(nearest(0.5), 1.0);
        assert_eq!(nearest(2.4), 2.0);
        assert_eq!(nearest(-2.5), -3.0);
    }

    #[test]
    fn decimals_rounds_at_the_requested_place() {
        assert_eq!(decimals(1.005, 2), 1.0); // 1.005 is stored below the tie
        assert_eq!(decimals(1.25, 1), 1.3);
        assert_eq!(decimals(12.3456, 2), 12.35);
        assert_eq!(decimals(12.3456, 0), 12.0);
    }

    #[test]
    fn ratio_is_a_whole_percentage() {
        assert_eq!(ratio_percent(25.0, 100.0), 25.0);
        assert_eq!(ratio_percent(1.0, 3.0), 33.0);
        // 100 * 0.5 / 4 = 12.5 exactly, tie goes up
        assert_eq!(ratio_percent(0.5, 4.0), 13.0);
    }

    #[test]
    fn sampling_weight_rounds_the_product_first() {
        assert_eq!(sampling_weight(100.0, 30.0), 30.0);
        // 0.25 * 10 = 2.5 exactly, tie goes up before the division
        assert_eq!(sampling_weight(0.25, 10.0), 0.03);
    }

    #[test]
    fn total_weight_keeps_two_decimals() {
        assert_eq!(total_weight(10.0, 20.0), 50.0);
        // 0.5625 * 2 * 100 = 112.5 exactly, tie goes up
        assert_eq!(total_weight(0.5625, 50.0), 1.13);
    }
}
