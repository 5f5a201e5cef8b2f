//! Two-decimal money arithmetic.
//!
//! Every stored amount and every balance comparison goes through
//! [`round2`] so that binary floating-point drift can never make a truly
//! settled record look unsettled.

/// Rounds to two decimal places, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sums amounts and rounds once, at the comparison boundary.
pub fn round2_sum<I>(amounts: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    round2(amounts.into_iter().sum())
}
