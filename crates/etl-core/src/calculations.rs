//! Per-day metric arithmetic over one country's date-ordered history.
//!
//! Every function here is pure and works on a single country's sequence.
//! Indeterminate results (no predecessor, zero denominator, non-finite
//! quotient) are coerced to 0 instead of being reported.

/// Number of records in the trailing rolling window.
pub const ROLLING_WINDOW: usize = 7;

/// Decimal places kept for growth percentages.
pub const GROWTH_DECIMALS: u32 = 2;

// ── MetricCalculator ──────────────────────────────────────────────────────────

/// Stateless collection of the derived-metric calculations.
pub struct MetricCalculator;

impl MetricCalculator {
    /// Round `value` to `decimals` places, resolving exact ties to the even
    /// neighbour (`2.5 -> 2`, `3.5 -> 4`, `0.125 -> 0.12`).
    pub fn round_half_even(value: f64, decimals: u32) -> f64 {
        let factor = 10_f64.powi(decimals as i32);
        (value * factor).round_ties_even() / factor
    }

    /// Day-over-day differences of a cumulative sequence.
    ///
    /// The first element has no predecessor and is defined as 0, not as the
    /// first cumulative value. Differences beyond the `i64` range saturate.
    pub fn daily_deltas(cumulative: &[u64]) -> Vec<i64> {
        let mut deltas = Vec::with_capacity(cumulative.len());
        let mut previous: Option<u64> = None;
        for &current in cumulative {
            let delta = match previous {
                Some(prev) => {
                    let wide = i128::from(current) - i128::from(prev);
                    i64::try_from(wide).unwrap_or(if wide < 0 { i64::MIN } else { i64::MAX })
                }
                None => 0,
            };
            deltas.push(delta);
            previous = Some(current);
        }
        deltas
    }

    /// `new_cases / previous_cumulative * 100`, rounded to two decimals.
    ///
    /// Returns 0 when there is no predecessor, the predecessor is 0, or the
    /// quotient is not finite.
    pub fn growth_rate_pct(new_cases: i64, previous_cumulative: Option<u64>) -> f64 {
        let Some(denominator) = previous_cumulative.filter(|&d| d > 0) else {
            return 0.0;
        };
        let pct = new_cases as f64 / denominator as f64 * 100.0;
        if !pct.is_finite() {
            return 0.0;
        }
        Self::round_half_even(pct, GROWTH_DECIMALS)
    }

    /// Growth percentages for a whole series of `(new_cases, cumulative)`.
    pub fn growth_rates(new_cases: &[i64], cumulative: &[u64]) -> Vec<f64> {
        new_cases
            .iter()
            .enumerate()
            .map(|(i, &new)| {
                let previous = i.checked_sub(1).and_then(|p| cumulative.get(p)).copied();
                Self::growth_rate_pct(new, previous)
            })
            .collect()
    }

    /// Trailing mean over up to `window` records ending at each index,
    /// rounded half-to-even to an integer.
    ///
    /// The window shrinks at the start of the series (minimum one record), so
    /// every index has a value.
    pub fn rolling_mean(values: &[i64], window: usize) -> Vec<i64> {
        let window = window.max(1);
        let mut out = Vec::with_capacity(values.len());
        let mut sum: i128 = 0;
        for (i, &value) in values.iter().enumerate() {
            sum += value as i128;
            if i >= window {
                sum -= values[i - window] as i128;
            }
            let count = (i + 1).min(window);
            let mean = sum as f64 / count as f64;
            out.push(Self::round_half_even(mean, 0) as i64);
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
