//! Epoch-based interest accrual.

/// 18-decimal fixed-point scale for token amounts.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Normalization base for the accrual multiplier (10^9).
pub const INTEREST_BASE: u128 = 1_000_000_000;

pub const SECONDS_PER_YEAR: u128 = 31_536_000;

/// WAD / INTEREST_BASE, for converting WAD-scale terms into the
/// multiplier's base.
const WAD_PER_BASE: u128 = WAD / INTEREST_BASE;

/// Interest accrued on `principal` between `start_epoch` and
/// `current_epoch`.
///
/// The per-second rate is `annual_rate_tenths_pct * WAD /
/// (1000 * SECONDS_PER_YEAR)` in WAD scale, and `(1 + r)^dt` is
/// approximated by the third-order binomial expansion
///
/// ```text
/// multiplier = BASE + dt*r + dt*(dt-1)*r^2/2 + dt*(dt-1)*(dt-2)*r^3/6
/// ```
///
/// with every term normalized to `INTEREST_BASE`. This is a deliberate
/// truncation, not a full Taylor series: the settlement contract verifies
/// the same polynomial, so precision and term count must match it exactly.
///
/// Returns 0 when `current_epoch <= start_epoch` or `principal` is 0.
pub fn accrued_interest(
    principal: u128,
    start_epoch: u64,
    current_epoch: u64,
    epoch_duration_secs: u64,
    annual_rate_tenths_pct: u64,
) -> u128 {
    if current_epoch <= start_epoch || principal == 0 {
        return 0;
    }

    let dt = (current_epoch - start_epoch) as u128 * epoch_duration_secs as u128;
    let r = annual_rate_tenths_pct as u128 * WAD / (1000 * SECONDS_PER_YEAR);

    // r^2 and r^3 stay in WAD scale between terms.
    let r2 = r * r / WAD;
    let r3 = r2 * r / WAD;

    let t1 = dt * r / WAD_PER_BASE;
    let t2 = dt * dt.saturating_sub(1) * r2 / 2 / WAD_PER_BASE;
    let t3 = dt * dt.saturating_sub(1) * dt.saturating_sub(2) * r3 / 6 / WAD_PER_BASE;

    let growth = t1 + t2 + t3;
    principal.saturating_mul(growth) / INTEREST_BASE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_when_no_elapsed_epochs() {
        assert_eq!(accrued_interest(1_000 * WAD, 10, 10, 900, 50), 0);
        assert_eq!(accrued_interest(1_000 * WAD, 10, 5, 900, 50), 0);
    }

    #[test]
    fn zero_principal_accrues_nothing() {
        assert_eq!(accrued_interest(0, 0, 1_000_000, 900, 500), 0);
    }

    #[test]
    fn non_decreasing_in_elapsed_time() {
        let principal = 1_000 * WAD;
        let mut last = 0u128;
        for epochs in 0..200u64 {
            let accrued = accrued_interest(principal, 0, epochs, 900, 50);
            assert!(
                accrued >= last,
                "interest decreased at {epochs} epochs: {accrued} < {last}"
            );
            last = accrued;
        }
    }

    #[test]
    fn one_epoch_at_five_percent_is_sane() {
        // 1000 WAD principal, one 15-minute epoch, 5.00% annual rate.
        let principal = 1_000 * WAD;
        let accrued = accrued_interest(principal, 0, 1, 900, 50);

        assert!(accrued > 0, "one elapsed epoch must accrue interest");
        assert!(
            accrued < principal / 100,
            "one epoch must accrue far below 1% of principal, got {accrued}"
        );

        // Continuous-time reference: 1000 * 0.05 * 900/31536000 WAD.
        let reference = principal / 20 * 900 / SECONDS_PER_YEAR;
        let tolerance = reference / 100;
        assert!(
            accrued.abs_diff(reference) <= tolerance,
            "accrued {accrued} not within 1% of reference {reference}"
        );
    }

    #[test]
    fn higher_order_terms_kick_in_over_long_horizons() {
        let principal = 1_000 * WAD;
        // Ten years of epochs at 50% annual rate: the quadratic term must
        // push the result above simple interest.
        let epochs = 10 * SECONDS_PER_YEAR as u64 / 900;
        let accrued = accrued_interest(principal, 0, epochs, 900, 500);
        let simple = principal / 2 * 10;
        assert!(accrued > simple, "expected compounding above simple interest");
    }

    #[test]
    fn deterministic_across_calls() {
        let a = accrued_interest(123_456_789 * WAD, 7, 1_234, 900, 85);
        let b = accrued_interest(123_456_789 * WAD, 7, 1_234, 900, 85);
        assert_eq!(a, b);
    }
}
