//! Health factor evaluation.

/// Prices are USD scaled by 10^4.
pub const PRICE_SCALE: u128 = 10_000;

/// LTV denominator (100_000 = 100%).
pub const LTV_BASE: u128 = 100_000;

/// Health factor representing 1.0. Below this a position is liquidatable.
pub const HEALTH_FACTOR_THRESHOLD: u128 = 100_000;

/// USD values are divided by this before the LTV multiplication to keep
/// the products within integer range for WAD-scale amounts.
const VALUE_SCALE_RATIO: u128 = 1_000_000_000_000;

/// Risk-weighted ratio of collateral value to loan value, scaled to
/// [`HEALTH_FACTOR_THRESHOLD`]'s base.
///
/// A scaled loan value of 0 returns 0. This branch is reachable both for
/// true zero debt and for nonzero debt that rounds to zero after the
/// scale-down; the caller must short-circuit true zero debt as "safe"
/// before calling, because this function cannot tell the two apart.
pub fn health_factor(
    debt_price: u64,
    debt_amount: u128,
    collateral_price: u64,
    collateral_amount: u128,
    max_ltv: u64,
) -> u128 {
    let loan_value = debt_amount * debt_price as u128 / PRICE_SCALE;
    let collateral_value = collateral_amount * collateral_price as u128 / PRICE_SCALE;

    let scaled_loan = loan_value / VALUE_SCALE_RATIO;
    let scaled_collateral = collateral_value / VALUE_SCALE_RATIO;

    if scaled_loan == 0 {
        return 0;
    }

    (scaled_collateral * max_ltv as u128 / LTV_BASE) * LTV_BASE / scaled_loan
}

/// Whether a health factor is below the liquidation threshold.
pub fn is_liquidatable(health_factor: u128) -> bool {
    health_factor < HEALTH_FACTOR_THRESHOLD
}
