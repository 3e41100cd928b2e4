//! Partial liquidation amounts and bonus split.

use super::health::PRICE_SCALE;

/// Share of total debt repaid per liquidation, in percent. Fixed at 49 to
/// stay under the settlement contract's maximum-liquidation-share limit.
pub const REPAY_SHARE_PCT: u128 = 49;

/// Liquidation bonus scaling. The inline protocol documentation describes
/// a 10% bonus, but this denominator makes the effective multiplier 11x
/// rather than 1.10x. Ported as-is so our numbers match ledger-side
/// settlement; do not "fix" one side alone.
/// TODO: reconcile BONUS_DENOMINATOR with the settlement contract team.
const BONUS_NUMERATOR: u128 = 110;
const BONUS_DENOMINATOR: u128 = 10;

/// Protocol's cut of seized collateral, in basis points.
const PROTOCOL_FEE_BPS: u128 = 1_000;

/// How seized collateral is divided between liquidator and protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusSplit {
    pub total_seized: u128,
    pub liquidator_amount: u128,
    pub protocol_fee: u128,
}

/// Debt amount repaid by one partial liquidation: floor(total * 49 / 100).
pub fn repay_amount(total_debt: u128) -> u128 {
    total_debt * REPAY_SHARE_PCT / 100
}

/// Collateral seized for repaying `repay_amount` of debt, split between
/// the liquidator and the protocol fee. The split always conserves the
/// total: `liquidator_amount + protocol_fee == total_seized`.
///
/// A zero collateral price yields a zero split rather than dividing by
/// zero; callers only reach this with prices from the live cache.
pub fn seizure(repay_amount: u128, debt_price: u64, collateral_price: u64) -> BonusSplit {
    if collateral_price == 0 {
        return BonusSplit {
            total_seized: 0,
            liquidator_amount: 0,
            protocol_fee: 0,
        };
    }

    let debt_value = repay_amount * debt_price as u128 / PRICE_SCALE;
    let base_collateral = debt_value * PRICE_SCALE / collateral_price as u128;

    let total_seized = base_collateral * BONUS_NUMERATOR / BONUS_DENOMINATOR;
    let protocol_fee = total_seized * PROTOCOL_FEE_BPS / 10_000;
    let liquidator_amount = total_seized - protocol_fee;

    BonusSplit {
        total_seized,
        liquidator_amount,
        protocol_fee,
    }
}
