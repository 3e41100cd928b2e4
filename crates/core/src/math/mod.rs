//! Pure fixed-point financial math.
//!
//! Everything in here is integer-only, allocation-free and deterministic.
//! The interest polynomial and the health factor scaling must reproduce
//! the settlement contract's arithmetic bit for bit, so keep divisions in
//! the documented order.

pub mod health;
pub mod interest;
pub mod liquidation;

pub use health::{health_factor, is_liquidatable, HEALTH_FACTOR_THRESHOLD, LTV_BASE, PRICE_SCALE};
pub use interest::{accrued_interest, INTEREST_BASE, SECONDS_PER_YEAR, WAD};
pub use liquidation::{repay_amount, seizure, BonusSplit, REPAY_SHARE_PCT};
