//! Closing economics - pure PnL computation
//!
//! Converts entry capital and prices into realized profit and percentage
//! return, net of entry and exit fee rates. No storage, no rounding: callers
//! round at the point of persistence or display.

use rust_decimal::Decimal;

use crate::error::{JournalError, Result};

/// Full-precision breakdown of a close
#[derive(Debug, Clone, PartialEq)]
pub struct CloseBreakdown {
    /// Coins acquired at entry, net of the entry fee
    pub units_acquired: Decimal,
    /// Quote currency received at exit, net of the exit fee
    pub proceeds: Decimal,
    pub profit: Decimal,
    pub pnl_pct: Decimal,
}

/// Compute the economics of closing a position.
///
/// Refuses a zero entry price or position size instead of letting an
/// undefined ratio reach storage; validation is expected to reject such
/// input before this point.
pub fn close(
    entry_price: Decimal,
    position_size: Decimal,
    entry_fee_pct: Decimal,
    close_price: Decimal,
    exit_fee_pct: Decimal,
) -> Result<CloseBreakdown> {
    if entry_price.is_zero() || position_size.is_zero() {
        return Err(JournalError::DivisionUndefined);
    }

    let units_acquired = position_size / entry_price * (Decimal::ONE - entry_fee_pct / Decimal::ONE_HUNDRED);
    let proceeds = units_acquired * close_price * (Decimal::ONE - exit_fee_pct / Decimal::ONE_HUNDRED);
    let profit = proceeds - position_size;
    let pnl_pct = profit / position_size * Decimal::ONE_HUNDRED;

    Ok(CloseBreakdown {
        units_acquired,
        proceeds,
        profit,
        pnl_pct,
    })
}

/// Round money or percentage for persistence/display
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp(2)
}
