//! Trade statistics - folds closed trades into summary metrics
//!
//! Date-range and per-instrument restriction happen in the store; this fold
//! only ever sees the rows it should count.

use rust_decimal::Decimal;
use std::fmt;

use crate::types::Trade;

/// One closed trade's contribution to the fold
#[derive(Debug, Clone, Copy)]
pub struct ClosedLeg {
    pub pnl_pct: Decimal,
    pub profit: Decimal,
}

/// Summary metrics over a set of closed trades
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeStats {
    pub count: u32,
    pub avg_pnl: Decimal,
    pub win_rate: Decimal,
    pub total_profit: Decimal,
}

/// Fold closed legs into summary stats. Empty input yields all zeros;
/// a trade at exactly 0% does not count as a win.
pub fn aggregate<I>(legs: I) -> TradeStats
where
    I: IntoIterator<Item = ClosedLeg>,
{
    let mut count = 0u32;
    let mut wins = 0u32;
    let mut pnl_sum = Decimal::ZERO;
    let mut total_profit = Decimal::ZERO;

    for leg in legs {
        count += 1;
        if leg.pnl_pct > Decimal::ZERO {
            wins += 1;
        }
        pnl_sum += leg.pnl_pct;
        total_profit += leg.profit;
    }

    if count == 0 {
        return TradeStats::default();
    }

    let n = Decimal::from(count);
    TradeStats {
        count,
        avg_pnl: pnl_sum / n,
        win_rate: Decimal::from(wins) / n * Decimal::ONE_HUNDRED,
        total_profit,
    }
}

/// Extract the foldable legs out of a set of rows, skipping anything that
/// is not fully closed
pub fn legs_of(trades: &[Trade]) -> impl Iterator<Item = ClosedLeg> + '_ {
    trades.iter().filter_map(|t| match (t.pnl_pct, t.profit) {
        (Some(pnl_pct), Some(profit)) => Some(ClosedLeg { pnl_pct, profit }),
        _ => None,
    })
}

impl fmt::Display for TradeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trades: {} | Avg PnL: {:.2}% | Winrate: {:.1}% | Profit: {:.2} USDT",
            self.count, self.avg_pnl, self.win_rate, self.total_profit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(pnl_pct: Decimal, profit: Decimal) -> ClosedLeg {
        ClosedLeg { pnl_pct, profit }
    }

    #[test]
    fn test_empty_input_is_all_zeros() {
        let stats = aggregate(Vec::new());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_pnl, Decimal::ZERO);
        assert_eq!(stats.win_rate, Decimal::ZERO);
        assert_eq!(stats.total_profit, Decimal::ZERO);
    }

    #[test]
    fn test_mixed_outcomes() {
        let stats = aggregate(vec![
            leg(dec!(10), dec!(100)),
            leg(dec!(-5), dec!(-50)),
            leg(dec!(7), dec!(70)),
            leg(dec!(-2), dec!(-20)),
        ]);

        assert_eq!(stats.count, 4);
        assert_eq!(stats.avg_pnl, dec!(2.5));
        assert_eq!(stats.win_rate, dec!(50));
        assert_eq!(stats.total_profit, dec!(100));
    }

    #[test]
    fn test_breakeven_is_not_a_win() {
        let stats = aggregate(vec![leg(dec!(0), dec!(0)), leg(dec!(4), dec!(40))]);
        assert_eq!(stats.win_rate, dec!(50));
    }

    #[test]
    fn test_display_rounds_for_humans() {
        let stats = aggregate(vec![leg(dec!(9.692198), dec!(96.92198))]);
        let line = stats.to_string();
        assert!(line.contains("9.69%"));
        assert!(line.contains("96.92 USDT"));
        assert!(line.contains("Winrate: 100.0%"));
    }
}
