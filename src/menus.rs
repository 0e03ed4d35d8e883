//! Fixed choice menus offered during field collection
//!
//! Every menu is a plain table of label/token rows; fields that take free
//! text only get an empty menu. The `custom` escape switches a menu field
//! back to manual entry.

use crate::draft::Field;
use crate::types::Choice;

pub struct MenuItem {
    pub label: &'static str,
    pub token: &'static str,
}

pub const INSTRUMENTS: &[MenuItem] = &[
    MenuItem { label: "BTC/USDT", token: "coin:BTC/USDT" },
    MenuItem { label: "ETH/USDT", token: "coin:ETH/USDT" },
    MenuItem { label: "SOL/USDT", token: "coin:SOL/USDT" },
    MenuItem { label: "TON/USDT", token: "coin:TON/USDT" },
    MenuItem { label: "DOGE/USDT", token: "coin:DOGE/USDT" },
    MenuItem { label: "XRP/USDT", token: "coin:XRP/USDT" },
    MenuItem { label: "Other coin", token: "coin:custom" },
];

pub const TIMEFRAMES: &[MenuItem] = &[
    MenuItem { label: "1H", token: "tf:1H" },
    MenuItem { label: "4H", token: "tf:4H" },
    MenuItem { label: "1D", token: "tf:1D" },
    MenuItem { label: "1W", token: "tf:1W" },
];

pub const FEE_TIERS: &[MenuItem] = &[
    MenuItem { label: "0.1%", token: "fee:0.1" },
    MenuItem { label: "0.18%", token: "fee:0.18" },
    MenuItem { label: "Other", token: "fee:custom" },
];

pub const STATUSES: &[MenuItem] = &[
    MenuItem { label: "In position", token: "status:open" },
    MenuItem { label: "Closed at target", token: "status:target" },
    MenuItem { label: "Closed at stop", token: "status:stop" },
    MenuItem { label: "Closed manually", token: "status:manual" },
];

pub fn choices(menu: &[MenuItem]) -> Vec<Choice> {
    menu.iter().map(|m| Choice::new(m.label, m.token)).collect()
}

/// Menu for a collection step; empty for free-text-only fields
pub fn field_menu(field: Field) -> Vec<Choice> {
    match field {
        Field::Instrument => choices(INSTRUMENTS),
        Field::Timeframe => choices(TIMEFRAMES),
        Field::EntryFee | Field::ExitFee => choices(FEE_TIERS),
        Field::Status => choices(STATUSES),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_fields_have_menus() {
        assert!(!field_menu(Field::Instrument).is_empty());
        assert!(!field_menu(Field::Status).is_empty());
        assert!(field_menu(Field::Targets).is_empty());
        assert!(field_menu(Field::Comment).is_empty());
    }

    #[test]
    fn test_tokens_are_prefixed() {
        for item in INSTRUMENTS {
            assert!(item.token.starts_with("coin:"));
        }
        for item in FEE_TIERS {
            assert!(item.token.starts_with("fee:"));
        }
        for item in STATUSES {
            assert!(item.token.starts_with("status:"));
        }
    }
}
