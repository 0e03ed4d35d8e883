//! In-progress trade draft assembled across conversational turns
//!
//! The draft is a revisable form, not a strict wizard: every attribute is an
//! Option, any field can be re-collected from the editing hub, and nothing is
//! checked until finalize.

use rust_decimal::Decimal;

use crate::error::{JournalError, Result};

/// Status picked while drafting. Splits into the persisted status plus a
/// close reason at finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    Open,
    ClosedTarget,
    ClosedStop,
    ClosedManual,
}

impl DraftStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DraftStatus::Open => "In position",
            DraftStatus::ClosedTarget => "Closed at target",
            DraftStatus::ClosedStop => "Closed at stop",
            DraftStatus::ClosedManual => "Closed manually",
        }
    }
}

/// A collectible draft field. The hub menu is driven off this catalog, so a
/// new field needs an entry here and a slot on the draft, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Instrument,
    Timeframe,
    EntryPrice,
    PositionSize,
    EntryFee,
    Targets,
    Stop,
    Reason,
    Status,
    ClosePrice,
    ExitFee,
    Tags,
    Comment,
}

impl Field {
    /// Fields offered on the editing hub, in display order. ClosePrice and
    /// ExitFee join only for manually-closed drafts.
    pub const MENU: [Field; 11] = [
        Field::Instrument,
        Field::Timeframe,
        Field::EntryPrice,
        Field::PositionSize,
        Field::EntryFee,
        Field::Targets,
        Field::Stop,
        Field::Reason,
        Field::Status,
        Field::Tags,
        Field::Comment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Instrument => "Instrument",
            Field::Timeframe => "Timeframe",
            Field::EntryPrice => "Entry price",
            Field::PositionSize => "Position size",
            Field::EntryFee => "Entry fee",
            Field::Targets => "Targets",
            Field::Stop => "Stop",
            Field::Reason => "Entry reason",
            Field::Status => "Status",
            Field::ClosePrice => "Close price",
            Field::ExitFee => "Exit fee",
            Field::Tags => "Tags",
            Field::Comment => "Comment",
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Field::Instrument => "field:instrument",
            Field::Timeframe => "field:timeframe",
            Field::EntryPrice => "field:entry_price",
            Field::PositionSize => "field:position_size",
            Field::EntryFee => "field:entry_fee",
            Field::Targets => "field:targets",
            Field::Stop => "field:stop",
            Field::Reason => "field:reason",
            Field::Status => "field:status",
            Field::ClosePrice => "field:close_price",
            Field::ExitFee => "field:exit_fee",
            Field::Tags => "field:tags",
            Field::Comment => "field:comment",
        }
    }

    pub fn from_token(token: &str) -> Option<Field> {
        match token {
            "field:instrument" => Some(Field::Instrument),
            "field:timeframe" => Some(Field::Timeframe),
            "field:entry_price" => Some(Field::EntryPrice),
            "field:position_size" => Some(Field::PositionSize),
            "field:entry_fee" => Some(Field::EntryFee),
            "field:targets" => Some(Field::Targets),
            "field:stop" => Some(Field::Stop),
            "field:reason" => Some(Field::Reason),
            "field:status" => Some(Field::Status),
            "field:close_price" => Some(Field::ClosePrice),
            "field:exit_fee" => Some(Field::ExitFee),
            "field:tags" => Some(Field::Tags),
            "field:comment" => Some(Field::Comment),
            _ => None,
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Field::Instrument => "Instrument (e.g. ETH/USDT):",
            Field::Timeframe => "Timeframe (1H, 4H, 1D):",
            Field::EntryPrice => "Entry price ($):",
            Field::PositionSize => "💵 Position size (USDT):",
            Field::EntryFee => "📉 Entry fee (%):",
            Field::Targets => "Targets (e.g. 2500 / 2700):",
            Field::Stop => "Stop ($), or - to skip:",
            Field::Reason => "Entry reason, or - to skip:",
            Field::Status => "Status:",
            Field::ClosePrice => "Close price ($):",
            Field::ExitFee => "📉 Exit fee (%):",
            Field::Tags => "Tags (e.g. #TON #breakout), or - to skip:",
            Field::Comment => "Comment, or - to skip:",
        }
    }
}

/// Mutable accumulator for one trade being entered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeDraft {
    pub instrument: Option<String>,
    pub timeframe: Option<String>,
    pub entry_price: Option<Decimal>,
    pub position_size: Option<Decimal>,
    pub entry_fee_pct: Option<Decimal>,
    pub targets: Option<String>,
    pub stop: Option<Decimal>,
    pub reason: Option<String>,
    pub status: Option<DraftStatus>,
    pub close_price: Option<Decimal>,
    pub exit_fee_pct: Option<Decimal>,
    pub tags: Option<String>,
    pub comment: Option<String>,
}

impl TradeDraft {
    /// Interpret free text according to the field being collected. The draft
    /// is left untouched on any parse failure.
    pub fn apply_text(&mut self, field: Field, text: &str) -> Result<()> {
        let text = text.trim();
        match field {
            Field::Instrument => {
                if text.is_empty() {
                    return Err(input_error("an instrument symbol", text));
                }
                self.instrument = Some(text.to_string());
            }
            Field::Timeframe => self.timeframe = skippable(text),
            Field::EntryPrice => self.entry_price = Some(parse_positive("entry price", text)?),
            Field::PositionSize => self.position_size = Some(parse_positive("position size", text)?),
            Field::EntryFee => self.entry_fee_pct = Some(parse_fee("entry fee", text)?),
            Field::Targets => self.targets = skippable(text),
            Field::Stop => {
                self.stop = match skippable(text) {
                    Some(value) => Some(parse_positive("stop price", &value)?),
                    None => None,
                }
            }
            Field::Reason => self.reason = skippable(text),
            Field::Status => self.status = Some(parse_status(text)?),
            Field::ClosePrice => self.close_price = Some(parse_positive("close price", text)?),
            Field::ExitFee => self.exit_fee_pct = Some(parse_fee("exit fee", text)?),
            Field::Tags => self.tags = skippable(text),
            Field::Comment => self.comment = skippable(text),
        }
        Ok(())
    }

    /// Hub fields for this draft, in display order
    pub fn menu_fields(&self) -> Vec<Field> {
        let mut fields = Field::MENU.to_vec();
        if self.status == Some(DraftStatus::ClosedManual) {
            let at = fields
                .iter()
                .position(|f| *f == Field::Tags)
                .unwrap_or(fields.len());
            fields.insert(at, Field::ClosePrice);
            fields.insert(at + 1, Field::ExitFee);
        }
        fields
    }

    /// Current value of a field for the hub summary; unset renders as a dash
    pub fn display_value(&self, field: Field) -> String {
        match field {
            Field::Instrument => show(&self.instrument),
            Field::Timeframe => show(&self.timeframe),
            Field::EntryPrice => show(&self.entry_price),
            Field::PositionSize => show(&self.position_size),
            Field::EntryFee => show(&self.entry_fee_pct),
            Field::Targets => show(&self.targets),
            Field::Stop => show(&self.stop),
            Field::Reason => show(&self.reason),
            Field::Status => self
                .status
                .map(|s| s.label().to_string())
                .unwrap_or_else(|| "—".to_string()),
            Field::ClosePrice => show(&self.close_price),
            Field::ExitFee => show(&self.exit_fee_pct),
            Field::Tags => show(&self.tags),
            Field::Comment => show(&self.comment),
        }
    }

    /// Everything finalize will refuse over, in hub order. Status-conditional
    /// requirements included.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.instrument.is_none() {
            missing.push(Field::Instrument.label());
        }
        if self.entry_price.is_none() {
            missing.push(Field::EntryPrice.label());
        }
        if self.position_size.is_none() {
            missing.push(Field::PositionSize.label());
        }
        if self.entry_fee_pct.is_none() {
            missing.push(Field::EntryFee.label());
        }
        match self.status {
            None => missing.push(Field::Status.label()),
            Some(DraftStatus::ClosedTarget) => {
                if self.targets.is_none() {
                    missing.push(Field::Targets.label());
                }
            }
            Some(DraftStatus::ClosedStop) => {
                if self.stop.is_none() {
                    missing.push(Field::Stop.label());
                }
            }
            Some(DraftStatus::ClosedManual) => {
                if self.close_price.is_none() {
                    missing.push(Field::ClosePrice.label());
                }
                if self.exit_fee_pct.is_none() {
                    missing.push(Field::ExitFee.label());
                }
            }
            Some(DraftStatus::Open) => {}
        }
        missing
    }

    /// Idempotent completeness check; no side effects on failure
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(JournalError::Validation(missing))
        }
    }
}

fn show<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "—".to_string())
}

fn skippable(text: &str) -> Option<String> {
    if text.is_empty() || text == "-" {
        None
    } else {
        Some(text.to_string())
    }
}

/// First numeric level of a targets string: text before the first '/',
/// trimmed and parsed
pub fn first_target(targets: &str) -> Option<Decimal> {
    targets
        .split('/')
        .next()
        .and_then(|level| level.trim().parse().ok())
}

fn input_error(what: impl Into<String>, input: &str) -> JournalError {
    JournalError::InputFormat {
        what: what.into(),
        input: input.to_string(),
    }
}

pub(crate) fn parse_decimal(what: &str, text: &str) -> Result<Decimal> {
    text.trim()
        .parse::<Decimal>()
        .map_err(|_| input_error(format!("a number for {what}"), text))
}

pub(crate) fn parse_positive(what: &str, text: &str) -> Result<Decimal> {
    let value = parse_decimal(what, text)?;
    if value <= Decimal::ZERO {
        return Err(input_error(format!("a positive {what}"), text));
    }
    Ok(value)
}

pub(crate) fn parse_fee(what: &str, text: &str) -> Result<Decimal> {
    let value = parse_decimal(what, text)?;
    if value < Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
        return Err(input_error(format!("a {what} between 0 and 100"), text));
    }
    Ok(value)
}

fn parse_status(text: &str) -> Result<DraftStatus> {
    let lower = text.to_lowercase();
    if lower.contains("open") || lower.contains("position") {
        Ok(DraftStatus::Open)
    } else if lower.contains("target") || lower.contains("profit") {
        Ok(DraftStatus::ClosedTarget)
    } else if lower.contains("stop") {
        Ok(DraftStatus::ClosedStop)
    } else if lower.contains("manual") {
        Ok(DraftStatus::ClosedManual)
    } else {
        Err(input_error("a status (open / target / stop / manual)", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_text_parses_by_field() {
        let mut draft = TradeDraft::default();
        draft.apply_text(Field::Instrument, " ETH/USDT ").unwrap();
        draft.apply_text(Field::EntryPrice, "2000").unwrap();
        draft.apply_text(Field::PositionSize, "1000").unwrap();
        draft.apply_text(Field::EntryFee, "0.1").unwrap();
        draft.apply_text(Field::Stop, "-").unwrap();

        assert_eq!(draft.instrument.as_deref(), Some("ETH/USDT"));
        assert_eq!(draft.entry_price, Some(dec!(2000)));
        assert_eq!(draft.stop, None);
    }

    #[test]
    fn test_malformed_number_leaves_draft_unchanged() {
        let mut draft = TradeDraft::default();
        draft.apply_text(Field::EntryPrice, "2000").unwrap();

        let before = draft.clone();
        let err = draft.apply_text(Field::EntryPrice, "soon™").unwrap_err();
        assert!(matches!(err, JournalError::InputFormat { .. }));
        assert_eq!(draft, before);
    }

    #[test]
    fn test_zero_and_negative_prices_rejected() {
        let mut draft = TradeDraft::default();
        assert!(draft.apply_text(Field::EntryPrice, "0").is_err());
        assert!(draft.apply_text(Field::EntryPrice, "-3").is_err());
        assert!(draft.apply_text(Field::PositionSize, "0").is_err());
        assert_eq!(draft.entry_price, None);
    }

    #[test]
    fn test_fee_range() {
        let mut draft = TradeDraft::default();
        assert!(draft.apply_text(Field::EntryFee, "100").is_err());
        assert!(draft.apply_text(Field::EntryFee, "-1").is_err());
        draft.apply_text(Field::EntryFee, "0").unwrap();
        assert_eq!(draft.entry_fee_pct, Some(dec!(0)));
    }

    #[test]
    fn test_missing_fields_lists_everything_required() {
        let mut draft = TradeDraft::default();
        draft.apply_text(Field::Instrument, "ETH/USDT").unwrap();

        let missing = draft.missing_fields();
        assert!(missing.contains(&"Entry price"));
        assert!(missing.contains(&"Position size"));
        assert!(missing.contains(&"Entry fee"));
        assert!(missing.contains(&"Status"));
        assert!(!missing.contains(&"Instrument"));
    }

    #[test]
    fn test_status_conditional_requirements() {
        let mut draft = TradeDraft::default();
        draft.apply_text(Field::Instrument, "ETH/USDT").unwrap();
        draft.apply_text(Field::EntryPrice, "2000").unwrap();
        draft.apply_text(Field::PositionSize, "1000").unwrap();
        draft.apply_text(Field::EntryFee, "0.1").unwrap();

        draft.status = Some(DraftStatus::ClosedTarget);
        assert_eq!(draft.missing_fields(), vec!["Targets"]);

        draft.status = Some(DraftStatus::ClosedStop);
        assert_eq!(draft.missing_fields(), vec!["Stop"]);

        draft.status = Some(DraftStatus::ClosedManual);
        assert_eq!(draft.missing_fields(), vec!["Close price", "Exit fee"]);

        draft.status = Some(DraftStatus::Open);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_menu_grows_for_manual_close() {
        let mut draft = TradeDraft::default();
        assert!(!draft.menu_fields().contains(&Field::ClosePrice));

        draft.status = Some(DraftStatus::ClosedManual);
        let fields = draft.menu_fields();
        assert!(fields.contains(&Field::ClosePrice));
        assert!(fields.contains(&Field::ExitFee));
    }

    #[test]
    fn test_first_target() {
        assert_eq!(first_target("2500 / 2700"), Some(dec!(2500)));
        assert_eq!(first_target("2500"), Some(dec!(2500)));
        assert_eq!(first_target(" 0.058 /0.06/0.07"), Some(dec!(0.058)));
        assert_eq!(first_target("to the moon"), None);
    }

    #[test]
    fn test_field_tokens_round_trip() {
        for field in Field::MENU {
            assert_eq!(Field::from_token(field.token()), Some(field));
        }
        assert_eq!(Field::from_token("field:leverage"), None);
    }
}
