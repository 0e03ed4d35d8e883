use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a persisted trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }

    pub fn from_db(s: &str) -> Option<TradeStatus> {
        match s {
            "open" => Some(TradeStatus::Open),
            "closed" => Some(TradeStatus::Closed),
            _ => None,
        }
    }
}

/// How a closed trade was closed. Kept separate from the status so the
/// aggregator never has to parse detail out of a combined string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Target,
    Stop,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Target => "target",
            CloseReason::Stop => "stop",
            CloseReason::Manual => "manual",
        }
    }

    pub fn from_db(s: &str) -> Option<CloseReason> {
        match s {
            "target" => Some(CloseReason::Target),
            "stop" => Some(CloseReason::Stop),
            "manual" => Some(CloseReason::Manual),
            _ => None,
        }
    }
}

/// A persisted trade record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub instrument: String,
    pub timeframe: Option<String>,
    pub entry_price: Decimal,
    pub targets: Option<String>, // price levels separated by '/'
    pub stop: Option<Decimal>,
    pub position_size: Decimal, // capital committed, quote currency
    pub entry_fee_pct: Decimal,
    pub exit_fee_pct: Option<Decimal>,
    pub reason: Option<String>,
    pub status: TradeStatus,
    pub close_reason: Option<CloseReason>,
    pub close_price: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub tags: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new trade. `close` is set for back-dated entries
/// recorded in an already-closed state.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub user_id: i64,
    pub chat_id: i64,
    pub instrument: String,
    pub timeframe: Option<String>,
    pub entry_price: Decimal,
    pub targets: Option<String>,
    pub stop: Option<Decimal>,
    pub position_size: Decimal,
    pub entry_fee_pct: Decimal,
    pub reason: Option<String>,
    pub tags: Option<String>,
    pub comment: Option<String>,
    pub close: Option<CloseOutcome>,
}

/// The four close fields that must be persisted together, plus the reason.
/// profit and pnl_pct arrive already rounded to 2 decimal places.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub close_price: Decimal,
    pub exit_fee_pct: Decimal,
    pub profit: Decimal,
    pub pnl_pct: Decimal,
    pub reason: CloseReason,
}

/// Inbound event from the transport, one per user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub user_id: i64,
    pub chat_id: i64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventKind {
    /// Raw text typed by the user
    Text { text: String },
    /// A token from a menu the core previously offered
    Choice { token: String },
}

/// One selectable option offered back to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub token: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Choice {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Outbound presentation request: semantic content plus the legal next
/// choices. The core never renders UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub choices: Vec<Choice>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            choices: Vec::new(),
        }
    }

    pub fn with_choices(text: impl Into<String>, choices: Vec<Choice>) -> Self {
        Reply {
            text: text.into(),
            choices,
        }
    }
}
