//! Per-conversation session state and its manager
//!
//! One session per (user, chat) pair, created by /newtrade or /closetrade
//! and destroyed on finalize, cancel or idle expiry. The transport
//! serializes events per owner; across owners the map is safe to hit in
//! parallel.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crate::draft::{Field, TradeDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: i64,
    pub chat_id: i64,
}

/// Step within the entry flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStep {
    /// The hub: any field may be picked, in any order
    Editing,
    Collecting(Field),
    AwaitingConfirmation,
}

/// Step within the close-an-open-trade flow
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseStep {
    SelectTrade,
    ClosePrice {
        trade_id: i64,
    },
    ExitFee {
        trade_id: i64,
        close_price: Decimal,
    },
    Confirm {
        trade_id: i64,
        close_price: Decimal,
        exit_fee_pct: Decimal,
    },
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Entry { draft: TradeDraft, step: EntryStep },
    Close { step: CloseStep },
}

#[derive(Debug, Clone)]
struct SessionEntry {
    state: SessionState,
    touched_at: DateTime<Utc>,
}

/// Explicit owner of all live sessions, keyed by (user, chat)
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionKey, SessionEntry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session, replacing any previous one for the same key
    pub fn begin(&self, key: SessionKey, state: SessionState) {
        debug!("Session started for user {} chat {}", key.user_id, key.chat_id);
        self.sessions.insert(
            key,
            SessionEntry {
                state,
                touched_at: Utc::now(),
            },
        );
    }

    /// Clone the current state out; the caller computes the next state and
    /// writes it back with `store`. Cloning keeps no map guard alive across
    /// engine work.
    pub fn snapshot(&self, key: &SessionKey) -> Option<SessionState> {
        self.sessions.get(key).map(|entry| entry.state.clone())
    }

    pub fn store(&self, key: SessionKey, state: SessionState) {
        self.sessions.insert(
            key,
            SessionEntry {
                state,
                touched_at: Utc::now(),
            },
        );
    }

    pub fn destroy(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.remove(key).is_some();
        if removed {
            debug!("Session destroyed for user {} chat {}", key.user_id, key.chat_id);
        }
        removed
    }

    /// Drop sessions idle for longer than `max_idle`; returns how many went
    pub fn expire_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.touched_at >= cutoff);
        let expired = before - self.sessions.len();
        if expired > 0 {
            debug!("Expired {} idle session(s)", expired);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
