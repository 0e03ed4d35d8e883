//! Trade record store - SQLite persistence for the journal
//!
//! Append-only creation, a single guarded UPDATE on close, read-only
//! aggregate queries. Every read is owner-scoped; no query returns another
//! user's rows.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{JournalError, Result};
use crate::stats::{aggregate, legs_of, TradeStats};
use crate::types::{CloseOutcome, CloseReason, NewTrade, Trade, TradeStatus};

const TRADE_COLUMNS: &str = "id, user_id, chat_id, instrument, timeframe, entry_price, targets, stop, \
     position_size, entry_fee_pct, exit_fee_pct, reason, status, close_reason, \
     close_price, pnl, profit, tags, comment, created_at, closed_at";

/// Per-instrument aggregate plus recency
#[derive(Debug, Clone)]
pub struct InstrumentStats {
    pub stats: TradeStats,
    pub last_closed_at: Option<DateTime<Utc>>,
}

/// Trade store over a single shared SQLite connection
pub struct TradeStore {
    conn: Mutex<Connection>,
}

impl TradeStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Ephemeral store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                instrument TEXT NOT NULL,
                timeframe TEXT,
                entry_price REAL NOT NULL,
                targets TEXT,
                stop REAL,
                position_size REAL NOT NULL,
                entry_fee_pct REAL NOT NULL,
                exit_fee_pct REAL,
                reason TEXT,
                status TEXT NOT NULL,
                close_reason TEXT,
                close_price REAL,
                pnl REAL,
                profit REAL,
                tags TEXT,
                comment TEXT,
                created_at TEXT NOT NULL,
                closed_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user_status ON trades(user_id, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_closed_at ON trades(closed_at)",
            [],
        )?;

        info!("Trade store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a new trade. Back-dated manual entries arrive with `close` set
    /// and are persisted closed in the same insert.
    pub fn create(&self, trade: &NewTrade) -> Result<i64> {
        let conn = self.conn.lock();
        let now = now_str();
        let close = trade.close.as_ref();
        let status = if close.is_some() {
            TradeStatus::Closed
        } else {
            TradeStatus::Open
        };

        conn.execute(
            "INSERT INTO trades (
                user_id, chat_id, instrument, timeframe, entry_price, targets, stop,
                position_size, entry_fee_pct, exit_fee_pct, reason, status, close_reason,
                close_price, pnl, profit, tags, comment, created_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                trade.user_id,
                trade.chat_id,
                trade.instrument,
                trade.timeframe,
                to_real(trade.entry_price),
                trade.targets,
                trade.stop.map(to_real),
                to_real(trade.position_size),
                to_real(trade.entry_fee_pct),
                close.map(|c| to_real(c.exit_fee_pct)),
                trade.reason,
                status.as_str(),
                close.map(|c| c.reason.as_str()),
                close.map(|c| to_real(c.close_price)),
                close.map(|c| to_real(c.pnl_pct)),
                close.map(|c| to_real(c.profit)),
                trade.tags,
                trade.comment,
                now,
                close.map(|_| now.clone()),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Persisted trade #{} for user {}", id, trade.user_id);
        Ok(id)
    }

    /// One-way close transition. A single UPDATE guarded on status, so two
    /// racing attempts cannot both succeed: the loser sees zero affected
    /// rows and gets NotFound.
    pub fn close_by_id(&self, id: i64, user_id: i64, outcome: &CloseOutcome) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE trades
             SET status = 'closed', close_reason = ?1, close_price = ?2, exit_fee_pct = ?3,
                 pnl = ?4, profit = ?5, closed_at = ?6
             WHERE id = ?7 AND user_id = ?8 AND status = 'open'",
            params![
                outcome.reason.as_str(),
                to_real(outcome.close_price),
                to_real(outcome.exit_fee_pct),
                to_real(outcome.pnl_pct),
                to_real(outcome.profit),
                now_str(),
                id,
                user_id,
            ],
        )?;

        if changed == 0 {
            return Err(JournalError::NotFound(id));
        }
        info!("Closed trade #{} for user {}", id, user_id);
        Ok(())
    }

    pub fn get_trade(&self, id: i64, user_id: i64) -> Result<Trade> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1 AND user_id = ?2");
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_row(params![id, user_id], row_to_trade)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => JournalError::NotFound(id),
                other => JournalError::Storage(other),
            })
    }

    pub fn get_open_trades(&self, user_id: i64) -> Result<Vec<Trade>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE user_id = ?1 AND status = 'open'
             ORDER BY created_at ASC, id ASC"
        );
        select_trades(&conn, &sql, params![user_id])
    }

    pub fn get_closed_trades(&self, user_id: i64) -> Result<Vec<Trade>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE user_id = ?1 AND status = 'closed'
             ORDER BY closed_at ASC, id ASC"
        );
        select_trades(&conn, &sql, params![user_id])
    }

    /// Closed trades with closed_at within [start, end] by calendar date;
    /// time-of-day is ignored on both sides.
    pub fn get_closed_in_range(&self, user_id: i64, start: NaiveDate, end: NaiveDate) -> Result<Vec<Trade>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE user_id = ?1 AND status = 'closed'
               AND date(closed_at) BETWEEN date(?2) AND date(?3)
             ORDER BY closed_at ASC, id ASC"
        );
        select_trades(&conn, &sql, params![user_id, start.to_string(), end.to_string()])
    }

    /// Instruments with an open trade or a close within the lookback window
    pub fn get_active_instruments(&self, user_id: i64, lookback_days: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now().date_naive() - chrono::Duration::days(lookback_days)).to_string();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT instrument FROM trades
             WHERE user_id = ?1
               AND (status = 'open' OR (status = 'closed' AND date(closed_at) >= date(?2)))
             ORDER BY instrument ASC",
        )?;
        let instruments = stmt
            .query_map(params![user_id, cutoff], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(instruments)
    }

    /// Aggregate for one instrument's closed trades, or None when the user
    /// has never closed a trade on it
    pub fn get_instrument_stats(&self, user_id: i64, instrument: &str) -> Result<Option<InstrumentStats>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE user_id = ?1 AND status = 'closed' AND instrument = ?2
             ORDER BY closed_at ASC, id ASC"
        );
        let rows = select_trades(&conn, &sql, params![user_id, instrument])?;
        if rows.is_empty() {
            return Ok(None);
        }

        let stats = aggregate(legs_of(&rows));
        let last_closed_at = rows.iter().filter_map(|t| t.closed_at).max();
        Ok(Some(InstrumentStats { stats, last_closed_at }))
    }
}

fn select_trades(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Trade>> {
    let mut stmt = conn.prepare(sql)?;
    let trades = stmt
        .query_map(params, row_to_trade)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(trades)
}

fn row_to_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        instrument: row.get(3)?,
        timeframe: row.get(4)?,
        entry_price: from_real(row.get(5)?),
        targets: row.get(6)?,
        stop: row.get::<_, Option<f64>>(7)?.map(from_real),
        position_size: from_real(row.get(8)?),
        entry_fee_pct: from_real(row.get(9)?),
        exit_fee_pct: row.get::<_, Option<f64>>(10)?.map(from_real),
        reason: row.get(11)?,
        status: TradeStatus::from_db(&row.get::<_, String>(12)?).unwrap_or(TradeStatus::Open),
        close_reason: row
            .get::<_, Option<String>>(13)?
            .and_then(|s| CloseReason::from_db(&s)),
        close_price: row.get::<_, Option<f64>>(14)?.map(from_real),
        pnl_pct: row.get::<_, Option<f64>>(15)?.map(from_real),
        profit: row.get::<_, Option<f64>>(16)?.map(from_real),
        tags: row.get(17)?,
        comment: row.get(18)?,
        created_at: parse_ts(&row.get::<_, String>(19)?),
        closed_at: row.get::<_, Option<String>>(20)?.map(|s| parse_ts(&s)),
    })
}

fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn to_real(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn from_real(value: f64) -> Decimal {
    value.to_string().parse().unwrap_or_default()
}
