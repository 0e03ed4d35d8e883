//! Conversational trade journal core
//!
//! Records, closes and analyzes trades driven by chat events. The transport
//! (message delivery, buttons, calendars) stays outside: it feeds `Event`s
//! into `flow::Journal` and renders the `Reply` it gets back. Persistence is
//! a SQLite table behind `trade_db::TradeStore`.

pub mod config;
pub mod draft;
pub mod error;
pub mod export;
pub mod flow;
pub mod menus;
pub mod pnl;
pub mod session;
pub mod stats;
pub mod trade_db;
pub mod types;
