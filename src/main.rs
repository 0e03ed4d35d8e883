use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use trade_journal::config::Config;
use trade_journal::flow::Journal;
use trade_journal::trade_db::TradeStore;
use trade_journal::types::{Event, EventKind};

/// Line-oriented reference transport: plain lines are text events, lines
/// starting with '@' tap the matching button token.
fn main() -> Result<()> {
    // Load config
    let config = Config::from_env()?;

    // Setup logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(match config.log_level.as_str() {
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let user_id: i64 = std::env::var("REPL_USER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    info!("Trade journal starting (db: {})", config.db_path);
    let store = Arc::new(TradeStore::open(&config.db_path)?);
    let journal = Journal::new(store, config);

    println!("Trade journal. Type /start for commands; '@token' taps a button; Ctrl-D quits.");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let kind = match input.strip_prefix('@') {
            Some(token) => EventKind::Choice {
                token: token.to_string(),
            },
            None => EventKind::Text {
                text: input.to_string(),
            },
        };

        let reply = journal.handle(&Event {
            user_id,
            chat_id: 1,
            kind,
        });

        println!("{}", reply.text);
        for choice in &reply.choices {
            println!("  [{}] @{}", choice.label, choice.token);
        }
        io::stdout().flush()?;

        journal.expire_idle_sessions();
    }

    info!("Trade journal stopped");
    Ok(())
}
