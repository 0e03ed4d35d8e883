//! Journal export - one JSON object per line, one file per user

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::types::Trade;

/// Write all of a user's trades to `<dir>/trades-<user_id>.jsonl`,
/// overwriting any previous export. Returns the file path.
pub fn export_trades(dir: &Path, user_id: i64, trades: &[Trade]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("trades-{user_id}.jsonl"));
    let mut file = File::create(&path)?;

    for trade in trades {
        let line = serde_json::to_string(trade)?;
        writeln!(file, "{line}")?;
    }

    info!("Exported {} trade(s) to {}", trades.len(), path.display());
    Ok(path)
}
