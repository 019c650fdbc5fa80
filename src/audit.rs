//! # audit — CSV trade journal
//!
//! One row per executed trade, appended and flushed immediately so the file
//! is usable by downstream tooling even if the process dies mid-session.
//!
//! ```text
//! timestamp,entry_price,signal_type,direction,stake,result,profit
//! 2024-01-02T09:04:00,1.0812,Gann,put,1.0,false,-1.0
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::models::TradeRecord;

#[derive(Debug, Serialize)]
struct JournalRow<'a> {
    /// ISO-8601, no offset.
    timestamp:   String,
    entry_price: f64,
    signal_type: &'a str,
    direction:   &'a str,
    stake:       f64,
    result:      bool,
    profit:      f64,
}

impl<'a> From<&'a TradeRecord> for JournalRow<'a> {
    fn from(r: &'a TradeRecord) -> Self {
        Self {
            timestamp:   r.timestamp.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
            entry_price: r.entry_price,
            signal_type: &r.signal_label,
            direction:   r.direction.as_str(),
            stake:       r.stake,
            result:      r.won,
            profit:      r.profit,
        }
    }
}

pub struct TradeJournal {
    path:   PathBuf,
    writer: csv::Writer<File>,
}

impl TradeJournal {
    /// Creates `gann_bot_trades_YYYYmmdd_HHMMSS.csv` in `dir` and writes the header.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let name = format!("gann_bot_trades_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
        Self::create_at(dir.as_ref().join(name))
    }

    pub fn create_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record([
            "timestamp", "entry_price", "signal_type", "direction", "stake", "result", "profit",
        ])?;
        writer.flush()?;

        info!(path = %path.display(), "📝 Trade journal created");
        Ok(Self { path, writer })
    }

    pub fn append(&mut self, record: &TradeRecord) -> Result<()> {
        self.writer.serialize(JournalRow::from(record))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TradeOutcome};
    use chrono::{TimeZone, Utc};

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TradeJournal::create(dir.path()).unwrap();
        assert!(journal
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("gann_bot_trades_"));

        let at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 4, 0).unwrap();
        journal
            .append(&TradeRecord::new(at, 1.0812, "Gann".into(), Direction::Put, 1.0, TradeOutcome::loss(1.0)))
            .unwrap();
        journal
            .append(&TradeRecord::new(at, 1.0815, "Gann_M1".into(), Direction::Call, 2.0, TradeOutcome::win(1.6)))
            .unwrap();

        let text = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,entry_price,signal_type,direction,stake,result,profit");
        assert_eq!(lines[1], "2024-01-02T09:04:00,1.0812,Gann,put,1.0,false,-1.0");
        assert_eq!(lines[2], "2024-01-02T09:04:00,1.0815,Gann_M1,call,2.0,true,1.6");
        assert_eq!(lines.len(), 3);
    }
}
