//! Strategy run times kept between CLI invocations.
//!
//! A single `perpbot run` evaluates a strategy at most once per timeframe,
//! so the last evaluation time of each strategy (by config name) is held
//! in memory for the process and in a JSON file across processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::account_store::write_replace;
use crate::error::{AppError, AppResult};

pub type LastRuns = BTreeMap<String, DateTime<Utc>>;

/// In-process record of when each strategy last evaluated.
#[derive(Debug, Default)]
pub struct RunLedger {
    runs: Mutex<LastRuns>,
}

impl RunLedger {
    pub fn new(runs: LastRuns) -> Self {
        Self {
            runs: Mutex::new(runs),
        }
    }

    pub fn last_run(&self, strategy: &str) -> Option<DateTime<Utc>> {
        self.runs.lock().get(strategy).copied()
    }

    /// Keep the later of the stored and the given time.
    pub fn record(&self, strategy: &str, at: Option<DateTime<Utc>>) {
        let Some(at) = at else {
            return;
        };
        let mut runs = self.runs.lock();
        let entry = runs.entry(strategy.to_string()).or_insert(at);
        if *entry < at {
            *entry = at;
        }
    }

    pub fn snapshot(&self) -> LastRuns {
        self.runs.lock().clone()
    }
}

/// JSON file holding [`LastRuns`].
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: String) -> AppError {
        AppError::RunState {
            path: self.path.clone(),
            message,
        }
    }

    /// Missing file means no strategy has run yet.
    pub fn load(&self) -> AppResult<LastRuns> {
        if !self.path.exists() {
            return Ok(LastRuns::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let runs: LastRuns = serde_json::from_str(&content)
            .map_err(|e| self.error(format!("corrupt run state: {e}")))?;
        debug!(path = %self.path.display(), strategies = runs.len(), "Run state loaded");
        Ok(runs)
    }

    pub fn save(&self, runs: &LastRuns) -> AppResult<()> {
        let json = serde_json::to_string_pretty(runs)
            .map_err(|e| self.error(format!("serialize failed: {e}")))?;
        write_replace(&self.path, &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ledger_keeps_latest() {
        let ledger = RunLedger::default();
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        ledger.record("eth-rsi", Some(late));
        ledger.record("eth-rsi", Some(early));
        ledger.record("eth-rsi", None);

        assert_eq!(ledger.last_run("eth-rsi"), Some(late));
        assert_eq!(ledger.last_run("btc-rsi"), None);
    }

    #[test]
    fn test_store_save_then_load() {
        let dir = std::env::temp_dir().join(format!("perpbot-{}-runstate", std::process::id()));
        let store = RunStateStore::new(dir.join("strategy_runs.json"));
        assert!(store.load().unwrap().is_empty());

        let mut runs = LastRuns::new();
        runs.insert(
            "eth-rsi".into(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        );
        store.save(&runs).unwrap();
        assert_eq!(store.load().unwrap(), runs);

        std::fs::write(store.path(), "[").unwrap();
        assert!(matches!(store.load().unwrap_err(), AppError::RunState { .. }));

        let _ = std::fs::remove_dir_all(dir);
    }
}
