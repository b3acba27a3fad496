//! Paper account persistence.
//!
//! The account is a JSON file rewritten after every command that can change
//! it. Writes go to a sibling temp file first and are renamed into place.

use std::path::{Path, PathBuf};

use perp_gateway::PaperAccount;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl Into<String>) -> AppError {
        AppError::Account {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    /// Load the account, or open a fresh one with `starting_equity`.
    pub fn load_or_create(&self, starting_equity: Decimal) -> AppResult<PaperAccount> {
        if !self.path.exists() {
            info!(path = %self.path.display(), %starting_equity, "Opening new paper account");
            return Ok(PaperAccount::new(starting_equity));
        }
        let content = std::fs::read_to_string(&self.path)?;
        let account: PaperAccount = serde_json::from_str(&content)
            .map_err(|e| self.error(format!("corrupt account file: {e}")))?;
        debug!(
            path = %self.path.display(),
            cash = %account.cash,
            positions = account.positions.len(),
            resting = account.resting.len(),
            "Paper account loaded"
        );
        Ok(account)
    }

    pub fn save(&self, account: &PaperAccount) -> AppResult<()> {
        let json = serde_json::to_string_pretty(account)
            .map_err(|e| self.error(format!("serialize failed: {e}")))?;
        write_replace(&self.path, &json)?;
        debug!(path = %self.path.display(), "Paper account saved");
        Ok(())
    }
}

/// Write through a sibling temp file, creating parent directories.
pub(crate) fn write_replace(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perp_core::{Position, Price};
    use rust_decimal_macros::dec;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("perpbot-{}-{name}", std::process::id()))
            .join("account.json")
    }

    #[test]
    fn test_missing_file_opens_fresh_account() {
        let store = AccountStore::new(temp_path("fresh"));
        let account = store.load_or_create(dec!(5000)).unwrap();
        assert_eq!(account.cash, dec!(5000));
        assert!(account.positions.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let store = AccountStore::new(&path);
        let mut account = PaperAccount::new(dec!(1000));
        account
            .positions
            .insert("ETH".into(), Position::new("ETH", dec!(0.5), Price::new(dec!(2000))));
        account.leverage.insert("ETH".into(), 3);

        store.save(&account).unwrap();
        let loaded = store.load_or_create(dec!(1)).unwrap();
        assert_eq!(loaded, account);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = AccountStore::new(&path).load_or_create(dec!(1)).unwrap_err();
        assert!(matches!(err, AppError::Account { .. }));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
