//! perpbot application.
//!
//! Wires the paper gateway, market maker and strategy loops behind a CLI:
//! - `Application`: command execution over a shared gateway
//! - `AppSettings`: TOML settings
//! - `AccountStore`: paper account persistence
//! - `RunStateStore`: strategy last-run times between invocations

pub mod account_store;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod run_state;

pub use account_store::AccountStore;
pub use app::{Application, Job};
pub use cli::{Cli, Command, RunArgs, TradeCommand};
pub use config::AppSettings;
pub use error::{AppError, AppResult};
pub use run_state::{RunLedger, RunStateStore};
