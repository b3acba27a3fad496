//! Integration tests for perp-bot.
//!
//! These drive `Application` end to end against in-memory gateways:
//! manual commands, single cycles and bounded loops.

pub mod common;
