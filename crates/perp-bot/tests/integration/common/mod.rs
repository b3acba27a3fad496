pub mod fixtures;
pub mod static_market;
