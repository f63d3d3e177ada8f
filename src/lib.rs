//! Pluggable trading core: an exchange adapter, a strategy and a status sink
//! driven by a single polling loop.

pub mod config;
pub mod connectors;
pub mod core;
pub mod logging;
pub mod status;
pub mod strategies;
pub mod types;
pub mod utils;
