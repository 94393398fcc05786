//! Configuration loading for the read-along engine.
//!
//! Settings live in `conf/config.toml` as one table per concern. Missing
//! entries take their defaults and an unreadable file yields the default
//! configuration, so a bad config never keeps the reader from starting.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{AppConfig, LogLevel, ThemeMode};
