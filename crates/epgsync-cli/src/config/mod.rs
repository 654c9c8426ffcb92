//! Application configuration module.
//!
//! Manages the TOML config file holding the default feed and the
//! insert pacing used by `import`, and resolves where the config file and
//! database are kept.

#[allow(clippy::module_inception)]
mod config;

#[allow(clippy::module_name_repetitions)]
pub use config::{AppConfig, DataPaths, ImportConfig};
