//! Schedule store for epgsync.
//!
//! Uses `rusqlite` (bundled `SQLite`) to keep local channels, their
//! XMLTV mappings, imported programs and import settings.

/// Channel CRUD operations.
pub mod channels;
mod connection;
mod migrations;
/// Program CRUD operations.
pub mod programs;
/// Key/value settings.
pub mod settings;

#[allow(clippy::module_name_repetitions)]
pub use channels::{
    StoredChannel, insert_channel, load_channels, load_mapped_channels, set_external_id,
};
#[allow(clippy::module_name_repetitions)]
pub use connection::{open_db, open_in_memory};
#[allow(clippy::module_name_repetitions)]
pub use programs::{
    StoredProgram, delete_programs_ended_before, insert_programs, insert_programs_throttled,
    load_programs_for_channel,
};
pub use settings::{get_setting, load_settings, set_setting};
