//! Guide import into a schedule store.
//!
//! Maps feed channels onto local channels, reconciles each channel's
//! timeline and writes it through a [`GuideStore`].

mod control;
mod error;
mod importer;
mod mapping;
mod reconcile;
mod stats;
mod store;

pub use control::{CancellationFlag, RunGuard, RunLock};
#[allow(clippy::module_name_repetitions)]
pub use error::ImportError;
#[allow(clippy::module_name_repetitions)]
pub use importer::{
    ImportOptions, ImportOutcome, ImportReport, ProgressCallback, SETTING_TIME_ZONE_HOURS,
    SETTING_TIME_ZONE_MINS, SETTING_USE_TIME_ZONE, XmltvImporter,
};
pub use mapping::{BundleSet, ChannelBundle, ChannelMapping};
pub use reconcile::{
    absorb_zero_length, close_open_ends, close_zero_length, compare_programs, reconcile,
    remove_overlapping, sort_programs,
};
#[allow(clippy::module_name_repetitions)]
pub use stats::ImportStats;
pub use store::{GuideStore, InsertPriority, LocalChannel, Program};
