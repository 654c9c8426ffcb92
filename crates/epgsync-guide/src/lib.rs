//! XMLTV guide import library for epgsync.
//!
//! Streams XMLTV feeds, normalizes their programmes and merges them
//! into a schedule store one channel at a time.

/// XMLTV feed parsing and normalization.
pub mod xmltv;

/// Channel mapping, timeline reconciliation and import orchestration.
pub mod import;
