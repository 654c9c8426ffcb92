//! XMLTV import orchestration.
//!
//! One import runs these phases against a [`GuideStore`]:
//!
//! 1. purge programs that ended before today
//! 2. read `<channel>` elements and create a bundle per mapped local channel
//! 3. read `<programme>` elements into the bundles of their mapped channels
//! 4. reconcile each bundle, drop what clashes with stored programs, insert

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::instrument;

use super::control::{CancellationFlag, RunLock};
use super::error::ImportError;
use super::mapping::{BundleSet, ChannelBundle, ChannelMapping};
use super::reconcile::reconcile;
use super::stats::ImportStats;
use super::store::{GuideStore, InsertPriority, LocalChannel, Program};
use crate::xmltv::{LocalZone, ProgramNormalizer, TimeCorrection, XmltvReader};

/// Setting: honour the feed's timezone suffix (`"true"`/`"false"`).
pub const SETTING_USE_TIME_ZONE: &str = "xmlTvUseTimeZone";
/// Setting: fixed hour correction.
pub const SETTING_TIME_ZONE_HOURS: &str = "xmlTvTimeZoneHours";
/// Setting: fixed minute correction.
pub const SETTING_TIME_ZONE_MINS: &str = "xmlTvTimeZoneMins";

/// Progress is reported every this many programs.
const PROGRESS_INTERVAL: usize = 100;

const STATUS_REMOVING: &str = "Removing old programs";
const STATUS_LOADING_CHANNELS: &str = "Loading channel list";
const STATUS_LOADING_PROGRAMS: &str = "Loading TV programs";
const STATUS_SORTING: &str = "Sorting TV programs";
const MESSAGE_IMPORTED: &str = "File imported successfully";
const MESSAGE_NOTHING: &str = "No programs found";

/// Callback receiving a snapshot of the statistics as an import advances.
pub type ProgressCallback = Box<dyn Fn(&ImportStats) + Send + Sync>;

/// Tunables of an importer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Insert pacing.
    pub priority: InsertPriority,
    /// Zone feed times are converted into.
    pub local_zone: LocalZone,
    /// Overrides the current date used for the "ended before today" filter.
    pub today: Option<NaiveDate>,
}

/// How a finished import ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// At least one program was written.
    Imported,
    /// The feed yielded nothing to write.
    NothingToImport,
}

/// Result of a completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Outcome.
    pub outcome: ImportOutcome,
    /// Status message shown to the user.
    pub message: String,
    /// Programs written to the store.
    pub imported: usize,
    /// Final statistics.
    pub stats: ImportStats,
}

impl ImportReport {
    /// Returns `true` if programs were imported.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, ImportOutcome::Imported)
    }
}

#[derive(Debug, Default)]
struct LastRun {
    message: String,
    stats: ImportStats,
}

/// Imports XMLTV files into a [`GuideStore`].
pub struct XmltvImporter<S> {
    store: S,
    lock: RunLock,
    options: ImportOptions,
    cancel: CancellationFlag,
    progress: Option<ProgressCallback>,
    last: Mutex<LastRun>,
}

impl<S> std::fmt::Debug for XmltvImporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmltvImporter")
            .field("options", &self.options)
            .field("running", &self.lock.is_running())
            .finish_non_exhaustive()
    }
}

impl<S: GuideStore> XmltvImporter<S> {
    /// Creates an importer sharing the process-wide run lock.
    pub fn new(store: S) -> Self {
        Self::with_lock(store, RunLock::global())
    }

    /// Creates an importer using `lock` for run exclusivity.
    pub fn with_lock(store: S, lock: RunLock) -> Self {
        Self {
            store,
            lock,
            options: ImportOptions::default(),
            cancel: CancellationFlag::new(),
            progress: None,
            last: Mutex::new(LastRun::default()),
        }
    }

    /// Sets the import options.
    #[must_use]
    pub const fn options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `cancel` as the cancellation flag.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registers a progress callback.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(&ImportStats) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Status message of the last finished import.
    pub fn last_message(&self) -> String {
        self.last_run().message.clone()
    }

    /// Statistics of the last (or running) import.
    pub fn stats(&self) -> ImportStats {
        self.last_run().stats.clone()
    }

    /// Imports `source`.
    ///
    /// # Errors
    ///
    /// - [`ImportError::AlreadyRunning`] if another import holds the lock;
    ///   nothing is touched in that case.
    /// - [`ImportError::SourceNotFound`] if `source` is not a file.
    /// - [`ImportError::Cancelled`] if the cancellation flag was set.
    /// - [`ImportError::Failed`] on malformed XML or store failures.
    #[instrument(skip_all, fields(source = %source.display()))]
    pub fn import(&self, source: &Path) -> Result<ImportReport, ImportError> {
        let Some(_guard) = self.lock.try_acquire() else {
            tracing::warn!("import rejected, another import is running");
            return Err(ImportError::AlreadyRunning);
        };

        let mut run = ImportRun {
            importer: self,
            stats: ImportStats::default(),
        };
        let result = run.execute(source);

        let message = match &result {
            Ok(report) => {
                tracing::info!(
                    imported = report.imported,
                    channels = report.stats.channels,
                    message = %report.message,
                    "import finished"
                );
                report.message.clone()
            }
            Err(err) => {
                tracing::error!(error = %err, "import failed");
                err.to_string()
            }
        };
        run.stats.set_status(message.clone());
        run.publish();
        self.last_run().message = message;

        result
    }

    fn last_run(&self) -> std::sync::MutexGuard<'_, LastRun> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State of one import in progress.
struct ImportRun<'a, S> {
    importer: &'a XmltvImporter<S>,
    stats: ImportStats,
}

impl<S: GuideStore> ImportRun<'_, S> {
    fn execute(&mut self, source: &Path) -> Result<ImportReport, ImportError> {
        if !source.is_file() {
            return Err(ImportError::SourceNotFound(source.to_path_buf()));
        }
        let importer = self.importer;
        let store = &importer.store;

        self.enter_phase(STATUS_REMOVING);
        let purged = store
            .purge_old_programs()
            .context("failed to remove old programs")?;
        tracing::info!(purged, "old programs removed");

        let correction = self.load_time_correction()?;

        self.enter_phase(STATUS_LOADING_CHANNELS);
        let local_channels = store
            .list_local_channels()
            .context("failed to load local channels")?;
        let mut bundles = BundleSet::default();
        self.read_channels(source, &local_channels, &mut bundles)?;

        let mapping = ChannelMapping::build(
            store
                .list_mapped_channels()
                .context("failed to load mapped channels")?,
        );
        if mapping.is_empty() {
            tracing::info!("no channels are mapped to the guide, nothing to import");
            return Ok(self.finish(0));
        }

        self.enter_phase(STATUS_LOADING_PROGRAMS);
        self.read_programmes(source, &mapping, correction, &mut bundles)?;

        self.enter_phase(STATUS_SORTING);
        let imported = self.store_bundles(bundles)?;
        Ok(self.finish(imported))
    }

    fn enter_phase(&mut self, status: &str) {
        tracing::info!(phase = status, "import phase");
        self.stats.set_status(status);
        self.stats.programs = 0;
        self.report_progress();
    }

    fn load_time_correction(&self) -> Result<TimeCorrection, ImportError> {
        let store = &self.importer.store;
        let use_time_zone = store
            .get_setting(SETTING_USE_TIME_ZONE, "true")
            .context("failed to read settings")?
            .trim()
            .eq_ignore_ascii_case("true");
        let hours = self.numeric_setting(SETTING_TIME_ZONE_HOURS)?;
        let minutes = self.numeric_setting(SETTING_TIME_ZONE_MINS)?;

        let correction = TimeCorrection {
            use_time_zone,
            fixed_minutes: hours.saturating_mul(60).saturating_add(minutes),
            local_zone: self.importer.options.local_zone,
        };
        tracing::debug!(
            use_time_zone,
            fixed_minutes = correction.fixed_minutes,
            "time correction loaded"
        );
        Ok(correction)
    }

    fn numeric_setting(&self, key: &str) -> Result<i64, ImportError> {
        let raw = self
            .importer
            .store
            .get_setting(key, "0")
            .context("failed to read settings")?;
        Ok(raw.trim().parse::<i32>().map_or_else(
            |_| {
                tracing::warn!(key, value = %raw, "setting is not a 32-bit number, using 0");
                0
            },
            i64::from,
        ))
    }

    #[instrument(skip_all)]
    fn read_channels(
        &mut self,
        source: &Path,
        local_channels: &[LocalChannel],
        bundles: &mut BundleSet,
    ) -> Result<(), ImportError> {
        for (index, channel) in XmltvReader::open(source)?.channels().enumerate() {
            self.check_cancelled()?;
            let channel = channel.context("failed to read channel list")?;

            let Some(id) = channel.id.as_deref().filter(|id| !id.is_empty()) else {
                tracing::warn!(index, "channel without id skipped");
                continue;
            };
            let Some(display_name) = channel.display_name.as_deref() else {
                tracing::warn!(index, xmlid = id, "channel without display name skipped");
                continue;
            };

            let mut mapped = false;
            for local in local_channels
                .iter()
                .filter(|c| c.external_id.as_deref() == Some(id))
            {
                mapped = true;
                if bundles.insert(local, id) {
                    tracing::debug!(
                        xmlid = id,
                        display_name,
                        channel_id = local.id,
                        channel = %local.name,
                        "guide channel mapped"
                    );
                }
            }
            if !mapped {
                tracing::warn!(xmlid = id, display_name, "guide channel not mapped, skipped");
                continue;
            }

            self.stats.channels = self.stats.channels.saturating_add(1);
            self.report_progress();
        }

        tracing::info!(channels = self.stats.channels, bundles = bundles.len(), "channel list loaded");
        Ok(())
    }

    #[instrument(skip_all)]
    fn read_programmes(
        &mut self,
        source: &Path,
        mapping: &ChannelMapping,
        correction: TimeCorrection,
        bundles: &mut BundleSet,
    ) -> Result<(), ImportError> {
        let normalizer = ProgramNormalizer::new(correction);
        let mut unmapped = 0usize;

        for raw in XmltvReader::open(source)?.programmes() {
            self.check_cancelled()?;
            let raw = raw.context("failed to read programmes")?;
            let Some(program) = normalizer.normalize(&raw) else {
                continue;
            };

            self.report_every_interval();

            let targets = mapping.channels_for(&program.feed_channel);
            if targets.is_empty() {
                unmapped = unmapped.saturating_add(1);
                continue;
            }
            for local in targets {
                bundles.push(
                    local,
                    &program.feed_channel,
                    Program::from_normalized(local.id, &program),
                );
                self.stats.programs = self.stats.programs.saturating_add(1);
            }
        }

        tracing::info!(programs = self.stats.programs, unmapped, "programmes loaded");
        Ok(())
    }

    #[instrument(skip_all)]
    fn store_bundles(&mut self, bundles: BundleSet) -> Result<usize, ImportError> {
        let options = self.importer.options;
        let today = options.today.unwrap_or_else(|| options.local_zone.today());
        let cutoff = today.and_time(NaiveTime::MIN);
        let mut imported = 0usize;

        for bundle in bundles.into_bundles() {
            self.check_cancelled()?;
            imported = imported.saturating_add(self.store_bundle(bundle, cutoff)?);
            self.report_progress();
        }
        Ok(imported)
    }

    fn store_bundle(
        &mut self,
        bundle: ChannelBundle,
        cutoff: NaiveDateTime,
    ) -> Result<usize, ImportError> {
        let ChannelBundle {
            channel_id,
            name,
            external_id,
            programs,
        } = bundle;
        if programs.is_empty() {
            return Ok(0);
        }
        let importer = self.importer;
        let store = &importer.store;

        let programs = reconcile(programs, |_| name.as_str());
        let existing = store
            .list_programs(channel_id)
            .with_context(|| format!("failed to load programs of channel {channel_id}"))?;

        let mut accepted = Vec::with_capacity(programs.len());
        let mut clashing = 0usize;
        let mut expired = 0usize;
        for program in programs {
            self.report_every_interval();
            self.stats.programs = self.stats.programs.saturating_add(1);

            if program.end_time <= cutoff {
                expired = expired.saturating_add(1);
                continue;
            }
            self.stats.observe(program.start_time, program.end_time);
            if existing
                .iter()
                .any(|e| e.overlaps(program.start_time, program.end_time))
            {
                clashing = clashing.saturating_add(1);
                continue;
            }
            accepted.push(program);
        }

        let inserted = if accepted.is_empty() {
            0
        } else {
            store
                .bulk_insert_programs(&accepted, importer.options.priority)
                .with_context(|| format!("failed to store programs of channel {channel_id}"))?
        };

        tracing::info!(
            channel_id,
            channel = %name,
            xmlid = %external_id,
            inserted,
            clashing,
            expired,
            "channel programs stored"
        );
        Ok(inserted)
    }

    fn finish(&mut self, imported: usize) -> ImportReport {
        let (outcome, message) = if imported > 0 {
            (ImportOutcome::Imported, MESSAGE_IMPORTED)
        } else {
            (ImportOutcome::NothingToImport, MESSAGE_NOTHING)
        };
        self.stats.set_status(message);
        ImportReport {
            outcome,
            message: message.to_owned(),
            imported,
            stats: self.stats.clone(),
        }
    }

    fn check_cancelled(&self) -> Result<(), ImportError> {
        if self.importer.cancel.is_cancelled() {
            tracing::warn!(status = %self.stats.status, "import cancelled");
            return Err(ImportError::Cancelled);
        }
        Ok(())
    }

    #[allow(clippy::arithmetic_side_effects)]
    fn report_every_interval(&self) {
        if self.stats.programs % PROGRESS_INTERVAL == 0 {
            self.report_progress();
        }
    }

    fn report_progress(&self) {
        if let Some(callback) = &self.importer.progress {
            callback(&self.stats);
        }
        self.publish();
    }

    fn publish(&self) {
        self.importer.last_run().stats.clone_from(&self.stats);
    }
}
