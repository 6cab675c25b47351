// Main rolling dataset

use crate::error::PersistError;
use crate::measure::ResultRecord;
use crate::storage::atomic::AtomicWriter;
use crate::storage::dataset::Dataset;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

pub const MAIN_FILE_NAME: &str = "speedtest_results.csv";
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Load a dataset, resetting to empty if the file is undecodable.
/// Read failures other than corruption still propagate.
pub(crate) fn load_or_reset(path: &Path) -> Result<Dataset, PersistError> {
    match Dataset::load(path) {
        Ok(dataset) => Ok(dataset),
        Err(PersistError::Corrupt { line, reason, .. }) => {
            tracing::warn!(path = %path.display(), line, %reason, "dataset unreadable, starting from empty");
            Ok(Dataset::new())
        }
        Err(e) => Err(e),
    }
}

/// The 30-day window, rewritten in full on every commit
#[derive(Debug, Clone)]
pub struct MainStore {
    path: PathBuf,
    retention: Duration,
    writer: AtomicWriter,
}

impl MainStore {
    pub fn new(path: impl Into<PathBuf>, retention_days: i64, writer: AtomicWriter) -> Self {
        Self {
            path: path.into(),
            retention: Duration::days(retention_days.max(0)),
            writer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Oldest timestamp kept for a given "now"
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }

    /// First run: create a header-only file
    pub fn ensure_exists(&self) -> Result<(), PersistError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
        }
        self.writer.write(&self.path, &Dataset::new().to_csv_bytes()?)
    }

    pub fn load(&self) -> Result<Dataset, PersistError> {
        load_or_reset(&self.path)
    }

    /// Append `records`, prune to the retention window and rewrite the file.
    /// Returns the dataset as written.
    pub fn commit(&self, records: &[ResultRecord], now: DateTime<Utc>) -> Result<Dataset, PersistError> {
        let mut dataset = self.load()?;
        dataset.extend(records.iter().cloned());
        let pruned = dataset.retain_since(self.cutoff(now));
        if pruned > 0 {
            tracing::debug!(path = %self.path.display(), pruned, "dropped records outside retention window");
        }
        self.writer.write(&self.path, &dataset.to_csv_bytes()?)?;
        Ok(dataset)
    }
}
