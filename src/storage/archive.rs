// Monthly append-only archive files

use crate::error::PersistError;
use crate::measure::ResultRecord;
use crate::storage::atomic::AtomicWriter;
use crate::storage::store::load_or_reset;
use std::path::PathBuf;

pub const ARCHIVE_PREFIX: &str = "speedtest_";
pub const ARCHIVE_SUFFIX: &str = ".csv";
pub const DEFAULT_MAX_FILES: usize = 12;

/// One CSV per UTC year-month, oldest files evicted past the cap
#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
    max_files: usize,
    writer: AtomicWriter,
}

impl Archive {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize, writer: AtomicWriter) -> Self {
        Self {
            dir: dir.into(),
            max_files,
            writer,
        }
    }

    /// `speedtest_YYYY-MM.csv`; lexical order is chronological
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}{}", ARCHIVE_PREFIX, key, ARCHIVE_SUFFIX))
    }

    pub fn path_for(&self, record: &ResultRecord) -> PathBuf {
        self.path_for_key(&record.month_key())
    }

    pub fn ensure_dir(&self) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))
    }

    /// Read-modify-write the month file for `record`, then evict.
    pub fn append(&self, record: &ResultRecord) -> Result<PathBuf, PersistError> {
        self.ensure_dir()?;
        let path = self.path_for(record);
        let mut dataset = load_or_reset(&path)?;
        dataset.push(record.clone());
        self.writer.write(&path, &dataset.to_csv_bytes()?)?;

        let evicted = self.evict()?;
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted old archive files");
        }
        Ok(path)
    }

    /// Archive files sorted oldest first
    pub fn files(&self) -> Result<Vec<PathBuf>, PersistError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistError::io(&self.dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX) && entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Delete the oldest files beyond `max_files`; returns what was removed.
    /// A file that cannot be removed is logged and skipped.
    pub fn evict(&self) -> Result<Vec<PathBuf>, PersistError> {
        let files = self.files()?;
        if files.len() <= self.max_files {
            return Ok(Vec::new());
        }

        let excess = files.len() - self.max_files;
        let mut removed = Vec::with_capacity(excess);
        for file in files.into_iter().take(excess) {
            match std::fs::remove_file(&file) {
                Ok(()) => {
                    tracing::debug!(path = %file.display(), "removed archive file");
                    removed.push(file);
                }
                Err(e) => tracing::warn!(path = %file.display(), error = %e, "could not remove archive file"),
            }
        }
        Ok(removed)
    }
}
