// Crash-safe file replacement

use crate::error::PersistError;
use crate::resilience::RecoveryStrategy;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Replace attempts before falling back to a direct overwrite
pub const DEFAULT_REPLACE_ATTEMPTS: u32 = 8;

/// Windows sharing/lock violations surface as these raw codes
const WINDOWS_LOCK_CODES: [i32; 2] = [32, 33];

/// The two filesystem primitives the writer depends on
pub trait FileReplacer: Send + Sync {
    /// Atomically move `from` over `to`
    fn replace(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Write `contents` straight into `to`
    fn overwrite(&self, to: &Path, contents: &[u8]) -> std::io::Result<()>;
}

/// `std::fs` implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReplacer;

impl FileReplacer for FsReplacer {
    fn replace(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn overwrite(&self, to: &Path, contents: &[u8]) -> std::io::Result<()> {
        std::fs::write(to, contents)
    }
}

/// True when the error looks like another process holding the file
pub fn is_lock_error(error: &std::io::Error) -> bool {
    error.kind() == ErrorKind::PermissionDenied
        || error
            .raw_os_error()
            .is_some_and(|code| cfg!(windows) && WINDOWS_LOCK_CODES.contains(&code))
}

/// Write-to-temp-then-rename with bounded retry against external locks
#[derive(Clone)]
pub struct AtomicWriter {
    replacer: Arc<dyn FileReplacer>,
    max_attempts: u32,
    backoff: RecoveryStrategy,
}

impl std::fmt::Debug for AtomicWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicWriter")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Default for AtomicWriter {
    fn default() -> Self {
        Self::new(
            Arc::new(FsReplacer),
            DEFAULT_REPLACE_ATTEMPTS,
            RecoveryStrategy::Linear {
                step: Duration::from_millis(500),
            },
        )
    }
}

impl AtomicWriter {
    pub fn new(replacer: Arc<dyn FileReplacer>, max_attempts: u32, backoff: RecoveryStrategy) -> Self {
        Self {
            replacer,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Replace `dest` with `contents`.
    ///
    /// The temp file lives next to `dest` so the rename stays on one volume.
    /// It is removed on every exit path.
    pub fn write(&self, dest: &Path, contents: &[u8]) -> Result<(), PersistError> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let stem = dest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}_", stem))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| PersistError::io(dir, e))?;
        tmp.write_all(contents).map_err(|e| PersistError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| PersistError::io(tmp.path(), e))?;

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.replacer.replace(tmp.path(), dest) {
                Ok(()) => {
                    // The path is gone after the rename; drop the handle without
                    // trying to delete it.
                    if let Err(e) = tmp.into_temp_path().keep() {
                        tracing::debug!(path = %dest.display(), error = %e, "temp path already consumed by rename");
                    }
                    return Ok(());
                }
                Err(e) if is_lock_error(&e) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(path = %dest.display(), attempt, ?delay, error = %e, "destination locked, retrying replace");
                    last_error = Some(e);
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(PersistError::io(dest, e)),
            }
        }

        let lock_error = last_error.unwrap_or_else(|| std::io::Error::new(ErrorKind::Other, "replace never attempted"));
        tracing::warn!(
            path = %dest.display(),
            attempts = self.max_attempts,
            "atomic replace kept failing, falling back to direct overwrite"
        );
        match self.replacer.overwrite(dest, contents) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(path = %dest.display(), error = %e, "direct overwrite failed");
                Err(PersistError::Locked {
                    path: dest.to_path_buf(),
                    source: lock_error,
                })
            }
        }
    }
}
