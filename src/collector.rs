// Collection cycle and daemon loop

use crate::error::{MeasurementError, PersistError, Result};
use crate::measure::{Backend, Measurer, ResultRecord, Target};
use crate::resilience::{RetryCoordinator, RetryOutcome};
use crate::storage::{Archive, MainStore};
use chrono::Utc;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Floor for the daemon interval
pub const MIN_INTERVAL_SECS: u64 = 5;
/// Intervals shorter than this get no jitter
const JITTER_THRESHOLD_SECS: u64 = 20;

const INSTALL_GUIDANCE: &str = "The speed test CLI was not found on PATH; using the built-in HTTP engine instead. \
The official CLI is more reliable and avoids 403 responses. Install it from https://www.speedtest.net/apps/cli, \
put it on PATH and verify with `speedtest -V`.";

/// What one cycle produced
#[derive(Debug, Default)]
pub struct CycleReport {
    pub recorded: Vec<ResultRecord>,
    pub abandoned: Vec<(Target, MeasurementError)>,
    pub archive_files: Vec<PathBuf>,
}

/// Sequential collector over a fixed target list
pub struct Collector<P, S> {
    measurer: Measurer<P, S>,
    retry: RetryCoordinator,
    store: MainStore,
    archive: Archive,
    targets: Vec<Target>,
    guidance_shown: bool,
}

impl<P: Backend, S: Backend> Collector<P, S> {
    pub fn new(
        measurer: Measurer<P, S>,
        retry: RetryCoordinator,
        store: MainStore,
        archive: Archive,
        targets: Vec<Target>,
    ) -> Self {
        let targets = if targets.is_empty() { vec![Target::Best] } else { targets };
        Self {
            measurer,
            retry,
            store,
            archive,
            targets,
            guidance_shown: false,
        }
    }

    pub fn measurer(&self) -> &Measurer<P, S> {
        &self.measurer
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Whether the install hint has been logged in this process
    pub fn guidance_shown(&self) -> bool {
        self.guidance_shown
    }

    /// Create the data directories and an empty main file
    pub fn prepare(&self) -> std::result::Result<(), PersistError> {
        self.archive.ensure_dir()?;
        self.store.ensure_exists()
    }

    /// Check engine selection, logging the install hint once.
    /// Fails only when the primary engine is required and missing.
    pub fn check_engines(&mut self) -> std::result::Result<(), MeasurementError> {
        let selection = self.measurer.select()?;
        if selection.primary_missing && !self.guidance_shown {
            tracing::info!("{}", INSTALL_GUIDANCE);
            self.guidance_shown = true;
        }
        Ok(())
    }

    /// Measure every target in order, then persist whatever succeeded.
    /// An engine that disappears mid-cycle stops the remaining targets, but
    /// results already measured are still written before the error returns.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.check_engines()?;

        let mut report = CycleReport::default();
        let mut fatal = None;
        for target in &self.targets {
            let measurer = &self.measurer;
            let outcome = match self.retry.run(target, |_attempt| measurer.measure(target)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(target_server = %target, error = %e, "engine lost mid-cycle, stopping");
                    fatal = Some(e);
                    break;
                }
            };
            match outcome {
                RetryOutcome::Succeeded { value, attempts } => {
                    tracing::debug!(target_server = %target, attempts, engine = value.engine_label(), "target measured");
                    report.recorded.push(value);
                }
                RetryOutcome::Abandoned { last_error, .. } => {
                    report.abandoned.push((target.clone(), last_error));
                }
            }
        }

        if report.recorded.is_empty() {
            if let Some(e) = fatal {
                return Err(e.into());
            }
            tracing::warn!(abandoned = report.abandoned.len(), "no successful measurements this cycle");
            return Ok(report);
        }

        report.archive_files = self.persist(report.recorded.clone()).await?;

        for record in &report.recorded {
            tracing::info!("{}  ->  {}", record.summary(), self.store.path().display());
        }
        if let Some(e) = fatal {
            return Err(e.into());
        }
        if !report.abandoned.is_empty() {
            tracing::warn!(
                recorded = report.recorded.len(),
                abandoned = report.abandoned.len(),
                "cycle finished with partial success"
            );
        }
        Ok(report)
    }

    /// Main window first, then one archive write per record
    async fn persist(&self, records: Vec<ResultRecord>) -> Result<Vec<PathBuf>> {
        let store = self.store.clone();
        let archive = self.archive.clone();

        let paths = tokio::task::spawn_blocking(move || -> std::result::Result<Vec<PathBuf>, PersistError> {
            let dataset = store.commit(&records, Utc::now())?;
            tracing::debug!(rows = dataset.len(), path = %store.path().display(), "main dataset written");

            let mut paths = Vec::with_capacity(records.len());
            for record in &records {
                paths.push(archive.append(record)?);
            }
            Ok(paths)
        })
        .await??;

        Ok(paths)
    }

    /// Run cycles until Ctrl-C. Measurement failures never stop the loop;
    /// persistence failures and a missing required engine do.
    pub async fn run_daemon(&mut self, interval_secs: u64, jitter_secs: u64) -> Result<()> {
        loop {
            self.run_cycle().await?;

            let pause = daemon_sleep(interval_secs, jitter_secs, &mut rand::rng());
            tracing::debug!(?pause, "sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, stopping collector");
                    return Ok(());
                }
            }
        }
    }
}

/// `max(5, interval)` seconds plus uniform jitter in `[-jitter, +jitter]`.
/// Jitter only applies to intervals of 20s or more.
pub fn daemon_sleep<R: Rng + ?Sized>(interval_secs: u64, jitter_secs: u64, rng: &mut R) -> Duration {
    let base = interval_secs.max(MIN_INTERVAL_SECS);
    let jitter = if interval_secs >= JITTER_THRESHOLD_SECS {
        jitter_secs.min(base) as i64
    } else {
        0
    };
    let offset = if jitter > 0 { rng.random_range(-jitter..=jitter) } else { 0 };
    let secs = (base as i64 + offset).max(0) as u64;
    Duration::from_secs(secs)
}
