// Primary engine: the external speed test command-line tool

use crate::error::MeasurementError;
use crate::measure::models::{join_label, EngineKind, ResultRecord, Target};
use crate::measure::Backend;
use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Hard ceiling for one tool invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Phrases the tool prints when it is waiting for licence/consent acceptance.
/// There is no structured signal for this; if the vendor rewords its prompt
/// the failure degrades to a generic `EngineFailure`.
const LICENSE_PHRASES: [&str; 2] = ["license", "personal, non-commercial use"];

const RATE_LIMIT_PHRASES: [&str; 3] = ["403", "forbidden", "429"];

const DIAGNOSTIC_LIMIT: usize = 200;

/// Locates executables on the host
#[cfg_attr(test, mockall::automock)]
pub trait ToolLocator: Send + Sync {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// PATH lookup through the `which` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLocator;

impl ToolLocator for PathLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Captured result of one process run
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> impl Future<Output = std::io::Result<CommandOutput>> + Send;
}

/// `tokio::process` runner; the child is killed if the timeout fires
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> std::io::Result<CommandOutput> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} timed out after {}s", program, timeout.as_secs()),
                )
            })??;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The two output-format spellings found across installed tool versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStyle {
    /// `--format=json`
    Long,
    /// `-f json`
    Short,
}

/// Build the non-interactive argument list for one invocation
pub fn build_args(target: &Target, style: FormatStyle) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--progress=no".to_string(),
        "--accept-license".to_string(),
        "--accept-gdpr".to_string(),
    ];
    match style {
        FormatStyle::Long => args.push("--format=json".to_string()),
        FormatStyle::Short => {
            args.push("-f".to_string());
            args.push("json".to_string());
        }
    }
    if let Some(id) = target.server_id() {
        args.push("--server-id".to_string());
        args.push(id.to_string());
    }
    args
}

#[derive(Debug, Default, Deserialize)]
struct CliReport {
    #[serde(default)]
    ping: CliPing,
    #[serde(default)]
    download: CliBandwidth,
    #[serde(default)]
    upload: CliBandwidth,
    #[serde(default)]
    server: Option<CliServer>,
}

#[derive(Debug, Default, Deserialize)]
struct CliPing {
    #[serde(default)]
    latency: f64,
}

#[derive(Debug, Default, Deserialize)]
struct CliBandwidth {
    /// Bytes per second
    #[serde(default)]
    bandwidth: f64,
}

#[derive(Debug, Default, Deserialize)]
struct CliServer {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// Decode the tool's JSON report into a record stamped now
pub fn parse_report(stdout: &str) -> Result<ResultRecord, MeasurementError> {
    let report: CliReport = serde_json::from_str(stdout.trim()).map_err(|e| {
        MeasurementError::Parse(format!("{}; stdout starts with {:?}", e, truncate(stdout, DIAGNOSTIC_LIMIT)))
    })?;

    let server = report.server.unwrap_or_default();
    let server_id = match server.id {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let server_name = join_label(&[server.name.as_deref(), server.location.as_deref()]);

    Ok(ResultRecord::new(
        Utc::now(),
        report.ping.latency,
        bytes_per_sec_to_mbps(report.download.bandwidth),
        bytes_per_sec_to_mbps(report.upload.bandwidth),
        Some(&server_id),
        Some(&server_name),
        EngineKind::Primary,
    ))
}

/// bytes/s -> bits/s -> Mbps
pub fn bytes_per_sec_to_mbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / 1_000_000.0
}

/// Classify a non-zero exit from the combined output text
pub fn classify_failure(output: &CommandOutput) -> MeasurementError {
    let combined = format!("{}\n{}", output.stdout, output.stderr).to_lowercase();

    if LICENSE_PHRASES.iter().any(|p| combined.contains(p)) {
        return MeasurementError::LicenseRequired(
            "the tool exited non-zero despite --accept-license/--accept-gdpr; run it once manually \
             (speedtest --accept-license --accept-gdpr -f json --progress=no) to seed acceptance"
                .to_string(),
        );
    }

    let diagnostic = if output.stderr.trim().is_empty() {
        truncate(&output.stdout, DIAGNOSTIC_LIMIT)
    } else {
        truncate(&output.stderr, DIAGNOSTIC_LIMIT)
    };

    if RATE_LIMIT_PHRASES.iter().any(|p| combined.contains(p)) {
        return MeasurementError::Transient(diagnostic);
    }

    MeasurementError::EngineFailure {
        code: output.code,
        message: diagnostic,
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.trim().chars().take(limit).collect()
}

/// Primary backend wrapping the external tool
pub struct CliEngine<R: CommandRunner = ProcessRunner> {
    program: String,
    timeout: Duration,
    runner: R,
    locator: Box<dyn ToolLocator>,
}

impl CliEngine<ProcessRunner> {
    /// Engine running `program` from PATH as a real child process
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self::with_parts(program, timeout, ProcessRunner, Box::new(PathLocator))
    }
}

impl<R: CommandRunner> CliEngine<R> {
    pub fn with_parts(program: impl Into<String>, timeout: Duration, runner: R, locator: Box<dyn ToolLocator>) -> Self {
        Self {
            program: program.into(),
            timeout,
            runner,
            locator,
        }
    }

    async fn invoke(&self, target: &Target) -> Result<ResultRecord, MeasurementError> {
        let program = self
            .locator
            .locate(&self.program)
            .ok_or_else(|| MeasurementError::EngineUnavailable(format!("'{}' not found on PATH", self.program)))?;
        let program = program.to_string_lossy().into_owned();

        let mut last_error = None;
        for style in [FormatStyle::Long, FormatStyle::Short] {
            let args = build_args(target, style);
            tracing::debug!(program = %program, ?args, "invoking speed test CLI");

            let output = self
                .runner
                .run(&program, &args, self.timeout)
                .await
                .map_err(|e| MeasurementError::EngineFailure {
                    code: None,
                    message: format!("failed to run {}: {}", program, e),
                })?;

            if output.success() {
                match parse_report(&output.stdout) {
                    Ok(record) => return Ok(record),
                    Err(e) => {
                        tracing::debug!(?style, error = %e, "CLI output not parseable, trying next format style");
                        last_error = Some(e);
                        continue;
                    }
                }
            }

            match classify_failure(&output) {
                license @ MeasurementError::LicenseRequired(_) => return Err(license),
                other => {
                    tracing::debug!(?style, error = %other, "CLI invocation failed");
                    last_error = Some(other);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| MeasurementError::EngineFailure {
            code: None,
            message: "no invocation style attempted".to_string(),
        }))
    }
}

impl<R: CommandRunner> Backend for CliEngine<R> {
    fn is_available(&self) -> bool {
        self.locator.locate(&self.program).is_some()
    }

    async fn measure(&self, target: &Target) -> Result<ResultRecord, MeasurementError> {
        self.invoke(target).await
    }
}
