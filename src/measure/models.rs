// Measurement data models

use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;

/// Canonical on-disk timestamp form
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const NULL_TOKENS: [&str; 2] = ["nan", "none"];

/// Which backend produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// External command-line tool
    Primary,
    /// Bundled HTTP library
    Secondary,
}

impl EngineKind {
    /// Column label written to the dataset files
    pub fn label(&self) -> &'static str {
        match self {
            EngineKind::Primary => "primary",
            EngineKind::Secondary => "secondary",
        }
    }

    /// Parse a stored engine label, accepting the historic tags too
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "primary" | "ookla-cli" => Some(EngineKind::Primary),
            "secondary" | "python-lib" => Some(EngineKind::Secondary),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One measurement target: a specific server, or whatever the engine picks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Best,
    Server(String),
}

impl Target {
    /// Server id to pass to an engine, if any
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Target::Best => None,
            Target::Server(id) => Some(id),
        }
    }

    /// Parse a comma-separated id list; an empty list means the best server
    pub fn parse_list(raw: &str) -> Result<Vec<Target>, String> {
        let mut targets = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("server id '{}' is not numeric", part));
            }
            targets.push(Target::Server(part.to_string()));
        }
        if targets.is_empty() {
            targets.push(Target::Best);
        }
        Ok(targets)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Best => f.write_str("(best)"),
            Target::Server(id) => f.write_str(id),
        }
    }
}

/// A completed measurement. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    timestamp: DateTime<Utc>,
    ping_ms: f64,
    download_mbps: f64,
    upload_mbps: f64,
    server_id: String,
    server_name: String,
    engine: Option<EngineKind>,
}

impl ResultRecord {
    /// Build a record, normalising every field on the way in.
    /// `engine` is `None` only for rows loaded from untagged files.
    pub fn new(
        timestamp: DateTime<Utc>,
        ping_ms: f64,
        download_mbps: f64,
        upload_mbps: f64,
        server_id: Option<&str>,
        server_name: Option<&str>,
        engine: impl Into<Option<EngineKind>>,
    ) -> Self {
        let (server_id, server_name) = sanitize_server_info(server_id, server_name);
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            ping_ms: round3(ping_ms),
            download_mbps: round3(download_mbps),
            upload_mbps: round3(upload_mbps),
            server_id,
            server_name,
            engine: engine.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn ping_ms(&self) -> f64 {
        self.ping_ms
    }

    pub fn download_mbps(&self) -> f64 {
        self.download_mbps
    }

    pub fn upload_mbps(&self) -> f64 {
        self.upload_mbps
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn engine(&self) -> Option<EngineKind> {
        self.engine
    }

    /// Stored engine tag; empty for untagged rows
    pub fn engine_label(&self) -> &'static str {
        self.engine.map_or("", |e| e.label())
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// UTC year-month of the timestamp, e.g. `2024-03`
    pub fn month_key(&self) -> String {
        self.timestamp.format("%Y-%m").to_string()
    }

    /// One-line operator summary
    pub fn summary(&self) -> String {
        format!(
            "[{}] ping={} ms, down={} Mbps, up={} Mbps, server={} {}, engine={}",
            self.timestamp_text(),
            self.ping_ms,
            self.download_mbps,
            self.upload_mbps,
            self.server_id,
            self.server_name,
            self.engine.map_or("unknown", |e| e.label())
        )
    }
}

/// Normalise a server id/name pair.
///
/// Values are trimmed, null-like tokens (`nan`, `None`, empty) collapse to an
/// empty string and numeric ids lose a trailing `.0` left by float round trips.
pub fn sanitize_server_info(server_id: Option<&str>, server_name: Option<&str>) -> (String, String) {
    let mut sid = collapse_null(server_id);
    if let Some(stripped) = sid.strip_suffix(".0") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            sid = stripped.to_string();
        }
    }
    (sid, collapse_null(server_name))
}

fn collapse_null(value: Option<&str>) -> String {
    let trimmed = value.unwrap_or_default().trim();
    if NULL_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Round to three decimals; negative or non-finite input becomes zero
pub fn round3(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    (value * 1000.0).round() / 1000.0
}

/// Join non-empty label parts with ` - `
pub fn join_label(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
}

/// A server the secondary backend can measure against
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub id: String,
    pub label: String,
    pub country: String,
    pub host: String,
}
