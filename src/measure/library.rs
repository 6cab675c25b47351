// Secondary engine: in-process HTTP measurement against speedtest.net servers

use crate::error::MeasurementError;
use crate::measure::models::{join_label, sanitize_server_info, EngineKind, ResultRecord, ServerInfo, Target};
use crate::measure::Backend;
use byte_unit::{Byte, UnitType};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};

pub const DEFAULT_SERVERS_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js&https_functional=true";

/// Candidates probed for latency when picking the best server
const BEST_SERVER_CANDIDATES: usize = 5;
const LATENCY_SAMPLES: usize = 3;
/// How many servers to pull when looking up a specific id
const LOOKUP_LIMIT: usize = 100;
const DOWNLOAD_SIZES: [u32; 4] = [350, 750, 1000, 1500];
const UPLOAD_SIZES: [usize; 3] = [256 * 1024, 512 * 1024, 1024 * 1024];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw entry from the server-list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sponsor: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

impl ServerEntry {
    pub fn id_text(&self) -> String {
        match &self.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// `sponsor - name`
    pub fn label(&self) -> String {
        join_label(&[self.sponsor.as_deref(), self.name.as_deref()])
    }

    /// Directory holding `latency.txt`, the random images and `upload.php`
    pub fn base_url(&self) -> &str {
        match self.url.rsplit_once('/') {
            Some((base, _)) => base,
            None => &self.url,
        }
    }

    pub fn to_info(&self) -> ServerInfo {
        let (id, label) = sanitize_server_info(Some(&self.id_text()), Some(&self.label()));
        ServerInfo {
            id,
            label,
            country: self.country.clone().unwrap_or_default(),
            host: self.host.clone().unwrap_or_default(),
        }
    }
}

/// Megabits per second for `bytes` moved in `elapsed`
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / secs / 1_000_000.0
}

/// Index of the lowest finite latency
pub fn pick_lowest_latency(latencies: &[Option<f64>]) -> Option<usize> {
    latencies
        .iter()
        .enumerate()
        .filter_map(|(i, l)| l.filter(|v| v.is_finite()).map(|v| (i, v)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

fn human_bytes(bytes: u64) -> String {
    Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary).to_string()
}

fn map_request_error(error: reqwest::Error) -> MeasurementError {
    match error.status() {
        Some(status) if is_rate_limited(status) => MeasurementError::Transient(error.to_string()),
        _ => MeasurementError::EngineFailure {
            code: error.status().map(|s| i32::from(s.as_u16())),
            message: error.to_string(),
        },
    }
}

fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS
}

/// Secondary backend built on `reqwest`
#[derive(Debug, Clone)]
pub struct LibraryEngine {
    client: reqwest::Client,
    servers_url: String,
}

impl LibraryEngine {
    pub fn new(servers_url: impl Into<String>) -> Result<Self, MeasurementError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MeasurementError::EngineUnavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            servers_url: servers_url.into(),
        })
    }

    async fn fetch_servers(&self, limit: usize) -> Result<Vec<ServerEntry>, MeasurementError> {
        let response = self
            .client
            .get(&self.servers_url)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_request_error)?;

        response
            .json::<Vec<ServerEntry>>()
            .await
            .map_err(|e| MeasurementError::Parse(format!("server list: {}", e)))
    }

    /// The `count` closest servers, closest first
    pub async fn list_servers(&self, count: usize) -> Result<Vec<ServerInfo>, MeasurementError> {
        let count = count.max(1);
        let servers = self.fetch_servers(count).await?;
        Ok(servers.iter().take(count).map(ServerEntry::to_info).collect())
    }

    async fn latency_ms(&self, server: &ServerEntry) -> Result<f64, MeasurementError> {
        let url = format!("{}/latency.txt", server.base_url());
        let mut total = Duration::ZERO;
        for _ in 0..LATENCY_SAMPLES {
            let started = Instant::now();
            self.client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(map_request_error)?
                .bytes()
                .await
                .map_err(map_request_error)?;
            total += started.elapsed();
        }
        Ok(total.as_secs_f64() * 1000.0 / LATENCY_SAMPLES as f64)
    }

    async fn choose_server(&self, target: &Target) -> Result<(ServerEntry, f64), MeasurementError> {
        match target.server_id() {
            Some(wanted) => {
                let servers = self.fetch_servers(LOOKUP_LIMIT).await?;
                let server = servers
                    .into_iter()
                    .find(|s| sanitize_server_info(Some(&s.id_text()), None).0 == wanted)
                    .ok_or_else(|| MeasurementError::EngineFailure {
                        code: None,
                        message: format!("server {} not in candidate list", wanted),
                    })?;
                let latency = self.latency_ms(&server).await?;
                Ok((server, latency))
            }
            None => {
                let candidates = self.fetch_servers(BEST_SERVER_CANDIDATES).await?;
                let mut latencies = Vec::with_capacity(candidates.len());
                for candidate in &candidates {
                    match self.latency_ms(candidate).await {
                        Ok(ms) => latencies.push(Some(ms)),
                        Err(e) => {
                            tracing::debug!(server = %candidate.id_text(), error = %e, "latency probe failed");
                            latencies.push(None);
                        }
                    }
                }
                let best = pick_lowest_latency(&latencies).ok_or_else(|| MeasurementError::EngineFailure {
                    code: None,
                    message: "no reachable speed test server".to_string(),
                })?;
                let latency = latencies[best].unwrap_or_default();
                let server = candidates.into_iter().nth(best).ok_or_else(|| MeasurementError::EngineFailure {
                    code: None,
                    message: "best server vanished from candidate list".to_string(),
                })?;
                Ok((server, latency))
            }
        }
    }

    async fn download_mbps(&self, server: &ServerEntry) -> Result<f64, MeasurementError> {
        let started = Instant::now();
        let mut received: u64 = 0;
        for size in DOWNLOAD_SIZES {
            let url = format!("{}/random{}x{}.jpg", server.base_url(), size, size);
            let body = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(map_request_error)?
                .bytes()
                .await
                .map_err(map_request_error)?;
            received += body.len() as u64;
        }
        let elapsed = started.elapsed();
        tracing::debug!(received = %human_bytes(received), ?elapsed, "download phase finished");
        Ok(throughput_mbps(received, elapsed))
    }

    async fn upload_mbps(&self, server: &ServerEntry) -> Result<f64, MeasurementError> {
        let started = Instant::now();
        let mut sent: u64 = 0;
        for size in UPLOAD_SIZES {
            let mut payload = String::with_capacity(size + 9);
            payload.push_str("content1=");
            payload.extend(std::iter::repeat('0').take(size));
            sent += payload.len() as u64;
            self.client
                .post(&server.url)
                .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(payload)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(map_request_error)?;
        }
        let elapsed = started.elapsed();
        tracing::debug!(sent = %human_bytes(sent), ?elapsed, "upload phase finished");
        Ok(throughput_mbps(sent, elapsed))
    }
}

impl Backend for LibraryEngine {
    async fn measure(&self, target: &Target) -> Result<ResultRecord, MeasurementError> {
        let (server, ping_ms) = self.choose_server(target).await?;
        tracing::debug!(server = %server.id_text(), label = %server.label(), ping_ms, "selected server");

        let download = self.download_mbps(&server).await?;
        let upload = self.upload_mbps(&server).await?;

        Ok(ResultRecord::new(
            Utc::now(),
            ping_ms,
            download,
            upload,
            Some(&server.id_text()),
            Some(&server.label()),
            EngineKind::Secondary,
        ))
    }
}
