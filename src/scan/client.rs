//! Remote scanning service client.
//!
//! Wire contract: `POST {base}/files` (multipart, field `file`) returns
//! `{"data":{"id":"..."}}`; `GET {base}/analyses/{id}` returns
//! `{"data":{"attributes":{"status":..,"stats":{..},"sha256":..}}}`.
//! Both carry the API key in an `x-apikey` header. Any deviation from this
//! shape is a protocol error, not a partial success.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::scan::verdict::EngineStats;

/// Default public API base.
pub const DEFAULT_API_BASE: &str = "https://www.virustotal.com/api/v3";

/// One fetched analysis report, flattened from the wire shape.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Remote analysis status (`queued`, `completed`, ...). Absent on older
    /// report shapes, in which case the report is taken as final.
    pub status: Option<String>,
    /// Per-engine category counts. Required on a usable report.
    pub stats: Option<EngineStats>,
    /// Content hash, used to build the report link.
    pub sha256: Option<String>,
}

impl AnalysisReport {
    /// Whether polling should stop. A report without a status field is
    /// treated as terminal rather than retried forever.
    pub fn is_terminal(&self) -> bool {
        match self.status.as_deref() {
            Some(status) => status == "completed",
            None => true,
        }
    }
}

/// The remote scanning service, seam for tests.
#[async_trait]
pub trait ScanService: Send + Sync {
    /// Upload a stored payload; returns the remote analysis id.
    async fn upload(&self, path: &Path, file_name: &str) -> Result<String, ScanError>;

    /// Fetch the analysis report for a previously returned id.
    async fn fetch_report(&self, analysis_id: &str) -> Result<AnalysisReport, ScanError>;
}

/// HTTP implementation over reqwest.
pub struct HttpScanService {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    upload_timeout: Duration,
    report_timeout: Duration,
}

impl HttpScanService {
    pub fn new(base_url: impl Into<String>, api_key: SecretString, config: &ScanConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            upload_timeout: config.upload_timeout,
            report_timeout: config.report_timeout,
        }
    }
}

#[async_trait]
impl ScanService for HttpScanService {
    async fn upload(&self, path: &Path, file_name: &str) -> Result<String, ScanError> {
        let file_bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/files", self.base_url))
            .header("x-apikey", self.api_key.expose_secret())
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| ScanError::RemoteTransport(format!("upload failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ScanError::RemoteProtocol(format!(
                "upload returned HTTP {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ScanError::RemoteProtocol(format!("upload body is not JSON: {e}")))?;
        parse_upload_body(&body)
    }

    async fn fetch_report(&self, analysis_id: &str) -> Result<AnalysisReport, ScanError> {
        let resp = self
            .client
            .get(format!("{}/analyses/{analysis_id}", self.base_url))
            .header("x-apikey", self.api_key.expose_secret())
            .timeout(self.report_timeout)
            .send()
            .await
            .map_err(|e| ScanError::RemoteTransport(format!("report fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ScanError::RemoteProtocol(format!(
                "report fetch returned HTTP {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ScanError::RemoteProtocol(format!("report body is not JSON: {e}")))?;
        parse_report_body(&body)
    }
}

/// Extract the analysis id from an upload response body.
fn parse_upload_body(body: &serde_json::Value) -> Result<String, ScanError> {
    body.get("data")
        .and_then(|d| d.get("id"))
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ScanError::RemoteProtocol("upload response missing analysis id".into()))
}

/// Flatten a report response body into [`AnalysisReport`].
fn parse_report_body(body: &serde_json::Value) -> Result<AnalysisReport, ScanError> {
    let attributes = body
        .get("data")
        .and_then(|d| d.get("attributes"))
        .ok_or_else(|| ScanError::RemoteProtocol("report response missing attributes".into()))?;

    let status = attributes
        .get("status")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    let stats = attributes
        .get("stats")
        .and_then(serde_json::Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n)))
                .collect::<EngineStats>()
        });

    let sha256 = attributes
        .get("sha256")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    Ok(AnalysisReport {
        status,
        stats,
        sha256,
    })
}
