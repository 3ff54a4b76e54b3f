use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::config::DaemonSettings;
use crate::domain::ProcessStatus;
use crate::error::MigrateError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonCounts {
    pub total: u64,
    pub processed: u64,
    pub not_processed: u64,
}

/// Body of the create/update calls to the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub process_id: String,
    pub source_files: Vec<String>,
    pub counts: DaemonCounts,
    pub percentage: f64,
    pub status: ProcessStatus,
    pub started_at: String,
    pub updated_at: String,
    pub elapsed_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonHandle {
    pub id: String,
}

pub trait DaemonClient: Send + Sync {
    fn create(&self, status: &DaemonStatus) -> Result<DaemonHandle, MigrateError>;
    fn update(&self, handle: &DaemonHandle, status: &DaemonStatus) -> Result<(), MigrateError>;
}

/// Counters of one migration run, turned into [`DaemonStatus`] snapshots.
#[derive(Debug, Clone)]
pub struct StatusReport {
    process_id: String,
    source_files: Vec<String>,
    total: u64,
    processed: u64,
    not_processed: u64,
    status: ProcessStatus,
    started_at: DateTime<Utc>,
    error_message: Option<String>,
}

impl StatusReport {
    pub fn new(process_id: impl Into<String>, source_files: Vec<String>, total: u64) -> Self {
        Self {
            process_id: process_id.into(),
            source_files,
            total,
            processed: 0,
            not_processed: 0,
            status: ProcessStatus::Initializing,
            started_at: Utc::now(),
            error_message: None,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn not_processed(&self) -> u64 {
        self.not_processed
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
        self.status = ProcessStatus::Running;
    }

    pub fn record_not_processed(&mut self) {
        self.not_processed += 1;
        self.status = ProcessStatus::Running;
    }

    /// Success when nothing failed, otherwise error with a count of failures.
    pub fn finish(&mut self) {
        if self.not_processed == 0 {
            self.status = ProcessStatus::Success;
        } else {
            self.status = ProcessStatus::Error;
            self.error_message
                .get_or_insert_with(|| format!("{} item(s) not processed", self.not_processed));
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ProcessStatus::Error;
        self.error_message = Some(message.into());
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let done = (self.processed + self.not_processed) as f64;
        (done / self.total as f64 * 100.0).min(100.0)
    }

    pub fn snapshot(&self) -> DaemonStatus {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> DaemonStatus {
        DaemonStatus {
            process_id: self.process_id.clone(),
            source_files: self.source_files.clone(),
            counts: DaemonCounts {
                total: self.total,
                processed: self.processed,
                not_processed: self.not_processed,
            },
            percentage: self.percentage(),
            status: self.status,
            started_at: self.started_at.to_rfc3339(),
            updated_at: now.to_rfc3339(),
            elapsed_seconds: (now - self.started_at).num_seconds().max(0),
            error_message: self.error_message.clone(),
        }
    }
}

/// Answer of the create call. Some daemons return a numeric id, some a
/// string, some nothing; without one the process id doubles as the handle.
#[derive(Debug, Deserialize)]
struct CreatedDaemon {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

impl CreatedDaemon {
    fn into_handle(self, process_id: &str) -> DaemonHandle {
        let id = match self.id {
            Some(serde_json::Value::String(text)) if !text.trim().is_empty() => text,
            Some(serde_json::Value::Number(number)) => number.to_string(),
            _ => process_id.to_string(),
        };
        DaemonHandle { id }
    }
}

/// Retry schedule of status calls: a bounded number of attempts with a
/// doubling pause, only for answers that mean "try again later".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub first_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            first_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Pause before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.first_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

enum Attempt {
    Done(Response),
    Busy {
        reason: String,
        response: Option<Response>,
    },
    Failed(MigrateError),
}

fn classify(result: reqwest::Result<Response>) -> Attempt {
    match result {
        Ok(response) if is_busy_status(response.status()) => Attempt::Busy {
            reason: format!("status {}", response.status().as_u16()),
            response: Some(response),
        },
        Ok(response) => Attempt::Done(response),
        Err(err) if err.is_timeout() || err.is_connect() => Attempt::Busy {
            reason: err.to_string(),
            response: None,
        },
        Err(err) => Attempt::Failed(MigrateError::DaemonHttp(err.to_string())),
    }
}

fn is_busy_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

#[derive(Clone)]
pub struct DaemonHttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl DaemonHttpClient {
    pub fn new(settings: &DaemonSettings) -> Result<Self, MigrateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biomed-migrate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MigrateError::DaemonHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| MigrateError::DaemonHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn create_request(&self, status: &DaemonStatus) -> RequestBuilder {
        let url = format!("{}/daemons", self.base_url);
        self.authorize(self.client.post(url)).json(status)
    }

    fn update_request(&self, handle: &DaemonHandle, status: &DaemonStatus) -> RequestBuilder {
        let url = format!("{}/daemons/{}", self.base_url, handle.id);
        self.authorize(self.client.put(url)).json(status)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends the request built by `build`, retrying busy answers on the
    /// client's schedule. Any final non-2xx answer becomes `DaemonStatus`.
    fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, MigrateError> {
        let mut retry = 0;
        let response = loop {
            let last = retry + 1 >= self.retry.attempts;
            match classify(build().send()) {
                Attempt::Done(response) => break response,
                Attempt::Failed(err) => return Err(err),
                Attempt::Busy { reason, response } if last => match response {
                    Some(response) => break response,
                    None => return Err(MigrateError::DaemonHttp(reason)),
                },
                Attempt::Busy { reason, .. } => {
                    let pause = self.retry.delay(retry);
                    tracing::debug!(%reason, retry, pause_ms = pause.as_millis() as u64, "daemon busy");
                    thread::sleep(pause);
                    retry += 1;
                }
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "daemon request failed".to_string());
            return Err(MigrateError::DaemonStatus { status, message });
        }
        Ok(response)
    }
}

impl DaemonClient for DaemonHttpClient {
    fn create(&self, status: &DaemonStatus) -> Result<DaemonHandle, MigrateError> {
        let response = self.send(|| self.create_request(status))?;
        let created: CreatedDaemon = response
            .json()
            .map_err(|err| MigrateError::DaemonHttp(err.to_string()))?;
        Ok(created.into_handle(&status.process_id))
    }

    fn update(&self, handle: &DaemonHandle, status: &DaemonStatus) -> Result<(), MigrateError> {
        self.send(|| self.update_request(handle, status))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn percentage_counts_both_outcomes() {
        let mut report = StatusReport::new("p-1", vec!["a.xlsx".to_string()], 4);
        assert_eq!(report.percentage(), 0.0);
        report.record_processed();
        report.record_not_processed();
        assert_eq!(report.percentage(), 50.0);
        assert_eq!(report.status(), ProcessStatus::Running);
    }

    #[test]
    fn empty_run_is_complete() {
        let mut report = StatusReport::new("p-2", Vec::new(), 0);
        report.finish();
        assert_eq!(report.percentage(), 100.0);
        assert_eq!(report.status(), ProcessStatus::Success);
    }

    #[test]
    fn failures_finish_as_error() {
        let mut report = StatusReport::new("p-3", Vec::new(), 1);
        report.record_not_processed();
        report.finish();
        let snapshot = report.snapshot();
        assert_eq!(snapshot.status, ProcessStatus::Error);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("1 item(s) not processed")
        );
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let report = StatusReport::new("p-4", vec!["x.vcf".to_string()], 2);
        let later = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        let json = serde_json::to_value(report.snapshot_at(later)).unwrap();
        assert_eq!(json["processId"], "p-4");
        assert_eq!(json["counts"]["notProcessed"], 0);
        assert_eq!(json["status"], "initializing");
        assert!(json["elapsedSeconds"].as_i64().unwrap() > 0);
        assert!(json.get("errorMessage").is_none());
    }

    fn http_client(token: Option<&str>) -> DaemonHttpClient {
        DaemonHttpClient::new(&DaemonSettings {
            base_url: "http://status.local/api/".to_string(),
            token: token.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn create_posts_to_daemons() {
        let client = http_client(Some("s3cret"));
        let status = StatusReport::new("cgh-1", Vec::new(), 0).snapshot();
        let request = client.create_request(&status).build().unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "http://status.local/api/daemons");
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer s3cret"
        );
        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["processId"], "cgh-1");
    }

    #[test]
    fn update_puts_to_handle() {
        let client = http_client(None);
        let status = StatusReport::new("vcf-2", Vec::new(), 3).snapshot();
        let handle = DaemonHandle {
            id: "41".to_string(),
        };
        let request = client.update_request(&handle, &status).build().unwrap();

        assert_eq!(request.method(), reqwest::Method::PUT);
        assert_eq!(request.url().as_str(), "http://status.local/api/daemons/41");
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn created_id_falls_back_to_process_id() {
        let numeric: CreatedDaemon = serde_json::from_str(r#"{"id": 17}"#).unwrap();
        assert_eq!(numeric.into_handle("p-1").id, "17");

        let text: CreatedDaemon = serde_json::from_str(r#"{"id": "d-9"}"#).unwrap();
        assert_eq!(text.into_handle("p-1").id, "d-9");

        let missing: CreatedDaemon = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.into_handle("p-1").id, "p-1");

        let null: CreatedDaemon = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(null.into_handle("p-1").id, "p-1");
    }

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
    }

    #[test]
    fn busy_statuses() {
        assert!(is_busy_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_busy_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_busy_status(StatusCode::NOT_FOUND));
        assert!(!is_busy_status(StatusCode::OK));
    }

    #[test]
    fn unreachable_daemon_gives_up() {
        let client = DaemonHttpClient::new(&DaemonSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            token: None,
        })
        .unwrap()
        .with_retry(RetryPolicy {
            attempts: 2,
            first_delay: Duration::from_millis(1),
        });
        let status = StatusReport::new("p-5", Vec::new(), 0).snapshot();
        let err = client.create(&status).unwrap_err();
        assert!(matches!(err, MigrateError::DaemonHttp(_)));
    }
}
