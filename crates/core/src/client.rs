use crate::config::Settings;
use crate::domain::contract::{self, HealthStatus, PredictionRequest};
use crate::domain::prediction::PredictionRecord;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
// Backoff stops doubling after 2^6 times the base delay.
const MAX_BACKOFF_SHIFT: u32 = 6;
const PREDICT_PATH: &str = "/predict";
const HEALTH_PATH: &str = "/health";

#[async_trait::async_trait]
pub trait PredictionClient: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionRecord>;

    async fn health(&self) -> Result<HealthStatus>;
}

/// The server refused the request (HTTP 4xx). Never retried.
#[derive(Debug, Clone)]
pub struct RejectedByServer {
    pub status: u16,
    pub message: String,
}

impl fmt::Display for RejectedByServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prediction server rejected request (HTTP {}): {}", self.status, self.message)
    }
}

impl std::error::Error for RejectedByServer {}

#[derive(Debug, Clone)]
pub struct HttpPredictionClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff: Duration,
}

impl HttpPredictionClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_prediction_base_url()?.to_string();

        let timeout_secs = std::env::var("PREDICTION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("PREDICTION_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        Self::new(base_url, Duration::from_secs(timeout_secs), retries)
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration, retries: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build prediction http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            retries: retries.max(1),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Base delay before the first retry; doubles on each further attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * (1u32 << attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn predict_once(&self, request: &PredictionRequest) -> Result<PredictionRecord> {
        let res = self
            .http
            .post(self.url(PREDICT_PATH))
            .json(request)
            .send()
            .await
            .context("prediction request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read prediction response")?;

        if !status.is_success() {
            // Error bodies may be HTML from a proxy or a wrong base URL.
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|raw| contract::error_message(&raw).map(str::to_string))
                .unwrap_or_else(|| text.trim().to_string());
            if status.is_client_error() {
                return Err(RejectedByServer {
                    status: status.as_u16(),
                    message,
                }
                .into());
            }
            anyhow::bail!("prediction server HTTP {status}: {message}");
        }

        let raw = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("prediction response is not valid JSON: {text}"))?;
        contract::parse_prediction_response(raw)
    }
}

#[async_trait::async_trait]
impl PredictionClient for HttpPredictionClient {
    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionRecord> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.predict_once(request).await {
                Ok(record) => return Ok(record),
                Err(err) => {
                    if attempt >= self.retries || err.downcast_ref::<RejectedByServer>().is_some() {
                        return Err(err);
                    }
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "prediction failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn health(&self) -> Result<HealthStatus> {
        let res = self
            .http
            .get(self.url(HEALTH_PATH))
            .send()
            .await
            .context("health request failed")?;

        let status = res.status();
        anyhow::ensure!(status.is_success(), "prediction server health HTTP {status}");
        res.json::<HealthStatus>()
            .await
            .context("failed to parse health response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Serves the same canned HTTP response to every connection and counts
    /// the requests received.
    async fn canned_server(
        status_line: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {status_line}\r\n\
                     Content-Type: {content_type}\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), hits)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let Ok(n) = socket.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }

    fn client(base_url: &str, retries: u32) -> HttpPredictionClient {
        HttpPredictionClient {
            http: reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            base_url: base_url.to_string(),
            retries,
            backoff: DEFAULT_BACKOFF,
        }
        .with_backoff(Duration::from_millis(5))
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            name: "Ana".to_string(),
            age: 19,
            attendance_rate: 80,
            academic_percentage: 75,
            activities_participation: 1,
        }
    }

    #[tokio::test]
    async fn returns_record_on_success() {
        let (url, hits) = canned_server(
            "200 OK",
            "application/json",
            r#"{"student_name":"Ana","retention_status":"Retained","retention_probability":91.5,"risk_level":null}"#,
        )
        .await;

        let record = client(&url, 3).predict(&request()).await.unwrap();
        assert_eq!(record.retention_status, "Retained");
        assert_eq!(record.risk_level, "");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_up_to_limit() {
        let (url, hits) =
            canned_server("500 Internal Server Error", "text/html", "<h1>boom</h1>").await;

        let err = client(&url, 3).predict(&request()).await.unwrap_err();
        assert!(err.downcast_ref::<RejectedByServer>().is_none());
        assert!(err.to_string().contains("HTTP 500"));
        assert!(err.to_string().contains("<h1>boom</h1>"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn json_client_error_is_rejected_once_with_server_message() {
        let (url, hits) = canned_server(
            "400 Bad Request",
            "application/json",
            r#"{"error":"Age must be between 1 and 120."}"#,
        )
        .await;

        let err = client(&url, 3).predict(&request()).await.unwrap_err();
        let rejected = err.downcast_ref::<RejectedByServer>().unwrap();
        assert_eq!(rejected.status, 400);
        assert_eq!(rejected.message, "Age must be between 1 and 120.");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn html_client_error_is_rejected_once() {
        let (url, hits) =
            canned_server("404 Not Found", "text/html", "<html>Not Found</html>").await;

        let err = client(&url, 2).predict(&request()).await.unwrap_err();
        let rejected = err.downcast_ref::<RejectedByServer>().unwrap();
        assert_eq!(rejected.status, 404);
        assert_eq!(rejected.message, "<html>Not Found</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let client = HttpPredictionClient::new("http://localhost:5000", Duration::from_secs(1), 100)
            .unwrap();
        assert_eq!(client.backoff_for(1), Duration::from_secs(1));
        assert_eq!(client.backoff_for(3), Duration::from_secs(4));
        assert_eq!(client.backoff_for(7), Duration::from_secs(64));
        assert_eq!(client.backoff_for(99), Duration::from_secs(64));
    }

    #[test]
    fn joins_base_url_without_double_slash() {
        let client =
            HttpPredictionClient::new("http://localhost:5000/", Duration::from_secs(1), 3).unwrap();
        assert_eq!(client.url(PREDICT_PATH), "http://localhost:5000/predict");
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let client = HttpPredictionClient::new("http://localhost:5000", Duration::from_secs(1), 0)
            .unwrap();
        assert_eq!(client.retries, 1);
    }

    #[test]
    fn rejection_is_detectable_through_anyhow() {
        let err: anyhow::Error = RejectedByServer {
            status: 400,
            message: "Name cannot be empty.".to_string(),
        }
        .into();
        assert!(err.downcast_ref::<RejectedByServer>().is_some());
        assert!(err.to_string().contains("Name cannot be empty."));
    }

    #[test]
    fn parses_health_body() {
        let health: HealthStatus =
            serde_json::from_str(r#"{"status":"ok","model_available":true}"#).unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.model_available);
    }
}
