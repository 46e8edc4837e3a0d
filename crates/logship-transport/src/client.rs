use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship_core::{AgentConfig, LogRecord, Transport, TransportError};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Every delivery attempt is bounded by this timeout; a timeout is treated
/// like any other send failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const API_KEY_HEADER: &str = "X-Logship-Api-Key";

/// HTTP client for the collection endpoint
///
/// Stamps the application name onto every record at delivery time and
/// serializes timestamps as RFC 3339. Any non-success response or
/// transport-level failure is one failure outcome for the whole batch.
pub struct ApiClient {
    client: reqwest::Client,
    server_url: String,
    application: String,
    environment: Option<String>,
}

/// One record as it goes over the wire: the parsed record plus the
/// agent-wide application name
#[derive(Serialize)]
struct WireRecord<'a> {
    application: &'a str,
    #[serde(flatten)]
    record: &'a LogRecord,
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    application: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a str>,
    logs: Vec<WireRecord<'a>>,
}

#[derive(Serialize)]
struct HeartbeatPayload<'a> {
    application: &'a str,
    timestamp: DateTime<Utc>,
}

impl ApiClient {
    pub fn new(
        server_url: &str,
        api_key: &str,
        application: &str,
        environment: Option<String>,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(api_key)
                .map_err(|e| TransportError::Client(format!("Invalid API key header: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            application: application.to_string(),
            environment,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.server_url,
            &config.api_key,
            &config.application,
            config.environment.clone(),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), TransportError> {
        if records.is_empty() {
            return Ok(());
        }

        let payload = BatchPayload {
            application: &self.application,
            environment: self.environment.as_deref(),
            logs: records
                .iter()
                .map(|record| WireRecord {
                    application: &self.application,
                    record,
                })
                .collect(),
        };

        debug!(count = records.len(), "Sending log batch");

        let response = self
            .client
            .post(self.endpoint("/api/v1/logs/batch"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn send_heartbeat(&self, timestamp: DateTime<Utc>) -> Result<(), TransportError> {
        let payload = HeartbeatPayload {
            application: &self.application,
            timestamp,
        };

        let response = self
            .client
            .post(self.endpoint("/api/v1/logs/heartbeat"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
