//! HTTP adapter: Remote implementation of ScoringOracle.
//!
//! Talks to a prediction service using a submit/poll/retrieve protocol:
//!
//! 1. `POST {base}/models/{model_id}/predictions` with `{"rows": [...]}`
//!    returns `{"job_id": "..."}`
//! 2. `GET {base}/jobs/{job_id}` returns `{"status": "queued" | "running" |
//!    "completed" | "failed", "message": ...}`
//! 3. `GET {base}/jobs/{job_id}/result` returns
//!    `{"positive_probability": [...]}`
//!
//! Each row is a JSON object keyed by column name; missing cells are `null`.
//! The whole exchange is bounded by `max_wait`, after which the call fails
//! with `ScoringError::Timeout`.

use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::RecordSet;
use crate::ports::{ScoringError, ScoringOracle};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Connection settings for the prediction service.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpOracleConfig {
    pub base_url: String,
    /// Upper bound for submit + polling + retrieval
    pub max_wait: Duration,
    pub poll_interval: Duration,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
}

impl Default for HttpOracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_wait: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpOracleConfig {
    /// Defaults overridden by `ROIFORGE_ORACLE_*` environment variables.
    ///
    /// Invalid values are ignored.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Ok(url) = std::env::var("ROIFORGE_ORACLE_URL") {
            let url = url.trim();
            if !url.is_empty() {
                cfg.base_url = url.to_string();
            }
        }
        if let Some(secs) = env_parse::<u64>("ROIFORGE_ORACLE_MAX_WAIT_SECS") {
            if secs > 0 {
                cfg.max_wait = Duration::from_secs(secs);
            }
        }
        if let Some(ms) = env_parse::<u64>("ROIFORGE_ORACLE_POLL_MS") {
            if ms > 0 {
                cfg.poll_interval = Duration::from_millis(ms);
            }
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[derive(Serialize)]
struct PredictionRequest {
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct JobCreated {
    job_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Deserialize)]
struct JobStatus {
    status: JobState,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct PredictionResult {
    positive_probability: Vec<f64>,
}

/// Scoring oracle backed by a remote prediction service.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    config: HttpOracleConfig,
}

impl HttpOracle {
    /// Create a client for the configured service.
    ///
    /// # Errors
    /// Returns `ScoringError::ServiceUnavailable` if the HTTP client cannot
    /// be built.
    pub fn new(mut config: HttpOracleConfig) -> Result<Self, ScoringError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ScoringError::ServiceUnavailable(format!("failed to create HTTP client: {e}")))?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &HttpOracleConfig {
        &self.config
    }

    fn submit(&self, model_id: &str, records: &RecordSet) -> Result<String, ScoringError> {
        let url = format!("{}/models/{}/predictions", self.config.base_url, model_id);
        let body = PredictionRequest {
            rows: encode_rows(records),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.transport_error(e))?;
        let created: JobCreated = handle_response(response)?;
        Ok(created.job_id)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ScoringError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self.client.get(&url).send().map_err(|e| self.transport_error(e))?;
        handle_response(response)
    }

    fn transport_error(&self, e: reqwest::Error) -> ScoringError {
        if e.is_timeout() {
            tracing::warn!("Request exceeded {:?}: {}", self.config.request_timeout, e);
            ScoringError::Timeout(self.config.request_timeout)
        } else {
            ScoringError::ServiceUnavailable(format!("request failed: {e}"))
        }
    }

    fn wait_for(&self, job_id: &str, started: Instant) -> Result<(), ScoringError> {
        loop {
            let status: JobStatus = self.get(&format!("/jobs/{job_id}"))?;
            match status.status {
                JobState::Completed => return Ok(()),
                JobState::Failed => {
                    return Err(ScoringError::ServiceUnavailable(format!(
                        "prediction job {job_id} failed: {}",
                        status.message.unwrap_or_else(|| "no details".into())
                    )))
                }
                JobState::Queued | JobState::Running => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.max_wait {
                return Err(ScoringError::Timeout(self.config.max_wait));
            }
            std::thread::sleep(self.config.poll_interval.min(self.config.max_wait - elapsed));
        }
    }
}

impl ScoringOracle for HttpOracle {
    fn score(&self, model_id: &str, records: &RecordSet) -> Result<Vec<f64>, ScoringError> {
        let started = Instant::now();
        let job_id = self.submit(model_id, records)?;
        tracing::debug!("Submitted {} rows as job {}", records.len(), job_id);

        self.wait_for(&job_id, started)?;

        let result: PredictionResult = self.get(&format!("/jobs/{job_id}/result"))?;
        tracing::debug!(
            "Job {} finished in {:.1}s",
            job_id,
            started.elapsed().as_secs_f64()
        );
        Ok(result.positive_probability)
    }
}

fn encode_rows(records: &RecordSet) -> Vec<serde_json::Map<String, serde_json::Value>> {
    (0..records.len())
        .map(|i| {
            records
                .columns()
                .iter()
                .map(|c| {
                    let cell = serde_json::to_value(&c.values()[i]).unwrap_or(serde_json::Value::Null);
                    (c.name().to_string(), cell)
                })
                .collect()
        })
        .collect()
}

fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ScoringError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .map_err(|e| ScoringError::ServiceUnavailable(format!("unreadable response body: {e}")));
    }

    let detail = response.text().unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(ScoringError::InvalidInput(format!("{status}: {detail}")))
        }
        _ => Err(ScoringError::ServiceUnavailable(format!("{status}: {detail}"))),
    }
}
