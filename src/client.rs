use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::future::Future;

use crate::error::{Result, SyncError};
use crate::types::{CreateJobRequest, Job, NotificationChannel};

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Request/response operations against the job backend.
///
/// The store is generic over this trait so it can be driven by the real
/// HTTP client or by an in-memory double. Implementations must not retry;
/// every failure goes straight back to the caller.
pub trait JobApi: Send + Sync + 'static {
    /// Submit a new job. `duration_seconds` must be positive.
    fn create(
        &self,
        duration_seconds: u32,
        channel: NotificationChannel,
    ) -> impl Future<Output = Result<Job>> + Send;

    /// Fetch the full job collection.
    fn list(&self) -> impl Future<Output = Result<Vec<Job>>> + Send;

    /// Fetch a single job by id.
    fn get(&self, job_id: &str) -> impl Future<Output = Result<Job>> + Send;

    /// Ask the backend to cancel a job. Terminal jobs are rejected remotely.
    fn cancel(&self, job_id: &str) -> impl Future<Output = Result<Job>> + Send;
}

/// Async client for the job worker REST API.
///
/// No timeouts are applied here; pass a configured `reqwest::Client` via
/// [`with_http_client`](Self::with_http_client) if calls need a deadline.
///
/// # Example
/// ```no_run
/// use job_sync::{JobApi, JobApiClient, NotificationChannel};
///
/// # async fn example() -> job_sync::Result<()> {
/// let client = JobApiClient::new("http://127.0.0.1:8000");
/// let job = client.create(5, NotificationChannel::Email).await?;
/// let jobs = client.list().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JobApiClient {
    http: Client,
    endpoint: String,
}

impl JobApiClient {
    /// Create a new client pointing at the given backend base URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, timeouts, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The underlying HTTP client, shared with the event listener.
    pub fn http_client(&self) -> &Client {
        &self.http
    }

    /// URL of the job collection resource.
    pub fn jobs_url(&self) -> String {
        format!("{}/api/jobs", self.endpoint)
    }

    /// URL of the server-sent lifecycle event stream.
    pub fn stream_url(&self) -> String {
        format!("{}/api/jobs/stream", self.endpoint)
    }

    /// URL of one job, with `action` appended as a further path segment.
    /// The id is percent-encoded, so `/` or `?` in it stay inside the segment.
    pub fn job_url(&self, job_id: &str, action: Option<&str>) -> Result<Url> {
        let invalid = || SyncError::InvalidRequest(format!("invalid endpoint {}", self.endpoint));
        let mut url = Url::parse(&self.jobs_url()).map_err(|_| invalid())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
            segments.push(job_id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    fn unreachable(&self, source: reqwest::Error) -> SyncError {
        SyncError::Network {
            context: format!(
                "Cannot connect to job backend at {} (is the service running?)",
                self.endpoint
            ),
            source,
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response, context: &str) -> Result<T> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(SyncError::Http { status, body });
    }

    resp.json().await.map_err(|e| SyncError::Network {
        context: context.to_string(),
        source: e,
    })
}

impl JobApi for JobApiClient {
    async fn create(&self, duration_seconds: u32, channel: NotificationChannel) -> Result<Job> {
        if duration_seconds == 0 {
            return Err(SyncError::InvalidRequest(
                "duration_seconds must be a positive integer".into(),
            ));
        }

        let body = CreateJobRequest {
            duration_seconds,
            notification_channel: channel,
        };
        let resp = self
            .http
            .post(self.jobs_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        read_json(resp, "Failed to parse job backend create response").await
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let resp = self
            .http
            .get(self.jobs_url())
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        read_json(resp, "Failed to parse job backend list response").await
    }

    async fn get(&self, job_id: &str) -> Result<Job> {
        let url = self.job_url(job_id, None)?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Network {
                context: format!("Failed to fetch job {}", job_id),
                source: e,
            })?;

        read_json(resp, "Failed to parse job backend get response").await
    }

    async fn cancel(&self, job_id: &str) -> Result<Job> {
        let url = self.job_url(job_id, Some("cancel"))?;
        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| SyncError::Network {
                context: format!("Failed to send cancel for job {}", job_id),
                source: e,
            })?;

        read_json(resp, "Failed to parse job backend cancel response").await
    }
}
