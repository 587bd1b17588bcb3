use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status lifecycle: Pending -> Running -> Completed/Failed/Cancelled
///
/// A status string the backend sends outside these five deserializes as
/// `Unknown`, so one odd record cannot fail a whole snapshot. It displays
/// like `Pending` but is neither cancellable nor terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parse one of the five backend status names. `UNKNOWN` is not one.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            "CANCELLED" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed, failed and cancelled jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Only pending or running jobs may be offered for cancellation.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Whether `target` can causally follow `self`.
    ///
    /// Skipping a stage is allowed (a missed `JobStarted` still lets a pending
    /// job complete), but a terminal status never moves and nothing moves back.
    pub fn can_advance_to(&self, target: JobStatus) -> bool {
        target.rank() > self.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending | JobStatus::Unknown => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the backend reports a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    None,
    Email,
    Discord,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::None => "none",
            NotificationChannel::Email => "email",
            NotificationChannel::Discord => "discord",
        }
    }

    /// Case-insensitive parse of `none`, `email` or `discord`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(NotificationChannel::None),
            "email" => Some(NotificationChannel::Email),
            "discord" => Some(NotificationChannel::Discord),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted unit of work, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub duration_seconds: u32,
    pub notification_channel: NotificationChannel,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_message: Option<String>,
    pub result_error: Option<String>,
}

impl Job {
    /// Describe every lifecycle invariant this record breaks.
    ///
    /// An empty list means the record is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.duration_seconds == 0 {
            problems.push("duration_seconds is not positive".to_string());
        }
        if let Some(started) = self.started_at {
            if started < self.created_at {
                problems.push("started_at precedes created_at".to_string());
            }
        }
        if let (Some(started), Some(completed)) = (self.started_at, self.completed_at) {
            if completed < started {
                problems.push("completed_at precedes started_at".to_string());
            }
        }
        if self.status.is_terminal() {
            match (&self.result_message, &self.result_error) {
                (Some(_), Some(_)) => {
                    problems.push("both result_message and result_error are set".to_string())
                }
                (None, None) if self.status != JobStatus::Cancelled => {
                    problems.push("terminal job has no result".to_string())
                }
                _ => {}
            }
        }

        problems
    }
}

/// The five lifecycle event kinds pushed on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobEventType {
    JobCreated,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

impl JobEventType {
    pub const ALL: [JobEventType; 5] = [
        JobEventType::JobCreated,
        JobEventType::JobStarted,
        JobEventType::JobCompleted,
        JobEventType::JobFailed,
        JobEventType::JobCancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventType::JobCreated => "JobCreated",
            JobEventType::JobStarted => "JobStarted",
            JobEventType::JobCompleted => "JobCompleted",
            JobEventType::JobFailed => "JobFailed",
            JobEventType::JobCancelled => "JobCancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// The status a job holds right after this event.
    pub fn target_status(&self) -> JobStatus {
        match self {
            JobEventType::JobCreated => JobStatus::Pending,
            JobEventType::JobStarted => JobStatus::Running,
            JobEventType::JobCompleted => JobStatus::Completed,
            JobEventType::JobFailed => JobStatus::Failed,
            JobEventType::JobCancelled => JobStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for JobEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient lifecycle notification. Carries a status signal only, never the
/// full job shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub event_type: JobEventType,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(event_type: JobEventType, job_id: impl Into<String>) -> Self {
        Self {
            event_type,
            job_id: job_id.into(),
            status: None,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /api/jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub duration_seconds: u32,
    #[serde(default)]
    pub notification_channel: NotificationChannel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_job() -> Job {
        Job {
            id: "0b5d7f0e-1111-2222-3333-444455556666".into(),
            status: JobStatus::Pending,
            duration_seconds: 5,
            notification_channel: NotificationChannel::Email,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            started_at: None,
            completed_at: None,
            result_message: None,
            result_error: None,
        }
    }

    #[test]
    fn test_parse_backend_job_response() {
        let json = r#"{
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "status": "COMPLETED",
            "duration_seconds": 3,
            "notification_channel": "discord",
            "created_at": "2025-03-01T12:00:00.123456+00:00",
            "started_at": "2025-03-01T12:00:01+00:00",
            "completed_at": "2025-03-01T12:00:04Z",
            "result_message": "Job completed after 3 seconds",
            "result_error": null
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.notification_channel, NotificationChannel::Discord);
        assert_eq!(job.duration_seconds, 3);
        assert!(job.invariant_violations().is_empty());
    }

    #[test]
    fn test_status_wire_names() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("pending"), None);
        assert_eq!(JobStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        let status: JobStatus = serde_json::from_str("\"ARCHIVED\"").unwrap();
        assert_eq!(status, JobStatus::Unknown);
        assert!(!status.is_terminal());
        assert!(!status.is_cancellable());
        assert!(status.can_advance_to(JobStatus::Running));
        assert!(!status.can_advance_to(JobStatus::Pending));

        let json = r#"{
            "id": "a1",
            "status": "ARCHIVED",
            "duration_seconds": 3,
            "notification_channel": "none",
            "created_at": "2025-03-01T12:00:00Z",
            "started_at": null,
            "completed_at": null,
            "result_message": null,
            "result_error": null
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.status, JobStatus::Unknown);
    }

    #[test]
    fn test_terminal_and_cancellable() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());

        assert!(JobStatus::Pending.is_cancellable());
        assert!(JobStatus::Running.is_cancellable());
        assert!(!JobStatus::Completed.is_cancellable());
    }

    #[test]
    fn test_can_advance_to() {
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_advance_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_advance_to(JobStatus::Cancelled));
        assert!(!JobStatus::Running.can_advance_to(JobStatus::Pending));
        assert!(!JobStatus::Running.can_advance_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_advance_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_event_type_mapping() {
        assert_eq!(JobEventType::JobCreated.target_status(), JobStatus::Pending);
        assert_eq!(JobEventType::JobStarted.target_status(), JobStatus::Running);
        assert_eq!(JobEventType::JobCompleted.target_status(), JobStatus::Completed);
        assert_eq!(JobEventType::JobFailed.target_status(), JobStatus::Failed);
        assert_eq!(JobEventType::JobCancelled.target_status(), JobStatus::Cancelled);
        assert_eq!(JobEventType::parse("JobStarted"), Some(JobEventType::JobStarted));
        assert_eq!(JobEventType::parse("JobExploded"), None);
        assert_eq!(JobEventType::parse("message"), None);
    }

    #[test]
    fn test_parse_event_without_status() {
        let json = r#"{"event_type": "JobStarted", "job_id": "J1", "timestamp": "2025-03-01T12:00:01.5+00:00"}"#;
        let event: JobEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, JobEventType::JobStarted);
        assert_eq!(event.job_id, "J1");
        assert_eq!(event.status, None);
    }

    #[test]
    fn test_channel_parse_and_default() {
        assert_eq!(NotificationChannel::default(), NotificationChannel::None);
        assert_eq!(NotificationChannel::parse("EMAIL"), Some(NotificationChannel::Email));
        assert_eq!(NotificationChannel::parse(" discord "), Some(NotificationChannel::Discord));
        assert_eq!(NotificationChannel::parse("slack"), None);
    }

    #[test]
    fn test_create_request_defaults_channel() {
        let req: CreateJobRequest = serde_json::from_str(r#"{"duration_seconds": 5}"#).unwrap();
        assert_eq!(req.notification_channel, NotificationChannel::None);

        let body = serde_json::to_value(CreateJobRequest {
            duration_seconds: 5,
            notification_channel: NotificationChannel::Email,
        })
        .unwrap();
        assert_eq!(body["notification_channel"], "email");
    }

    #[test]
    fn test_invariant_violations() {
        let mut job = sample_job();
        assert!(job.invariant_violations().is_empty());

        job.started_at = Some(job.created_at - chrono::Duration::seconds(1));
        assert_eq!(job.invariant_violations(), vec!["started_at precedes created_at"]);

        let mut job = sample_job();
        job.status = JobStatus::Failed;
        job.started_at = Some(job.created_at);
        job.completed_at = Some(job.created_at);
        job.result_message = Some("boom".into());
        job.result_error = Some("boom".into());
        assert_eq!(
            job.invariant_violations(),
            vec!["both result_message and result_error are set"]
        );
    }
}
