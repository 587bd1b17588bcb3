//! Display helpers for job lists: badge colors, row formatting, and
//! create-form input validation.

use chrono::Local;

use crate::error::{Result, SyncError};
use crate::types::{Job, JobStatus};

const PENDING_COLOR: &str = "#6b7280";

/// Badge color for a status string. Unknown statuses look like `PENDING`.
pub fn badge_color(status: &str) -> &'static str {
    JobStatus::parse(status)
        .map(|s| s.badge_color())
        .unwrap_or(PENDING_COLOR)
}

impl JobStatus {
    pub fn badge_color(&self) -> &'static str {
        match self {
            JobStatus::Pending | JobStatus::Unknown => PENDING_COLOR,
            JobStatus::Running => "#3b82f6",
            JobStatus::Completed => "#22c55e",
            JobStatus::Failed => "#ef4444",
            JobStatus::Cancelled => "#eab308",
        }
    }
}

/// Whether a cancel action should be offered. The backend has the final say.
pub fn is_cancellable(job: &Job) -> bool {
    job.status.is_cancellable()
}

/// Validate the duration field of the create form.
pub fn parse_duration_input(input: &str) -> Result<u32> {
    match input.trim().parse::<u32>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(SyncError::InvalidRequest(
            "duration must be an integer of at least 1".into(),
        )),
    }
}

/// One formatted table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub short_id: String,
    pub status: String,
    pub duration: String,
    pub channel: String,
    pub created: String,
    pub cancellable: bool,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            short_id: job.id.chars().take(8).collect(),
            status: job.status.to_string(),
            duration: format!("{}s", job.duration_seconds),
            channel: job.notification_channel.to_string(),
            created: job
                .created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            cancellable: is_cancellable(job),
        }
    }
}

/// Render jobs as a fixed-width text table.
pub fn render_table(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No jobs".to_string();
    }

    let mut out = format!(
        "{:<8}  {:<9}  {:>6}  {:<7}  {:<19}  {}\n",
        "ID", "STATUS", "SECS", "NOTIFY", "CREATED", "ACTION"
    );
    for row in jobs.iter().map(JobRow::from) {
        out.push_str(&format!(
            "{:<8}  {:<9}  {:>6}  {:<7}  {:<19}  {}\n",
            row.short_id,
            row.status,
            row.duration,
            row.channel,
            row.created,
            if row.cancellable { "cancel" } else { "" }
        ));
    }
    out
}
