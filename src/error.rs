use thiserror::Error;

/// Errors returned by job-sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The backend returned a non-success HTTP status (e.g. a rejected cancel).
    #[error("Job backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A request precondition failed before anything was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The job store task is no longer running.
    #[error("Job store is closed")]
    StoreClosed,
}

impl SyncError {
    /// HTTP status of a backend rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the backend refused the command (any 4xx).
    pub fn is_rejection(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = SyncError::Http {
            status: 400,
            body: "Cannot transition from COMPLETED to CANCELLED".into(),
        };
        assert_eq!(
            err.to_string(),
            "Job backend returned HTTP 400: Cannot transition from COMPLETED to CANCELLED"
        );
        assert!(err.is_rejection());
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_server_error_is_not_rejection() {
        let err = SyncError::Http {
            status: 503,
            body: String::new(),
        };
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_non_http_errors_have_no_status() {
        assert_eq!(SyncError::StoreClosed.status(), None);
        assert!(!SyncError::InvalidRequest("duration".into()).is_rejection());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let err: SyncError = parse.unwrap_err().into();
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
