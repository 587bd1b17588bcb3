use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::{header, Client, Response};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::sse::{SseDecoder, SseMessage};
use crate::types::{JobEvent, JobEventType, JobStatus};

/// Callback invoked once per decoded lifecycle event.
pub type EventHandler = Arc<dyn Fn(JobEvent) + Send + Sync>;

/// Diagnostic view of the stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// Stream is open. `session` counts successful connects, starting at 1.
    Open { session: u64 },
    /// The last attempt or session failed; waiting to try again.
    Reconnecting { attempt: u32, error: String },
    /// The listener was closed and will not reconnect.
    Closed,
}

#[derive(Clone, Default)]
struct HandlerSlot(Arc<RwLock<Option<EventHandler>>>);

impl HandlerSlot {
    fn replace(&self, handler: Option<EventHandler>) {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = handler;
    }

    /// Run the current handler, if any. The read guard is held for the
    /// duration of the call so `replace` waits for in-flight dispatches.
    fn dispatch(&self, event: JobEvent) -> bool {
        let guard = match self.0.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

#[derive(Deserialize)]
struct EventBody {
    #[serde(default)]
    event_type: Option<String>,
    job_id: String,
    #[serde(default)]
    status: Option<JobStatus>,
    timestamp: DateTime<Utc>,
}

/// Turn one SSE message into a lifecycle event.
///
/// Returns `Ok(None)` for event names outside the five lifecycle types and
/// `Err` for a recognized name with an unparseable body. The SSE event name
/// decides `event_type`; the body's own `event_type` is informational.
pub fn decode_event(message: &SseMessage) -> Result<Option<JobEvent>> {
    let Some(event_type) = JobEventType::parse(&message.event) else {
        return Ok(None);
    };

    let body: EventBody = serde_json::from_str(&message.data)?;
    if let Some(named) = body.event_type.as_deref() {
        if named != event_type.as_str() {
            debug!(
                sse_event = %message.event,
                body_event = named,
                "event body disagrees with stream tag, using stream tag"
            );
        }
    }

    Ok(Some(JobEvent {
        event_type,
        job_id: body.job_id,
        status: body.status,
        timestamp: body.timestamp,
    }))
}

/// Long-lived subscriber to the backend's lifecycle event stream.
///
/// Runs a background task that connects, decodes events and hands them to
/// the registered handler in wire order. Any transport failure or server
/// close is logged and followed by a reconnect after the configured delay
/// (or the server's `retry:` value); there is no retry limit. Dropping or
/// [closing](Self::close) the listener stops the task, and no handler is
/// called after that returns.
///
/// Must be created inside a tokio runtime.
///
/// # Example
/// ```no_run
/// use job_sync::EventListener;
/// use std::time::Duration;
///
/// # async fn example() {
/// let listener = EventListener::spawn(
///     reqwest::Client::new(),
///     "http://127.0.0.1:8000/api/jobs/stream",
///     Duration::from_secs(3),
/// );
/// listener.set_handler(|event| println!("{} {}", event.event_type, event.job_id));
/// # }
/// ```
pub struct EventListener {
    url: String,
    handler: HandlerSlot,
    state: Arc<watch::Sender<ConnectionState>>,
    task: Option<JoinHandle<()>>,
}

impl EventListener {
    /// Start listening on `url` in a background task.
    pub fn spawn(http: Client, url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let url = url.into();
        let handler = HandlerSlot::default();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state_tx);

        let task = StreamTask {
            http,
            url: url.clone(),
            reconnect_delay,
            handler: handler.clone(),
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(task.run());

        Self {
            url,
            handler,
            state,
            task: Some(task),
        }
    }

    /// Register the handler for subsequent events, replacing any previous one.
    ///
    /// The handler runs on the listener task and must not call back into
    /// `set_handler`/`clear_handler`.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(JobEvent) + Send + Sync + 'static,
    {
        self.handler.replace(Some(Arc::new(handler)));
    }

    /// Remove the handler; events received meanwhile are dropped.
    pub fn clear_handler(&self) {
        self.handler.replace(None);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop listening. No handler call happens after this returns.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            self.handler.replace(None);
            task.abort();
            self.state.send_replace(ConnectionState::Closed);
            info!(url = %self.url, "job event stream closed");
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("url", &self.url)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

struct StreamTask {
    http: Client,
    url: String,
    reconnect_delay: Duration,
    handler: HandlerSlot,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl StreamTask {
    async fn run(self) {
        let mut decoder = SseDecoder::new();
        let mut session: u64 = 0;
        let mut attempt: u32 = 0;

        loop {
            let last_event_id = decoder.last_event_id().map(str::to_owned);
            let error = match self.connect(last_event_id.as_deref()).await {
                Ok(resp) => {
                    session += 1;
                    attempt = 0;
                    info!(session, url = %self.url, "job event stream connected");
                    self.state.send_replace(ConnectionState::Open { session });

                    decoder.reset();
                    match self.consume(resp, &mut decoder).await {
                        Ok(()) => "stream closed by server".to_string(),
                        Err(e) => e.to_string(),
                    }
                }
                Err(e) => e.to_string(),
            };

            attempt = attempt.saturating_add(1);
            let delay = decoder.retry().unwrap_or(self.reconnect_delay);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "job event stream disconnected, reconnecting"
            );
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt, error });
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect(&self, last_event_id: Option<&str>) -> Result<Response> {
        let mut request = self
            .http
            .get(&self.url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }

        let resp = request.send().await.map_err(|e| SyncError::Network {
            context: format!("Cannot open job event stream at {}", self.url),
            source: e,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Http { status, body });
        }
        Ok(resp)
    }

    async fn consume(&self, resp: Response, decoder: &mut SseDecoder) -> Result<()> {
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SyncError::Network {
                context: "Job event stream read failed".into(),
                source: e,
            })?;

            for message in decoder.feed(&chunk) {
                match decode_event(&message) {
                    Ok(Some(event)) => {
                        let job_id = event.job_id.clone();
                        if !self.handler.dispatch(event) {
                            debug!(job_id = %job_id, "no event handler registered, dropping event");
                        }
                    }
                    Ok(None) => {
                        debug!(event = %message.event, "ignoring unrecognized event type");
                    }
                    Err(e) => {
                        debug!(event = %message.event, error = %e, "ignoring malformed event payload");
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn message(event: &str, data: &str) -> SseMessage {
        SseMessage {
            event: event.to_string(),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn test_decode_known_event() {
        let msg = message(
            "JobStarted",
            r#"{"event_type": "JobStarted", "job_id": "J1", "timestamp": "2025-03-01T12:00:00+00:00"}"#,
        );
        let event = decode_event(&msg).unwrap().unwrap();
        assert_eq!(event.event_type, JobEventType::JobStarted);
        assert_eq!(event.job_id, "J1");
        assert_eq!(event.status, None);
    }

    #[test]
    fn test_decode_uses_stream_tag() {
        let msg = message(
            "JobFailed",
            r#"{"event_type": "JobCompleted", "job_id": "J1", "status": "FAILED", "timestamp": "2025-03-01T12:00:00Z"}"#,
        );
        let event = decode_event(&msg).unwrap().unwrap();
        assert_eq!(event.event_type, JobEventType::JobFailed);
        assert_eq!(event.status, Some(JobStatus::Failed));
    }

    #[test]
    fn test_decode_unknown_event_type() {
        let msg = message("JobExploded", r#"{"job_id": "J1"}"#);
        assert!(decode_event(&msg).unwrap().is_none());
        let msg = message("message", "not even json");
        assert!(decode_event(&msg).unwrap().is_none());
    }

    #[test]
    fn test_decode_malformed_payload() {
        let msg = message("JobStarted", "{not json");
        assert!(matches!(decode_event(&msg), Err(SyncError::Json(_))));
        let msg = message("JobStarted", r#"{"event_type": "JobStarted"}"#);
        assert!(decode_event(&msg).is_err());
    }

    #[test]
    fn test_handler_slot_replace_semantics() {
        let slot = HandlerSlot::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        assert!(!slot.dispatch(JobEvent::new(JobEventType::JobCreated, "J0")));

        let first = Arc::clone(&seen);
        slot.replace(Some(Arc::new(move |e: JobEvent| {
            first.lock().unwrap().push(format!("first:{}", e.job_id))
        })));
        assert!(slot.dispatch(JobEvent::new(JobEventType::JobCreated, "J1")));

        let second = Arc::clone(&seen);
        slot.replace(Some(Arc::new(move |e: JobEvent| {
            second.lock().unwrap().push(format!("second:{}", e.job_id))
        })));
        slot.dispatch(JobEvent::new(JobEventType::JobStarted, "J2"));

        slot.replace(None);
        assert!(!slot.dispatch(JobEvent::new(JobEventType::JobStarted, "J3")));

        assert_eq!(*seen.lock().unwrap(), vec!["first:J1", "second:J2"]);
    }

    #[tokio::test]
    async fn test_unreachable_stream_keeps_reconnecting() {
        let listener = EventListener::spawn(
            Client::new(),
            "http://127.0.0.1:1/api/jobs/stream",
            Duration::from_millis(10),
        );
        let mut state = listener.subscribe_state();
        let reached = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, ConnectionState::Reconnecting { attempt, .. } if *attempt >= 2)),
        )
        .await
        .is_ok();
        assert!(reached);

        listener.close();
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }
}
