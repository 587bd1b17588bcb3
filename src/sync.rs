use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::JobApiClient;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::listener::{ConnectionState, EventListener};
use crate::store::{JobStore, JobsView};
use crate::types::{Job, NotificationChannel};

/// A live, self-reconciling view of one backend's jobs.
///
/// Owns the REST client, the job store and the event listener. The
/// listener feeds the store from the moment of connection; the initial
/// snapshot is taken after the handler is registered so nothing between
/// the two is lost. Dropping the `JobSync` stops the listener.
///
/// # Example
/// ```no_run
/// use job_sync::{JobSync, NotificationChannel, SyncConfig};
///
/// # async fn example() -> job_sync::Result<()> {
/// let sync = JobSync::connect(SyncConfig::new("http://127.0.0.1:8000")).await;
/// sync.create(5, NotificationChannel::None).await?;
///
/// let mut updates = sync.subscribe();
/// while updates.changed().await.is_ok() {
///     let jobs = updates.borrow_and_update().clone();
///     println!("{} jobs", jobs.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JobSync {
    store: JobStore<JobApiClient>,
    listener: EventListener,
    resync: Option<JoinHandle<()>>,
}

impl JobSync {
    /// Start synchronizing. Never fails: an unreachable backend leaves the
    /// view empty while the listener keeps retrying.
    pub async fn connect(config: SyncConfig) -> Self {
        let mut api = JobApiClient::new(config.endpoint);
        if let Some(http) = config.http_client {
            api = api.with_http_client(http);
        }
        let http = api.http_client().clone();
        let stream_url = api.stream_url();

        let store = JobStore::spawn(api, config.transition_policy);
        let listener = EventListener::spawn(http, stream_url, config.reconnect_delay);
        listener.set_handler(store.event_handler());

        let resync = config
            .resync_on_reconnect
            .then(|| spawn_resync(store.clone(), listener.subscribe_state()));

        match store.reload().await {
            Ok(count) => info!(count, endpoint = %store.api().endpoint(), "initial job snapshot loaded"),
            Err(e) => warn!(error = %e, "initial job snapshot failed, view may be stale"),
        }

        Self {
            store,
            listener,
            resync,
        }
    }

    pub fn store(&self) -> &JobStore<JobApiClient> {
        &self.store
    }

    /// Current collection in snapshot order.
    pub fn jobs(&self) -> Vec<Job> {
        self.store.jobs()
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.store.get(job_id)
    }

    /// Receive a fresh view after every change to the collection.
    pub fn subscribe(&self) -> watch::Receiver<JobsView> {
        self.store.subscribe()
    }

    pub async fn create(&self, duration_seconds: u32, channel: NotificationChannel) -> Result<Job> {
        self.store.create(duration_seconds, channel).await
    }

    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        self.store.cancel(job_id).await
    }

    pub async fn reload(&self) -> Result<usize> {
        self.store.reload().await
    }

    pub async fn fetch(&self, job_id: &str) -> Result<Job> {
        self.store.fetch(job_id).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.listener.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.listener.subscribe_state()
    }

    /// Stop the listener and the resync task.
    pub fn close(self) {}
}

impl Drop for JobSync {
    fn drop(&mut self) {
        if let Some(task) = self.resync.take() {
            task.abort();
        }
    }
}

/// Reload whenever a stream session other than the first opens.
fn spawn_resync(
    store: JobStore<JobApiClient>,
    mut state: watch::Receiver<ConnectionState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_session = 0;
        loop {
            let session = match &*state.borrow_and_update() {
                ConnectionState::Open { session } => Some(*session),
                ConnectionState::Closed => break,
                _ => None,
            };

            if let Some(session) = session {
                if session > 1 && session != last_session {
                    info!(session, "job event stream reconnected, resyncing snapshot");
                    if let Err(e) = store.reload().await {
                        warn!(error = %e, "resync after reconnect failed, view may be stale");
                    }
                }
                last_session = session;
            }

            if state.changed().await.is_err() {
                break;
            }
        }
    })
}
