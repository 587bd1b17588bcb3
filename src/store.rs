//! The reconciliation core.
//!
//! A single task owns the job collection. Snapshots from [`JobApi::list`]
//! and events from the stream both arrive as messages on one queue, so every
//! mutation is applied whole and in arrival order. A snapshot is ground
//! truth; events are fast-path hints that either set one job's status or,
//! when they name a job the store has never seen, trigger a fresh snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::client::JobApi;
use crate::error::{Result, SyncError};
use crate::types::{Job, JobEvent, JobStatus, NotificationChannel};

/// Shared, immutable view of the collection in snapshot order.
pub type JobsView = Arc<Vec<Job>>;

/// How an event's status is applied to a known job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Assign the mapped status unconditionally. A late event can move a
    /// job backwards until the next snapshot corrects it.
    #[default]
    LastWriteWins,
    /// Ignore events whose status cannot causally follow the current one
    /// (see [`JobStatus::can_advance_to`]).
    Monotonic,
}

/// Result of applying one event to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied {
        previous: JobStatus,
        current: JobStatus,
    },
    /// The job already had the mapped status.
    Unchanged,
    /// Refused by [`TransitionPolicy::Monotonic`].
    Rejected {
        current: JobStatus,
        target: JobStatus,
    },
    /// No job with this id; the caller should reload.
    UnknownJob,
}

/// Id-keyed job collection that remembers snapshot order.
#[derive(Debug, Clone, Default)]
pub struct JobCollection {
    jobs: HashMap<String, Job>,
    order: Vec<String>,
}

impl JobCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(jobs: Vec<Job>) -> Self {
        let mut collection = Self::new();
        collection.replace(jobs);
        collection
    }

    /// Replace everything with `snapshot`. A repeated id keeps its first
    /// position and its last record.
    pub fn replace(&mut self, snapshot: Vec<Job>) {
        self.jobs.clear();
        self.order.clear();
        for job in snapshot {
            if !self.jobs.contains_key(&job.id) {
                self.order.push(job.id.clone());
            }
            self.jobs.insert(job.id.clone(), job);
        }
    }

    /// Set the event's mapped status on the job it names. Only `status`
    /// is touched; every other attribute comes from snapshots.
    pub fn apply(&mut self, event: &JobEvent, policy: TransitionPolicy) -> EventOutcome {
        let target = event.event_type.target_status();
        let Some(job) = self.jobs.get_mut(&event.job_id) else {
            return EventOutcome::UnknownJob;
        };

        let previous = job.status;
        if previous == target {
            return EventOutcome::Unchanged;
        }
        if policy == TransitionPolicy::Monotonic && !previous.can_advance_to(target) {
            return EventOutcome::Rejected {
                current: previous,
                target,
            };
        }

        job.status = target;
        EventOutcome::Applied {
            previous,
            current: target,
        }
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Jobs in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> + '_ {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    pub fn to_vec(&self) -> Vec<Job> {
        self.iter().cloned().collect()
    }
}

enum Command {
    Replace {
        jobs: Vec<Job>,
        done: Option<oneshot::Sender<()>>,
    },
    Apply(JobEvent),
}

/// Handle to the job store task.
///
/// Cheap to clone; all clones feed the same collection. Commands go through
/// the [`JobApi`] and are followed by a full reload, so the view never
/// depends on a matching event arriving. The task exits once every handle
/// and every [`event_handler`](Self::event_handler) closure is dropped.
///
/// # Example
/// ```no_run
/// use job_sync::{JobApiClient, JobStore, NotificationChannel, TransitionPolicy};
///
/// # async fn example() -> job_sync::Result<()> {
/// let store = JobStore::spawn(
///     JobApiClient::new("http://127.0.0.1:8000"),
///     TransitionPolicy::default(),
/// );
/// store.reload().await?;
/// let job = store.create(5, NotificationChannel::Email).await?;
/// assert!(store.get(&job.id).is_some());
/// # Ok(())
/// # }
/// ```
pub struct JobStore<A: JobApi> {
    api: Arc<A>,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<JobsView>,
}

impl<A: JobApi> Clone for JobStore<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            commands: self.commands.clone(),
            view: self.view.clone(),
        }
    }
}

impl<A: JobApi> JobStore<A> {
    /// Start the store task. Must be called inside a tokio runtime.
    pub fn spawn(api: A, policy: TransitionPolicy) -> Self {
        let api = Arc::new(api);
        let (commands, rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(JobsView::default());

        let actor = StoreActor {
            collection: JobCollection::new(),
            policy,
            api: Arc::clone(&api),
            commands: commands.downgrade(),
            view: view_tx,
        };
        tokio::spawn(actor.run(rx));

        Self {
            api,
            commands,
            view,
        }
    }

    /// The backend this store reads from and sends commands to.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetch a full snapshot and make it the new baseline.
    ///
    /// Returns once the published view reflects the snapshot. On error the
    /// collection is left as it was.
    pub async fn reload(&self) -> Result<usize> {
        let jobs = self.api.list().await?;
        let count = jobs.len();

        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(Command::Replace {
                jobs,
                done: Some(done_tx),
            })
            .map_err(|_| SyncError::StoreClosed)?;
        done_rx.await.map_err(|_| SyncError::StoreClosed)?;

        Ok(count)
    }

    /// Queue one stream event for application.
    pub fn apply_event(&self, event: JobEvent) -> Result<()> {
        self.commands
            .send(Command::Apply(event))
            .map_err(|_| SyncError::StoreClosed)
    }

    /// A callback that feeds events into this store, suitable for
    /// [`EventListener::set_handler`](crate::EventListener::set_handler).
    pub fn event_handler(&self) -> impl Fn(JobEvent) + Send + Sync + 'static {
        let commands = self.commands.clone();
        move |event| {
            if commands.send(Command::Apply(event)).is_err() {
                warn!("job store closed, dropping event");
            }
        }
    }

    /// Submit a job, then reload.
    ///
    /// The returned job is the backend's response. A failed follow-up
    /// reload is logged rather than returned, since the job exists either
    /// way.
    pub async fn create(&self, duration_seconds: u32, channel: NotificationChannel) -> Result<Job> {
        let job = self.api.create(duration_seconds, channel).await?;
        info!(job_id = %job.id, duration_seconds, channel = %channel, "job created");
        self.reload_after("create").await;
        Ok(job)
    }

    /// Ask the backend to cancel a job, then reload.
    ///
    /// Eligibility is not checked locally. A backend rejection comes back
    /// as [`SyncError::Http`] and leaves the collection untouched.
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        let job = self.api.cancel(job_id).await?;
        info!(job_id = %job.id, status = %job.status, "job cancelled");
        self.reload_after("cancel").await;
        Ok(job)
    }

    /// Fetch one job from the backend without touching the collection.
    pub async fn fetch(&self, job_id: &str) -> Result<Job> {
        self.api.get(job_id).await
    }

    /// Local copy of a job, if present.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.view.borrow().iter().find(|job| job.id == job_id).cloned()
    }

    /// Current collection in snapshot order.
    pub fn jobs(&self) -> Vec<Job> {
        self.view.borrow().to_vec()
    }

    /// Current collection without copying.
    pub fn view(&self) -> JobsView {
        Arc::clone(&*self.view.borrow())
    }

    /// Receive a fresh view after every change to the collection.
    pub fn subscribe(&self) -> watch::Receiver<JobsView> {
        self.view.clone()
    }

    async fn reload_after(&self, command: &str) {
        if let Err(e) = self.reload().await {
            warn!(command, error = %e, "reload after command failed, view may be stale");
        }
    }
}

impl<A: JobApi> std::fmt::Debug for JobStore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("jobs", &self.view.borrow().len())
            .finish()
    }
}

struct StoreActor<A: JobApi> {
    collection: JobCollection,
    policy: TransitionPolicy,
    api: Arc<A>,
    commands: mpsc::WeakUnboundedSender<Command>,
    view: watch::Sender<JobsView>,
}

impl<A: JobApi> StoreActor<A> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Replace { jobs, done } => {
                    self.replace(jobs);
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
                Command::Apply(event) => self.apply(event),
            }
        }
        debug!("job store stopped");
    }

    fn replace(&mut self, jobs: Vec<Job>) {
        for job in &jobs {
            let problems = job.invariant_violations();
            if !problems.is_empty() {
                debug!(job_id = %job.id, ?problems, "snapshot record breaks lifecycle invariants");
            }
        }
        self.collection.replace(jobs);
        self.publish();
        debug!(count = self.collection.len(), "job snapshot applied");
    }

    fn apply(&mut self, event: JobEvent) {
        match self.collection.apply(&event, self.policy) {
            EventOutcome::Applied { previous, current } => {
                debug!(
                    job_id = %event.job_id,
                    event_type = %event.event_type,
                    %previous,
                    %current,
                    "job status updated"
                );
                self.publish();
            }
            EventOutcome::Unchanged => {
                trace!(job_id = %event.job_id, event_type = %event.event_type, "duplicate event");
            }
            EventOutcome::Rejected { current, target } => {
                debug!(
                    job_id = %event.job_id,
                    event_type = %event.event_type,
                    %current,
                    %target,
                    "ignoring event that would move job backwards"
                );
            }
            EventOutcome::UnknownJob => {
                debug!(
                    job_id = %event.job_id,
                    event_type = %event.event_type,
                    "event for unknown job, reloading snapshot"
                );
                self.spawn_reload();
            }
        }
    }

    /// Reload without blocking the queue; the snapshot re-enters as a
    /// normal `Replace` command.
    fn spawn_reload(&self) {
        let api = Arc::clone(&self.api);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            match api.list().await {
                Ok(jobs) => {
                    if let Some(tx) = commands.upgrade() {
                        let _ = tx.send(Command::Replace { jobs, done: None });
                    }
                }
                Err(e) => warn!(error = %e, "background reload failed, view may be stale"),
            }
        });
    }

    fn publish(&self) {
        self.view.send_replace(Arc::new(self.collection.to_vec()));
    }
}
