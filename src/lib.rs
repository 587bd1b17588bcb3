//! # job-sync
//!
//! Async Rust client for a background job worker: submit jobs, cancel them,
//! and keep a local job list in step with the backend.
//!
//! Two sources feed the list. A REST snapshot (`GET /api/jobs`) is ground
//! truth; a server-sent event stream (`GET /api/jobs/stream`) pushes
//! lifecycle changes as they happen. The [`JobStore`] reconciles both:
//! events update a known job's status in place, events for jobs it has not
//! seen trigger a fresh snapshot, and every command is followed by a reload.
//! The stream reconnects on its own and a reconnect triggers a resync.
//!
//! ## Quick Start
//!
//! ```no_run
//! use job_sync::{render_table, JobSync, NotificationChannel, SyncConfig};
//!
//! # async fn example() -> job_sync::Result<()> {
//! let sync = JobSync::connect(SyncConfig::new("http://127.0.0.1:8000")).await;
//!
//! let job = sync.create(5, NotificationChannel::Email).await?;
//! println!("created {}", job.id);
//!
//! let mut updates = sync.subscribe();
//! while updates.changed().await.is_ok() {
//!     let jobs = updates.borrow_and_update().clone();
//!     println!("{}", render_table(&jobs));
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod sse;
pub mod store;
pub mod sync;
pub mod types;
pub mod view;

pub use client::{JobApi, JobApiClient};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError};
pub use listener::{ConnectionState, EventHandler, EventListener};
pub use store::{EventOutcome, JobCollection, JobStore, JobsView, TransitionPolicy};
pub use sync::JobSync;
pub use types::{CreateJobRequest, Job, JobEvent, JobEventType, JobStatus, NotificationChannel};
pub use view::{badge_color, is_cancellable, parse_duration_input, render_table, JobRow};
