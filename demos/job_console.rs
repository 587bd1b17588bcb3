//! Interactive console for a running job worker backend.
//!
//! Prints the job table whenever it changes and reads commands from stdin:
//!
//! - `create <secs> [none|email|discord]`
//! - `cancel <id-prefix>`
//! - `show <id-prefix>`
//! - `reload`, `list`, `status`, `quit`
//!
//! ```sh
//! RUST_LOG=job_sync=debug cargo run --example job_console -- http://127.0.0.1:8000
//! ```

use anyhow::{anyhow, bail};
use job_sync::{
    is_cancellable, parse_duration_input, render_table, JobSync, NotificationChannel, SyncConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("job_sync=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
    let sync = JobSync::connect(SyncConfig::new(&endpoint)).await;
    println!("Connected to {endpoint}");
    println!("{}", render_table(&sync.jobs()));

    let mut updates = sync.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let jobs = updates.borrow_and_update().clone();
                println!("{}", render_table(&jobs));
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match handle(&sync, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
    }

    sync.close();
    Ok(())
}

fn resolve(sync: &JobSync, prefix: Option<&str>) -> anyhow::Result<String> {
    let prefix = prefix.ok_or_else(|| anyhow!("missing job id"))?;
    let matches: Vec<_> = sync
        .jobs()
        .into_iter()
        .filter(|job| job.id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [job] => Ok(job.id.clone()),
        [] => bail!("no job matches '{prefix}'"),
        _ => bail!("'{prefix}' matches {} jobs", matches.len()),
    }
}

async fn handle(sync: &JobSync, line: &str) -> anyhow::Result<bool> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("create") => {
            let duration = parse_duration_input(parts.next().unwrap_or(""))?;
            let channel = match parts.next() {
                Some(raw) => NotificationChannel::parse(raw)
                    .ok_or_else(|| anyhow!("unknown notification channel '{raw}'"))?,
                None => NotificationChannel::default(),
            };
            let job = sync.create(duration, channel).await?;
            println!("created {}", job.id);
        }
        Some("cancel") => {
            let id = resolve(sync, parts.next())?;
            if let Some(job) = sync.get(&id) {
                if !is_cancellable(&job) {
                    println!("job is {}, the backend will probably refuse", job.status);
                }
            }
            let job = sync.cancel(&id).await?;
            println!("cancelled {}", job.id);
        }
        Some("show") => {
            let id = resolve(sync, parts.next())?;
            let job = sync.fetch(&id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Some("reload") => {
            let count = sync.reload().await?;
            println!("reloaded {count} jobs");
        }
        Some("list") => println!("{}", render_table(&sync.jobs())),
        Some("status") => println!("{:?}", sync.connection_state()),
        Some("quit" | "exit") => return Ok(false),
        Some(other) => println!("unknown command '{other}'"),
    }
    Ok(true)
}
