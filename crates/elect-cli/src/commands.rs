use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::mpsc;
use tracing::{info, warn};

use elect_cli::report::{
    describe_control, describe_directory, describe_state, describe_summary, summary_table,
    zone_table,
};
use elect_live::{FetchState, LiveConfig, LiveData, Projection, Subscription};

use crate::cli::{ConnectionArgs, ZoneArgs};

/// Build the live configuration: file, then environment, then flags.
pub fn live_config(args: &ConnectionArgs) -> Result<LiveConfig> {
    let config = match &args.config {
        Some(path) => LiveConfig::load(path)
            .with_context(|| format!("load configuration from {}", path.display()))?,
        None => LiveConfig::default(),
    };
    let mut config = config.apply_env();
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(directory) = &args.directory {
        config.override_directory = Some(directory.clone());
    }
    if args.disable_curtain {
        config.disable_curtain = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub async fn run_directory(live: &LiveData, timeout: Duration) -> Result<()> {
    let directory = live.directory_state();
    let state = settle(&directory, timeout).await?;
    println!("{}", describe_directory(&state));
    // An override resolves without the pointer file, so read it once here.
    if live.config().override_directory.is_some()
        && tokio::time::timeout(timeout, live.refresh_latest()).await.is_err()
    {
        warn!("Pointer file did not answer in time");
    }
    let control = describe_control(&live.latest_resource().state());
    println!("Locked: {}", control.locked);
    println!("Status: {}", control.status);
    if state.failed && !state.error.as_ref().is_some_and(|e| e.is_gate()) {
        bail!(failure(&state));
    }
    Ok(())
}

pub async fn run_summary(live: &LiveData, timeout: Duration) -> Result<()> {
    let summary = live.summary_data();
    let state = settle(summary.projection(), timeout).await?;
    let Some(data) = state.data.as_deref() else {
        bail!(failure(&state));
    };
    println!("{}", describe_summary(&state));
    println!("{}", summary_table(data));
    Ok(())
}

pub async fn run_zone(live: &LiveData, args: &ZoneArgs, timeout: Duration) -> Result<()> {
    let zone = live.per_zone_data(args.province, args.zone);
    settle(zone.province().projection(), timeout).await?;
    let state = zone.state();
    match state.data.as_ref() {
        Some(information) => {
            println!("Province {} zone {}", args.province, args.zone);
            println!("{}", zone_table(information));
            Ok(())
        }
        None if state.completed => Err(anyhow!(
            "zone {} not found in province {}",
            args.zone,
            args.province
        )),
        None => Err(anyhow!(failure(&state))),
    }
}

/// Print every change of the directory, curtain, status and summary until
/// interrupted.
pub async fn run_watch(live: &LiveData) -> Result<()> {
    let directory = live.directory_state();
    let locked = live.locked_state();
    let status = live.status();
    let summary = live.summary_data();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscriptions: Vec<Subscription> = vec![
        directory.subscribe(forward(&tx)),
        locked.subscribe(forward(&tx)),
        status.subscribe(forward(&tx)),
        summary.subscribe(forward(&tx)),
    ];
    drop(tx);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last = WatchLines::default();
    loop {
        let next = WatchLines {
            directory: describe_directory(&directory.get()),
            locked: if locked.get() { "curtain down" } else { "curtain up" }.to_string(),
            status: format!("status {}", status.get().as_deref().unwrap_or("-")),
            summary: describe_summary(&summary.state()),
        };
        next.print_changes(&last);
        last = next;

        tokio::select! {
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }
                // Coalesce bursts of notifications into one refresh.
                while rx.try_recv().is_ok() {}
            }
            result = &mut ctrl_c => {
                result.context("listen for ctrl-c")?;
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

#[derive(Default)]
struct WatchLines {
    directory: String,
    locked: String,
    status: String,
    summary: String,
}

impl WatchLines {
    fn print_changes(&self, previous: &Self) {
        for (line, before) in [
            (&self.directory, &previous.directory),
            (&self.locked, &previous.locked),
            (&self.status, &previous.status),
            (&self.summary, &previous.summary),
        ] {
            if line != before {
                println!("{line}");
            }
        }
    }
}

fn forward(tx: &mpsc::UnboundedSender<()>) -> impl Fn() + Send + Sync + 'static {
    let tx = tx.clone();
    move || {
        // The receiver is gone only while the command shuts down.
        let _ = tx.send(());
    }
}

/// Wait until `projection` is no longer loading.
async fn settle<T>(projection: &Projection<FetchState<T>>, timeout: Duration) -> Result<FetchState<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let state = tokio::time::timeout(timeout, projection.wait_until(|s| !s.loading))
        .await
        .with_context(|| {
            format!(
                "no answer from the results server within {}s",
                timeout.as_secs()
            )
        })?;
    if state.failed {
        warn!(projection = projection.name(), "Fetch failed");
    }
    Ok(state)
}

fn failure<T>(state: &FetchState<T>) -> String {
    let message = describe_state(state, |_| String::new());
    match &state.error {
        Some(error) if !error.is_gate() => format!("{message} ({error})"),
        _ => message,
    }
}
