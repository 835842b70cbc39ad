use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};

use mirror_core::config;
use mirror_sync::{pipeline, FileNodeStore, RpcConnector};

use crate::error::{io_err, DaemonError};

/// Quiet period after the last config write before a resync starts.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    pub interval: Duration,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
}

impl DaemonOptions {
    /// Defaults under `<home>/.odoo-mirror/`.
    pub fn at(home: &Path) -> Self {
        Self {
            config_path: config::config_path_at(home),
            store_path: config::node_store_path_at(home),
            interval: DEFAULT_INTERVAL,
            json_logs: false,
        }
    }
}

/// What started a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    Interval,
    ConfigChanged,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Startup => "startup",
            Trigger::Interval => "interval",
            Trigger::ConfigChanged => "config_changed",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub trigger: Trigger,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failures: usize,
    /// Nodes removed because no run touched them; zero when any model failed.
    pub swept: usize,
    pub duration_ms: u128,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(
    options: DaemonOptions,
    connector: Arc<dyn RpcConnector>,
) -> Result<(), DaemonError> {
    init_tracing(options.json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options, connector))
}

/// Run until ctrl-c.
pub async fn run(
    options: DaemonOptions,
    connector: Arc<dyn RpcConnector>,
) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down daemon");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Task {
                        task: "signal_handler",
                        message: format!("ctrl-c handler failed: {err}"),
                    }),
                },
            }
        })
    };

    let result = run_until(options, connector, shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;
    result
}

/// Run the ticker, the config watcher, and the sync processor until
/// `shutdown` fires or one of them fails.
pub async fn run_until(
    options: DaemonOptions,
    connector: Arc<dyn RpcConnector>,
    shutdown: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    tracing::info!(
        config = %options.config_path.display(),
        store = %options.store_path.display(),
        interval_secs = options.interval.as_secs(),
        "daemon started",
    );
    let options = Arc::new(options);
    let (trigger_tx, trigger_rx) = mpsc::channel::<Trigger>(16);

    let ticker_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let period = options.interval;
        let trigger_tx = trigger_tx.clone();
        tokio::spawn(async move {
            let result = ticker_task(period, trigger_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let config_path = options.config_path.clone();
        tokio::spawn(async move {
            let result = watcher_task(config_path, trigger_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let options = options.clone();
        tokio::spawn(async move {
            let result = processor_task(options, connector, trigger_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let (ticker_result, watcher_result, processor_result) =
        tokio::join!(ticker_handle, watcher_handle, processor_handle);

    handle_join("ticker", ticker_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Load the config, run both passes into the file store, and save it.
///
/// The store is swept only when every model synced; a partial run keeps
/// whatever it could not re-confirm.
pub fn sync_once(
    options: &DaemonOptions,
    connector: &dyn RpcConnector,
    trigger: Trigger,
) -> Result<SyncSummary, DaemonError> {
    let started = std::time::Instant::now();
    let config = config::load_from(&options.config_path)?;
    let mut store = FileNodeStore::open(&options.store_path)?;

    let report = pipeline::run(&config, connector, &store)?;
    let swept = if report.is_clean() {
        store.sweep().len()
    } else {
        tracing::warn!(
            failures = report.failures.len(),
            "skipping sweep after partial sync"
        );
        0
    };
    store.save()?;

    let totals = report.totals();
    Ok(SyncSummary {
        trigger,
        fetched: totals.fetched,
        created: totals.created,
        updated: totals.updated,
        unchanged: totals.unchanged,
        deleted: totals.deleted,
        failures: report.failures.len(),
        swept,
        duration_ms: started.elapsed().as_millis(),
    })
}

async fn ticker_task(
    period: Duration,
    trigger_tx: mpsc::Sender<Trigger>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    let mut trigger = Trigger::Startup;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if !enqueue(&trigger_tx, trigger) {
                    break;
                }
                trigger = Trigger::Interval;
            }
        }
    }
    Ok(())
}

async fn watcher_task(
    config_path: PathBuf,
    trigger_tx: mpsc::Sender<Trigger>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(file_name) = config_path.file_name().map(ToOwned::to_owned) else {
        return Err(io_err(
            &config_path,
            std::io::Error::other("config path has no file name"),
        ));
    };
    let dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    // Editors replace the file by rename, so watch the directory and match
    // on the file name.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    let mut debounce = Debouncer::new(DEBOUNCE_WINDOW);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = debounce.settled() => {
                debounce.fire();
                tracing::info!(path = %config_path.display(), "config changed, scheduling sync");
                if !enqueue(&trigger_tx, Trigger::ConfigChanged) {
                    break;
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                    debounce.bump(Instant::now());
                }
            }
        }
    }

    Ok(())
}

async fn processor_task(
    options: Arc<DaemonOptions>,
    connector: Arc<dyn RpcConnector>,
    mut trigger_rx: mpsc::Receiver<Trigger>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_trigger = trigger_rx.recv() => {
                let Some(trigger) = maybe_trigger else { break };
                // Triggers queued behind this one would sync the same state.
                while trigger_rx.try_recv().is_ok() {}

                let options = options.clone();
                let connector = connector.clone();
                let result = tokio::task::spawn_blocking(move || {
                    sync_once(&options, connector.as_ref(), trigger)
                })
                .await
                .map_err(|err| DaemonError::Task {
                    task: "sync",
                    message: err.to_string(),
                })?;

                match result {
                    Ok(summary) => tracing::info!(
                        trigger = %summary.trigger,
                        created = summary.created,
                        updated = summary.updated,
                        unchanged = summary.unchanged,
                        deleted = summary.deleted,
                        swept = summary.swept,
                        failures = summary.failures,
                        duration_ms = summary.duration_ms,
                        "sync completed",
                    ),
                    Err(err) => tracing::error!(%trigger, error = %err, "sync failed"),
                }
            }
        }
    }

    Ok(())
}

/// Trailing-edge debounce: fires once the window has passed without a bump.
struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    fn bump(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// Resolves at the deadline; never resolves while idle.
    async fn settled(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Queue a trigger without waiting; a full queue already has a sync pending.
/// Returns `false` once the processor is gone.
fn enqueue(trigger_tx: &mpsc::Sender<Trigger>, trigger: Trigger) -> bool {
    match trigger_tx.try_send(trigger) {
        Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: err.to_string(),
        }),
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    use mirror_sync::{Credentials, RpcClient, RpcError};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::time::timeout;

    const CONFIG: &str = r#"
connections:
  - url: https://erp.test
    database: test
    username: bot
    password: pw
    models:
      - remote: blog.post
        local: Post
        fields:
          name: {}
"#;

    /// One model, one record, one locale; domains are ignored.
    struct OneRecord;

    struct OneRecordSession;

    impl RpcConnector for OneRecord {
        fn login(&self, credentials: &Credentials) -> Result<Box<dyn RpcClient>, RpcError> {
            if credentials.password != "pw" {
                return Err(RpcError::LoginRejected {
                    username: credentials.username.clone(),
                });
            }
            Ok(Box::new(OneRecordSession))
        }
    }

    impl RpcClient for OneRecordSession {
        fn call(
            &self,
            model: &str,
            method: &str,
            _args: Value,
            kwargs: Value,
        ) -> Result<Value, RpcError> {
            match (model, method) {
                ("res.lang", "search_read") => Ok(json!([{"id": 1, "code": "en_US"}])),
                (_, "fields_get") => Ok(json!({"name": {"type": "char"}})),
                (_, "search") if kwargs["offset"] == json!(0) => Ok(json!([1])),
                (_, "search") => Ok(json!([])),
                (_, "search_read") => Ok(json!([{
                    "id": 1,
                    "write_date": "2024-01-01 00:00:00",
                    "name": "Hello",
                }])),
                _ => Err(RpcError::Server {
                    message: format!("unexpected call {model}.{method}"),
                    detail: None,
                }),
            }
        }
    }

    fn fixture(config: &str) -> (TempDir, DaemonOptions) {
        let home = TempDir::new().expect("home");
        let options = DaemonOptions {
            interval: Duration::from_secs(3600),
            ..DaemonOptions::at(home.path())
        };
        fs::create_dir_all(options.config_path.parent().expect("config dir")).expect("mkdir");
        fs::write(&options.config_path, config).expect("write config");
        (home, options)
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_waits_for_a_quiet_window() {
        let mut debounce = Debouncer::new(DEBOUNCE_WINDOW);
        for _ in 0..3 {
            debounce.bump(Instant::now());
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        // Last bump at +200ms, so the deadline is +700ms; the clock is at +300ms.
        assert!(
            timeout(Duration::from_millis(399), debounce.settled())
                .await
                .is_err(),
            "rapid saves must keep postponing the sync"
        );
        assert!(timeout(Duration::from_millis(2), debounce.settled())
            .await
            .is_ok());
        assert!(debounce.fire());
        assert!(!debounce.fire(), "a fired debounce is idle again");
    }

    #[test]
    fn full_queue_still_counts_as_scheduled() {
        let (tx, mut rx) = mpsc::channel::<Trigger>(1);
        assert!(enqueue(&tx, Trigger::Startup));
        assert!(enqueue(&tx, Trigger::Interval));
        assert_eq!(rx.try_recv().expect("queued"), Trigger::Startup);
        drop(rx);
        assert!(!enqueue(&tx, Trigger::Interval));
    }

    #[test]
    fn sync_once_persists_and_is_idempotent() {
        let (_home, options) = fixture(CONFIG);

        let first = sync_once(&options, &OneRecord, Trigger::Startup).expect("first sync");
        assert_eq!(first.created, 1);
        assert_eq!(first.failures, 0);
        assert!(options.store_path.exists());

        let second = sync_once(&options, &OneRecord, Trigger::Interval).expect("second sync");
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.swept, 0);

        let store = FileNodeStore::open(&options.store_path).expect("reopen");
        assert_eq!(store.nodes().len(), 1);
        assert!(store.synced_at().is_some());
    }

    #[test]
    fn sync_once_sweeps_nodes_of_dropped_models() {
        let (_home, options) = fixture(CONFIG);
        sync_once(&options, &OneRecord, Trigger::Startup).expect("first sync");

        let renamed = CONFIG.replace("local: Post", "local: Article");
        fs::write(&options.config_path, renamed).expect("rewrite config");

        let summary = sync_once(&options, &OneRecord, Trigger::ConfigChanged).expect("resync");
        assert_eq!(summary.created, 1);
        assert_eq!(summary.swept, 1, "the old Post node is no longer produced");
        let store = FileNodeStore::open(&options.store_path).expect("reopen");
        assert_eq!(store.nodes()[0].node_type.0, "Article");
    }

    #[test]
    fn failed_login_leaves_store_untouched() {
        let (_home, options) = fixture(&CONFIG.replace("password: pw", "password: nope"));
        let err = sync_once(&options, &OneRecord, Trigger::Startup).expect_err("login fails");
        assert!(matches!(err, DaemonError::Sync(_)), "got {err:?}");
        assert!(!options.store_path.exists());
    }

    #[test]
    fn missing_config_is_a_config_error() {
        let home = TempDir::new().expect("home");
        let options = DaemonOptions::at(home.path());
        let err = sync_once(&options, &OneRecord, Trigger::Startup).expect_err("no config");
        assert!(matches!(err, DaemonError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn startup_sync_runs_before_shutdown() {
        let (_home, options) = fixture(CONFIG);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let handle = tokio::spawn(run_until(
            options.clone(),
            Arc::new(OneRecord),
            shutdown_tx.clone(),
        ));

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !options.store_path.exists() {
            assert!(
                std::time::Instant::now() < deadline,
                "startup sync never wrote the store"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        shutdown_tx.send(()).expect("send shutdown");
        handle.await.expect("join").expect("daemon run");
    }
}
