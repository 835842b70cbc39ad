//! Long-running refresh loop: interval timer + config watcher + sync processor.

mod error;
mod runtime;

pub use error::DaemonError;
pub use runtime::{
    run, run_until, start_blocking, sync_once, DaemonOptions, SyncSummary, Trigger,
    DEBOUNCE_WINDOW, DEFAULT_INTERVAL,
};
