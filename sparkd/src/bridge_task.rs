//! The bridge cycle's timer-driven worker (spec.md §4.3, C3). Ticks every
//! `bridge_interval` seconds, coalescing overlapping ticks rather than
//! running two cycles concurrently (§4.3 "Bridge cycles must not
//! overlap").

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use spark_core::bridge::BridgeCycle;
use spark_core::config::{Tuneables, TuneablesWatcher};

use crate::state::{record_bridge_stats, AppState};

pub async fn run(state: Arc<AppState>, interval_s: u64, tuneables_path: std::path::PathBuf) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut watcher = match TuneablesWatcher::new(tuneables_path) {
        Ok(w) => w,
        Err(e) => {
            warn!("tuneables watcher failed to start, using defaults: {e}");
            return;
        }
    };

    let bridge_cycle: Mutex<BridgeCycle> = match state.open_bridge_cycle() {
        Ok(cycle) => Mutex::new(cycle),
        Err(e) => {
            warn!("bridge cycle failed to open, worker disabled: {e}");
            return;
        }
    };

    loop {
        ticker.tick().await;

        if state.bridge_in_flight.swap(true, Ordering::AcqRel) {
            warn!("bridge cycle tick skipped: previous cycle still running");
            continue;
        }

        let tuneables: Tuneables = match watcher.reload_if_changed() {
            Ok(true) => {
                info!("tuneables reloaded");
                watcher.current().clone()
            }
            Ok(false) => watcher.current().clone(),
            Err(e) => {
                warn!("tuneables reload failed, keeping previous values: {e}");
                watcher.current().clone()
            }
        };

        {
            let mut engine = state.engine.write().await;
            engine.apply_tuneables(&tuneables);
        }

        let stats = {
            let mut cycle = bridge_cycle.lock().await;
            cycle.run(&tuneables)
        };

        if !stats.errors.is_empty() {
            warn!(errors = ?stats.errors, "bridge cycle completed with errors");
        } else {
            info!(events = stats.events_processed, "bridge cycle completed");
        }
        record_bridge_stats(&state, stats);

        state.bridge_in_flight.store(false, Ordering::Release);
    }
}
