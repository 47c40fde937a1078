//! Shared hashes-per-second estimate across miner workers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use faid_log::log_info;

const WINDOW: Duration = Duration::from_secs(4);
const LOG_EVERY: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
struct MeterState {
    window_start: Option<Instant>,
    counter: u64,
    hashes_per_sec: f64,
    last_log: Option<Instant>,
}

/// Counts hashes in fixed windows; the rate updates when a window closes.
#[derive(Debug)]
pub struct HashMeter {
    state: Mutex<MeterState>,
    window: Duration,
    log_every: Duration,
}

impl Default for HashMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl HashMeter {
    pub fn new() -> Self {
        Self::with_intervals(WINDOW, LOG_EVERY)
    }

    pub fn with_intervals(window: Duration, log_every: Duration) -> Self {
        Self {
            state: Mutex::new(MeterState::default()),
            window,
            log_every,
        }
    }

    pub fn record(&self, hashes: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let now = Instant::now();
        let Some(start) = state.window_start else {
            state.window_start = Some(now);
            state.counter = 0;
            return;
        };
        state.counter = state.counter.saturating_add(hashes);
        let elapsed = now.duration_since(start);
        if elapsed < self.window {
            return;
        }
        state.hashes_per_sec = state.counter as f64 / elapsed.as_secs_f64();
        state.counter = 0;
        state.window_start = Some(now);
        let due = state
            .last_log
            .map_or(true, |last| now.duration_since(last) >= self.log_every);
        if due {
            state.last_log = Some(now);
            log_info!("hashmeter {:6.0} khash/s", state.hashes_per_sec / 1000.0);
        }
    }

    pub fn hashes_per_sec(&self) -> f64 {
        self.state
            .lock()
            .map(|state| state.hashes_per_sec)
            .unwrap_or(0.0)
    }
}
