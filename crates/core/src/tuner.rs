//! Adaptive tuning of retrieval parameters.
//!
//! A single background worker samples caller-supplied latency and recall
//! observations on a fixed interval and nudges `ef` (vector probe depth)
//! and `topK` within fixed floors and ceilings. Parameters live in
//! atomics, readable at any time without blocking the worker.

use crate::config::TunerConfig;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Bounds for the tuned parameters.
const EF_FLOOR: usize = 10;
const EF_CEILING: usize = 500;
const TOPK_FLOOR: usize = 1;
const TOPK_CEILING: usize = 100;

/// An observation callback. `None` means the reading is unavailable this
/// tick; the tuner skips it and keeps running.
pub type Observation = Box<dyn Fn() -> Option<f64> + Send>;

/// Snapshot of the tuned parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunerParams {
    /// Vector probe depth.
    pub ef: usize,
    /// Result count target.
    pub top_k: usize,
}

impl Default for TunerParams {
    fn default() -> Self {
        Self { ef: 50, top_k: 10 }
    }
}

struct Shared {
    ef: AtomicUsize,
    top_k: AtomicUsize,
    running: AtomicBool,
    sleep_lock: Mutex<()>,
    wakeup: Condvar,
}

/// One tuning step. Latency over the ceiling shrinks both parameters;
/// otherwise recall under the floor grows them; otherwise no action.
fn apply_tick(
    params: TunerParams,
    latency_ms: Option<f64>,
    recall: Option<f64>,
    config: &TunerConfig,
) -> TunerParams {
    if latency_ms.is_some_and(|lat| lat > config.latency_max_ms) {
        TunerParams {
            ef: params.ef.saturating_sub(config.ef_delta).max(EF_FLOOR),
            top_k: params
                .top_k
                .saturating_sub(config.topk_delta)
                .max(TOPK_FLOOR),
        }
    } else if recall.is_some_and(|rec| rec < config.recall_min_pct) {
        TunerParams {
            ef: (params.ef + config.ef_delta).min(EF_CEILING),
            top_k: (params.top_k + config.topk_delta).min(TOPK_CEILING),
        }
    } else {
        params
    }
}

/// Background control loop adjusting `ef` and `topK`.
pub struct AutoTuner {
    config: TunerConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl AutoTuner {
    pub fn new(config: &TunerConfig, initial: TunerParams) -> Self {
        Self {
            config: config.clone(),
            shared: Arc::new(Shared {
                ef: AtomicUsize::new(initial.ef),
                top_k: AtomicUsize::new(initial.top_k),
                running: AtomicBool::new(false),
                sleep_lock: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
            worker: None,
        }
    }

    /// Current parameter snapshot.
    pub fn params(&self) -> TunerParams {
        TunerParams {
            ef: self.shared.ef.load(Ordering::Relaxed),
            top_k: self.shared.top_k.load(Ordering::Relaxed),
        }
    }

    /// Spawns the worker thread. A second call while running is a no-op.
    pub fn start(&mut self, get_latency: Observation, get_recall: Observation) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let interval = Duration::from_secs(config.check_interval_seconds);

        self.worker = Some(std::thread::spawn(move || {
            while shared.running.load(Ordering::SeqCst) {
                let params = TunerParams {
                    ef: shared.ef.load(Ordering::Relaxed),
                    top_k: shared.top_k.load(Ordering::Relaxed),
                };
                let next = apply_tick(params, get_latency(), get_recall(), &config);
                if next != params {
                    tracing::debug!(
                        ef = next.ef,
                        top_k = next.top_k,
                        "tuner adjusted parameters"
                    );
                    shared.ef.store(next.ef, Ordering::Relaxed);
                    shared.top_k.store(next.top_k, Ordering::Relaxed);
                }

                let mut guard = shared.sleep_lock.lock();
                if shared.running.load(Ordering::SeqCst) {
                    shared.wakeup.wait_for(&mut guard, interval);
                }
            }
        }));
    }

    /// Signals the worker and joins it. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for AutoTuner {
    fn drop(&mut self) {
        self.stop();
    }
}
