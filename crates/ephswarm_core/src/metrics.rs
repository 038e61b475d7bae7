//! Run counters and structured logging.
//!
//! Counters are atomics so the decision phase can bump them from rayon
//! workers without a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Running totals for one simulation.
pub struct Metrics {
    step_count: AtomicU64,
    collision_count: AtomicU64,
    override_count: AtomicU64,
    model_failure_count: AtomicU64,
    log_interval: u64,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("steps", &self.step_count())
            .field("collisions", &self.collision_count())
            .field("overrides", &self.override_count())
            .field("model_failures", &self.model_failure_count())
            .finish()
    }
}

impl Metrics {
    /// Creates a collector that logs a summary every `log_interval` steps (never if zero).
    #[must_use]
    pub fn new(log_interval: u64) -> Self {
        Self {
            step_count: AtomicU64::new(0),
            collision_count: AtomicU64::new(0),
            override_count: AtomicU64::new(0),
            model_failure_count: AtomicU64::new(0),
            log_interval,
            start_time: Instant::now(),
        }
    }

    pub fn add_model_failures(&self, n: u64) {
        self.model_failure_count.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a committed step.
    pub fn record_step(&self, duration: Duration, agents: usize, collisions: usize, overrides: usize) {
        let step = self.step_count.fetch_add(1, Ordering::Relaxed) + 1;
        let collisions = self.collision_count.fetch_add(collisions as u64, Ordering::Relaxed)
            + collisions as u64;
        let overrides =
            self.override_count.fetch_add(overrides as u64, Ordering::Relaxed) + overrides as u64;

        if self.log_interval > 0 && step % self.log_interval == 0 {
            tracing::info!(
                step,
                agents,
                collisions,
                overrides,
                model_failures = self.model_failure_count(),
                duration_us = duration.as_micros() as u64,
                "Simulation step"
            );
        }
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn collision_count(&self) -> u64 {
        self.collision_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn override_count(&self) -> u64 {
        self.override_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn model_failure_count(&self) -> u64 {
        self.model_failure_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Initialize tracing subscriber for logging.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish(),
    )
    .ok();
}
