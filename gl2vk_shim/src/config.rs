//! Shim configuration
//!
//! Tunables for the recording scheduler and its liveness policy.
//! Everything has a working default; hosts usually only touch `node_count`.

use std::time::Duration;

/// Shim configuration
#[derive(Debug, Clone)]
pub struct ShimConfig {
    /// Number of recording workers (fixed for the scheduler's lifetime)
    pub node_count: usize,
    /// Number of frames the GPU may have in flight; each worker owns one
    /// secondary buffer per slot
    pub frames_in_flight: usize,
    /// Command log capacity per worker (slots in the ring)
    pub log_capacity: usize,
    /// Upper bound on a sleeping worker's park before it re-checks its slot
    pub park_timeout: Duration,
    /// Upper bound on a blocked producer's park before it re-checks the slot
    pub backpressure_timeout: Duration,
    /// Number of bounded waits `await` performs before reporting a liveness failure
    pub await_retry_budget: u32,
    /// Length of each bounded wait in `await`
    pub await_backoff: Duration,
    /// Consecutive frames with liveness failures before the failure becomes fatal
    pub liveness_escalation_threshold: u32,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            node_count: 8,
            frames_in_flight: 2,
            log_capacity: 512,
            park_timeout: Duration::from_secs(1),
            backpressure_timeout: Duration::from_millis(1),
            await_retry_budget: 500,
            await_backoff: Duration::from_millis(1),
            liveness_escalation_threshold: 3,
        }
    }
}

impl ShimConfig {
    /// Total time `await` may block on one node before giving up
    pub fn await_budget(&self) -> Duration {
        self.await_backoff * self.await_retry_budget
    }
}
