//! Latency-based send ordering: servers with the fastest round-trip time
//! to a destination should be served first so bandwidth-bound fan-out
//! isn't blocked behind a single slow link.

use std::time::Duration;

use duskmesh_core::ServerId;

/// Sort `(server, latency)` pairs ascending by latency, returning just the
/// server ids in send order. Ties broken by id for determinism.
pub fn ordered_destinations(latencies: &[(ServerId, Duration)]) -> Vec<ServerId> {
    let mut entries = latencies.to_vec();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    entries.into_iter().map(|(id, _)| id).collect()
}

/// Rolling per-destination latency estimate, updated with each observed
/// round-trip and read back for the next round's send ordering. A simple
/// exponential moving average smooths out one-off network hiccups without
/// needing a full windowed history.
pub struct LatencyTracker {
    estimates: Vec<(ServerId, Duration)>,
    alpha: f64,
}

impl LatencyTracker {
    pub fn new(servers: &[ServerId], initial_estimate: Duration, alpha: f64) -> Self {
        Self {
            estimates: servers.iter().map(|&id| (id, initial_estimate)).collect(),
            alpha,
        }
    }

    pub fn observe(&mut self, server: ServerId, sample: Duration) {
        if let Some(entry) = self.estimates.iter_mut().find(|(id, _)| *id == server) {
            let prev_secs = entry.1.as_secs_f64();
            let sample_secs = sample.as_secs_f64();
            let next = prev_secs * (1.0 - self.alpha) + sample_secs * self.alpha;
            entry.1 = Duration::from_secs_f64(next.max(0.0));
        }
    }

    pub fn ordered(&self) -> Vec<ServerId> {
        ordered_destinations(&self.estimates)
    }
}
