//! Layer synchronization barrier: a server only processes layer `l+1`
//! traffic once every expected contributor to layer `l` has checked in.
//! Built directly on `Mutex`+`Condvar` rather than the busy-RWMutex/Cond
//! split the original uses, since a single lock already serializes both the
//! layer gate and the per-contributor bookkeeping here.

mod error;

pub use error::SyncError;

use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Determines the next `(threshold, layer)` pair once the current layer's
/// threshold is reached. Implemented by the orchestrator, which knows how
/// many contributors each layer expects.
pub trait SynchronizerCallback: Send + Sync {
    fn on_threshold(&self, completed_layer: u32) -> (usize, u32);
}

struct SyncState {
    round: u32,
    layer: u32,
    processed: usize,
    threshold: usize,
    started: Vec<bool>,
}

pub struct Synchronizer {
    state: Mutex<SyncState>,
    cond: Condvar,
    callback: Option<Box<dyn SynchronizerCallback>>,
}

impl Synchronizer {
    pub fn new(
        round: u32,
        layer: u32,
        threshold: usize,
        callback: Option<Box<dyn SynchronizerCallback>>,
    ) -> Self {
        Self {
            state: Mutex::new(SyncState {
                round,
                layer,
                processed: 0,
                threshold,
                started: vec![false; threshold],
            }),
            cond: Condvar::new(),
            callback,
        }
    }

    pub fn round(&self) -> u32 {
        self.state.lock().unwrap().round
    }

    pub fn layer(&self) -> u32 {
        self.state.lock().unwrap().layer
    }

    /// Block the caller until the barrier has advanced to `layer`.
    pub fn sync(&self, layer: u32) {
        let mut guard = self.state.lock().unwrap();
        while guard.layer != layer {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Block until `layer`, then mark contributor `id` as started for this
    /// layer. Fails if `id` is out of range or has already called in.
    pub fn sync_once(&self, layer: u32, id: usize) -> Result<(), SyncError> {
        let mut guard = self.state.lock().unwrap();
        while guard.layer != layer {
            guard = self.cond.wait(guard).unwrap();
        }
        if id >= guard.started.len() {
            return Err(SyncError::BadMetadata(id));
        }
        if guard.started[id] {
            return Err(SyncError::AlreadyStarted(id));
        }
        guard.started[id] = true;
        trace!(layer, id, "synchronizer: contributor started");
        Ok(())
    }

    /// Record a completed contribution. Triggers the threshold callback
    /// in-line once every expected contributor for the layer has finished.
    pub fn done(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.processed += 1;
        if guard.processed == guard.threshold {
            self.trigger(guard);
        } else if guard.processed > guard.threshold {
            panic!("more contributors called done() than the layer's threshold");
        }
    }

    fn trigger(&self, mut guard: MutexGuard<'_, SyncState>) {
        let completed_layer = guard.layer;
        let (next_threshold, next_layer) = match &self.callback {
            Some(cb) => cb.on_threshold(completed_layer),
            None => (guard.threshold, guard.layer + 1),
        };
        guard.threshold = next_threshold;
        guard.layer = next_layer;
        guard.started = vec![false; next_threshold];
        guard.processed = 0;
        debug!(
            completed_layer,
            next_layer, next_threshold, "synchronizer: layer advanced"
        );
        drop(guard);
        self.cond.notify_all();
    }

    /// Reset the barrier for a new round, waking anyone still blocked on
    /// the previous one (they will re-check their target layer and return
    /// to waiting, since a reset always moves to a distinct round/layer).
    pub fn reset(&self, round: u32, layer: u32, threshold: usize) {
        let mut guard = self.state.lock().unwrap();
        guard.round = round;
        guard.layer = layer;
        guard.processed = 0;
        guard.threshold = threshold;
        guard.started = vec![false; threshold];
        drop(guard);
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sync_once_rejects_out_of_range_id() {
        let s = Synchronizer::new(0, 0, 2, None);
        assert!(matches!(
            s.sync_once(0, 5),
            Err(SyncError::BadMetadata(5))
        ));
    }

    #[test]
    fn sync_once_rejects_double_start() {
        let s = Synchronizer::new(0, 0, 2, None);
        s.sync_once(0, 0).unwrap();
        assert!(matches!(
            s.sync_once(0, 0),
            Err(SyncError::AlreadyStarted(0))
        ));
    }

    #[test]
    #[should_panic(expected = "more contributors called done()")]
    fn done_past_threshold_panics() {
        let s = Synchronizer::new(0, 0, 1, None);
        s.done();
        s.done();
    }

    #[test]
    fn done_reaching_threshold_advances_layer_without_callback() {
        let s = Synchronizer::new(0, 0, 2, None);
        assert_eq!(s.layer(), 0);
        s.done();
        assert_eq!(s.layer(), 0);
        s.done();
        assert_eq!(s.layer(), 1);
    }

    struct FixedCallback {
        next_threshold: usize,
        next_layer: u32,
    }

    impl SynchronizerCallback for FixedCallback {
        fn on_threshold(&self, _completed_layer: u32) -> (usize, u32) {
            (self.next_threshold, self.next_layer)
        }
    }

    #[test]
    fn callback_controls_next_threshold_and_layer() {
        let cb = FixedCallback {
            next_threshold: 5,
            next_layer: 10,
        };
        let s = Synchronizer::new(0, 0, 1, Some(Box::new(cb)));
        s.done();
        assert_eq!(s.layer(), 10);
        assert!(s.sync_once(10, 4).is_ok());
        assert!(matches!(
            s.sync_once(10, 5),
            Err(SyncError::BadMetadata(5))
        ));
    }

    #[test]
    fn waiters_unblock_when_layer_advances() {
        let s = Arc::new(Synchronizer::new(0, 0, 1, None));
        let waiter = Arc::clone(&s);
        let handle = thread::spawn(move || {
            waiter.sync(1);
        });

        thread::sleep(Duration::from_millis(20));
        s.done();
        handle.join().unwrap();
    }

    #[test]
    fn reset_rebases_round_layer_and_threshold() {
        let s = Synchronizer::new(0, 0, 1, None);
        s.reset(1, 0, 3);
        assert_eq!(s.round(), 1);
        assert_eq!(s.layer(), 0);
        s.sync_once(0, 2).unwrap();
    }
}
