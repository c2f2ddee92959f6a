//! Fixed-size worker pool (§4.K/§5): CPU-bound crypto work for every
//! message type is dispatched here, off the per-connection reader tasks,
//! grounded on the Go prototype's `pool.go` worker-per-core design with its
//! unbounded job channel replaced by a bounded one (§5 backpressure).

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;

use duskmesh_core::{GroupId, MessageType, ServerId};
use tracing::error;

use crate::error::Result;

/// One unit of dispatchable work: the raw chunk bytes for a single message
/// plus enough addressing metadata for the handler to route it and to log
/// a useful abort diagnostic if handling fails.
pub struct Job {
    pub message_type: MessageType,
    pub round: u32,
    pub layer: u32,
    pub sender: ServerId,
    pub group: GroupId,
    pub payload: Vec<u8>,
}

/// A job's addressing metadata, retained across the move into `handle` so
/// a response produced by it can still be routed back to the submitter.
#[derive(Clone, Copy)]
pub struct JobMeta {
    pub round: u32,
    pub layer: u32,
    pub sender: ServerId,
    pub group: GroupId,
}

impl From<&Job> for JobMeta {
    fn from(job: &Job) -> Self {
        Self {
            round: job.round,
            layer: job.layer,
            sender: job.sender,
            group: job.group,
        }
    }
}

/// Implemented by the orchestrator: dispatches one job to the lightning
/// forward/reverse, path, or checkpoint handler selected by its type.
pub trait JobHandler: Send + Sync + 'static {
    /// Handle one job, optionally producing a response slice (§4.K) to be
    /// streamed back to the submitter via `route_response`.
    fn handle(&self, job: Job) -> Result<Option<Vec<u8>>>;

    /// Route a response slice produced by `handle` back to its
    /// destination. Takes the job's addressing metadata since the
    /// response payload itself carries none.
    fn route_response(&self, _meta: JobMeta, _response: Vec<u8>) {}
}

/// Bounded job queue depth (§5: "sized at ~100 slots").
const JOB_QUEUE_CAPACITY: usize = 100;

/// A fixed pool of `num_workers` threads consuming jobs from a bounded
/// channel. Once the queue fills, submitters block, which is this system's
/// only flow-control mechanism: it slows TCP reads upstream rather than
/// growing memory unboundedly (§5).
pub struct WorkPool {
    sender: Option<SyncSender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkPool {
    pub fn new<H: JobHandler>(num_workers: usize, handler: Arc<H>) -> Self {
        let (sender, receiver) = sync_channel(JOB_QUEUE_CAPACITY);
        let receiver: Arc<Mutex<Receiver<Job>>> = Arc::new(Mutex::new(receiver));

        let handles = (0..num_workers.max(1))
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                thread::spawn(move || loop {
                    let job = {
                        let guard = receiver.lock().unwrap();
                        guard.recv()
                    };
                    match job {
                        Ok(job) => {
                            let meta = JobMeta::from(&job);
                            match handler.handle(job) {
                                Ok(Some(response)) => handler.route_response(meta, response),
                                Ok(None) => {}
                                Err(e) => {
                                    error!(
                                        round = meta.round,
                                        layer = meta.layer,
                                        sender = meta.sender,
                                        group = meta.group,
                                        error = %e,
                                        "worker pool: job failed, round aborted"
                                    );
                                }
                            }
                        }
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Queue depth workers are expected to run at: one per CPU, matching
    /// the Go prototype's `runtime.NumCPU()` default.
    pub fn default_worker_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn submit(&self, job: Job) {
        if let Some(sender) = &self.sender {
            // A closed pool (post-shutdown) silently drops submissions;
            // by that point no round is in progress to observe the loss.
            let _ = sender.send(job);
        }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        // Dropping the sender first closes the channel so every worker's
        // blocking recv() returns Err and the loop exits cleanly.
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        count: AtomicUsize,
        fail_on: Option<u32>,
    }

    impl JobHandler for CountingHandler {
        fn handle(&self, job: Job) -> Result<Option<Vec<u8>>> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if Some(job.round) == self.fail_on {
                return Err(crate::error::ServerError::CheckpointSignatureInvalid);
            }
            Ok(None)
        }
    }

    fn job(round: u32) -> Job {
        Job {
            message_type: MessageType::LightningForward,
            round,
            layer: 0,
            sender: 0,
            group: 0,
            payload: vec![],
        }
    }

    #[test]
    fn submitted_jobs_are_processed() {
        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
            fail_on: None,
        });
        let pool = WorkPool::new(2, handler.clone());
        for i in 0..10 {
            pool.submit(job(i));
        }
        drop(pool);
        assert_eq!(handler.count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn failing_job_does_not_stop_other_workers() {
        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
            fail_on: Some(3),
        });
        let pool = WorkPool::new(2, handler.clone());
        for i in 0..10 {
            pool.submit(job(i));
        }
        drop(pool);
        assert_eq!(handler.count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn default_worker_count_is_at_least_one() {
        assert!(WorkPool::default_worker_count() >= 1);
    }

    #[test]
    fn pool_drains_before_dropping() {
        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
            fail_on: None,
        });
        let pool = WorkPool::new(1, handler.clone());
        pool.submit(job(1));
        drop(pool);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(handler.count.load(Ordering::SeqCst), 1);
    }
}
