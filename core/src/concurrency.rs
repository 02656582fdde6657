//! OS thread pool and health-check primitives shared by the web job
//! pool, the nucleation pool, and the hypo pool. There is no
//! single-threaded cooperative core here: every pool is a fixed set of
//! `std::thread` workers pulling from a bounded `crossbeam_channel`.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, warn};

/// Default interval a supervisor waits before declaring a worker dead
/// if its last-healthy stamp hasn't advanced.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default idle sleep between queue-pop attempts.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Initialized = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initialized,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Per-worker liveness record: a lifecycle state plus a last-healthy
/// epoch-millisecond timestamp, touched once per loop iteration.
pub struct ThreadState {
    state: AtomicU8,
    last_healthy_ms: AtomicI64,
}

impl ThreadState {
    pub fn new() -> Arc<Self> {
        Arc::new(ThreadState {
            state: AtomicU8::new(LifecycleState::Initialized as u8),
            last_healthy_ms: AtomicI64::new(now_ms()),
        })
    }

    pub fn set(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn touch(&self) {
        self.last_healthy_ms.store(now_ms(), Ordering::Release);
    }

    pub fn millis_since_healthy(&self) -> i64 {
        now_ms() - self.last_healthy_ms.load(Ordering::Acquire)
    }

    /// A worker is unhealthy once it has gone longer than `interval`
    /// without touching its stamp. Detection only: the supervisor logs
    /// and makes the condition observable, it does not restart threads.
    pub fn is_unhealthy(&self, interval: Duration) -> bool {
        self.get() == LifecycleState::Started
            && self.millis_since_healthy() > interval.as_millis() as i64
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of named worker threads pulling boxed closures off
/// a bounded channel. Used for the web job pool, and reusable for any
/// other fixed-size "pop job, run it, loop" pool in the engine.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    states: Vec<Arc<ThreadState>>,
}

impl WorkerPool {
    pub fn new(name: &str, thread_count: usize) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = bounded(1024);
        let mut handles = Vec::with_capacity(thread_count);
        let mut states = Vec::with_capacity(thread_count);

        for i in 0..thread_count.max(1) {
            let receiver = receiver.clone();
            let state = ThreadState::new();
            states.push(state.clone());
            state.set(LifecycleState::Starting);

            let thread_name = format!("{name}-{i}");
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    state.set(LifecycleState::Started);
                    loop {
                        match receiver.recv_timeout(DEFAULT_IDLE_SLEEP) {
                            Ok(job) => {
                                job();
                                state.touch();
                            }
                            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                                state.touch();
                            }
                            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    state.set(LifecycleState::Stopped);
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        WorkerPool {
            sender: Some(sender),
            handles,
            states,
        }
    }

    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) {
        let dropped = self
            .sender
            .as_ref()
            .map(|sender| sender.try_send(Box::new(job)).is_err())
            .unwrap_or(true);
        if dropped {
            warn!("worker pool queue full, job dropped (backpressure)");
        }
    }

    pub fn states(&self) -> &[Arc<ThreadState>] {
        &self.states
    }

    /// The oldest worker stamp is the pool's liveness, per the design
    /// note that pool health is the max staleness across its workers.
    pub fn is_healthy(&self, interval: Duration) -> bool {
        !self.states.iter().any(|s| s.is_unhealthy(interval))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Taking `sender` out and dropping it disconnects the channel;
        // workers observe `Disconnected` on their next recv and exit
        // their loop. A plain field drop wouldn't run until after this
        // function returns, which is too late for the join below.
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("worker pool thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn worker_pool_runs_submitted_jobs() {
        let pool = WorkerPool::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn thread_state_reports_unhealthy_after_stall() {
        let state = ThreadState::new();
        state.set(LifecycleState::Started);
        assert!(!state.is_unhealthy(Duration::from_secs(30)));
        assert!(state.is_unhealthy(Duration::from_millis(0)));
    }
}
