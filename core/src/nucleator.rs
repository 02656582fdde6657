//! Driver that turns incoming picks into nucleation attempts: a bounded
//! pick-ingest queue, a pool of nucleation worker threads running the
//! per-pick scan of §4.5, and per-web trigger deduplication before
//! handing a trigger off to its sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::concurrency::{ThreadState, LifecycleState, DEFAULT_IDLE_SLEEP};
use crate::pick::Pick;
use crate::trigger::Trigger;

/// Sink a successful trigger is handed off to. The only contract: this
/// must not block nucleation beyond a bounded queue push.
pub trait TriggerSink: Send + Sync {
    fn dispatch_trigger(&self, trigger: Arc<Trigger>);
}

/// Time-ordered, bounded cache of recent picks, independent of any
/// per-site ring, used for duplicate-pick suppression and replay.
pub struct PickList {
    capacity: usize,
    recent: Mutex<Vec<Arc<Pick>>>,
}

impl PickList {
    pub fn new(capacity: usize) -> Self {
        PickList {
            capacity,
            recent: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, pick: Arc<Pick>) {
        let mut recent = self.recent.lock();
        if recent.len() >= self.capacity {
            recent.remove(0);
        }
        recent.push(pick);
    }

    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a pick already in the cache shares `site` and falls within
    /// `window` seconds of `time`, the shape of a duplicate re-delivery
    /// rather than a distinct arrival.
    pub fn contains_duplicate(&self, site: &Arc<crate::site::Site>, time: f64, window: f64) -> bool {
        self.recent
            .lock()
            .iter()
            .any(|p| Arc::ptr_eq(&p.site, site) && (p.time - time).abs() <= window)
    }
}

/// For each node linked to the pick's site, form candidate origin
/// times from the link's travel times and test each with
/// `Node::nucleate`. Triggers from the same web are deduplicated,
/// keeping the one with the higher Bayesian sum.
fn associate_pick(pick: &Arc<Pick>) -> Vec<Arc<Trigger>> {
    let mut best_by_web: HashMap<usize, Arc<Trigger>> = HashMap::new();

    for node in pick.site.linked_nodes() {
        let link = match node
            .links_snapshot()
            .into_iter()
            .find(|l| Arc::ptr_eq(&l.site, &pick.site))
        {
            Some(l) => l,
            None => continue,
        };

        let mut candidate_origins = Vec::with_capacity(2);
        if link.tt1 >= 0.0 {
            candidate_origins.push(pick.time - link.tt1);
        }
        if link.tt2 >= 0.0 {
            candidate_origins.push(pick.time - link.tt2);
        }

        for t_origin in candidate_origins {
            if let Some(trigger) = node.nucleate(t_origin) {
                let web_key = trigger
                    .source_web
                    .upgrade()
                    .map(|w| Arc::as_ptr(&w) as usize)
                    .unwrap_or(0);
                match best_by_web.get(&web_key) {
                    Some(existing) if existing.bayesian_sum >= trigger.bayesian_sum => {}
                    _ => {
                        best_by_web.insert(web_key, trigger);
                    }
                }
                // First successful result for this node is accepted;
                // stop testing the node's remaining candidate origin.
                break;
            }
        }
    }

    best_by_web.into_values().collect()
}

pub struct Nucleator {
    sender: Sender<Arc<Pick>>,
    handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
    states: Vec<Arc<ThreadState>>,
    picks_processed: Arc<AtomicUsize>,
    triggers_emitted: Arc<AtomicUsize>,
}

impl Nucleator {
    /// `queue_capacity` bounds the pick-ingest queue (backpressure: the
    /// ingest stage polls queue size before pushing).
    pub fn start(thread_count: usize, queue_capacity: usize, sink: Arc<dyn TriggerSink>) -> Self {
        let (sender, receiver): (Sender<Arc<Pick>>, Receiver<Arc<Pick>>) = bounded(queue_capacity);
        let picks_processed = Arc::new(AtomicUsize::new(0));
        let triggers_emitted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(thread_count.max(1));
        let mut states = Vec::with_capacity(thread_count.max(1));

        for i in 0..thread_count.max(1) {
            let receiver = receiver.clone();
            let sink = sink.clone();
            let state = ThreadState::new();
            states.push(state.clone());
            let picks_processed = picks_processed.clone();
            let triggers_emitted = triggers_emitted.clone();

            let handle = std::thread::Builder::new()
                .name(format!("nucleation-{i}"))
                .spawn(move || {
                    state.set(LifecycleState::Started);
                    loop {
                        match receiver.recv_timeout(DEFAULT_IDLE_SLEEP) {
                            Ok(pick) => {
                                let triggers = associate_pick(&pick);
                                for trigger in triggers {
                                    triggers_emitted.fetch_add(1, Ordering::Relaxed);
                                    sink.dispatch_trigger(trigger);
                                }
                                picks_processed.fetch_add(1, Ordering::Relaxed);
                                state.touch();
                            }
                            Err(RecvTimeoutError::Timeout) => state.touch(),
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    state.set(LifecycleState::Stopped);
                })
                .expect("failed to spawn nucleation thread");
            handles.push(handle);
        }

        Nucleator {
            sender,
            handles: Mutex::new(handles),
            states,
            picks_processed,
            triggers_emitted,
        }
    }

    /// Enqueue a pick for nucleation scanning. Returns `false` (a
    /// `TransientIO`-flavored condition) if the queue is full; the
    /// caller should back off and retry.
    pub fn submit(&self, pick: Arc<Pick>) -> bool {
        match self.sender.try_send(pick) {
            Ok(()) => true,
            Err(_) => {
                warn!("nucleation queue full, applying backpressure");
                false
            }
        }
    }

    pub fn picks_processed(&self) -> usize {
        self.picks_processed.load(Ordering::Relaxed)
    }

    pub fn triggers_emitted(&self) -> usize {
        self.triggers_emitted.load(Ordering::Relaxed)
    }

    pub fn states(&self) -> &[Arc<ThreadState>] {
        &self.states
    }

    pub fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                debug!("nucleation worker thread panicked during shutdown");
            }
        }
    }
}
