//! External output manager: a cache keyed by hypocenter id tracking
//! create time, last report time, version, and publish state, applying
//! the publish-on-delay / republish-on-version-bump / retract-on-cancel
//! policy the nucleator's hypo-list sink is expected to implement. A
//! low-frequency housekeeping thread expires stale entries independent
//! of the capacity-based FIFO eviction, grounded on the teacher's
//! periodic director-loop shape (wake on interval, snapshot state, act).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::{debug, info};

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// A locator-produced hypocenter update: what the external non-linear
/// locator would hand back after refining a trigger into a hypocenter.
/// The nucleator itself never constructs these; it only dispatches
/// `Trigger`s to a sink, per the "only contract is dispatchTrigger shall
/// not block nucleation" rule. This type models what arrives downstream.
#[derive(Debug, Clone)]
pub struct HypoUpdate {
    pub id: u64,
    pub version: u64,
    pub cancelled: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub origin_time: f64,
}

#[derive(Debug, Clone)]
struct TrackedHypo {
    create_time: f64,
    report_time: Option<f64>,
    cancelled: bool,
    published_version: Option<u64>,
    latest: HypoUpdate,
}

/// Sink a tracked hypocenter is published to or retracted from. Kept
/// separate from `nucleator::TriggerSink`: this operates downstream of
/// the locator, on hypocenter ids and versions, not raw triggers.
pub trait PublishSink: Send + Sync {
    fn publish_detection(&self, update: &HypoUpdate);
    fn publish_retraction(&self, id: u64);
}

pub struct OutputConfig {
    /// Elapsed seconds from `create_time` at which a pending update
    /// becomes eligible to publish, e.g. `[3.0, 6.0]`.
    pub publish_delays_seconds: Vec<f64>,
    /// If true, publish a tracked hypocenter that never crossed a delay
    /// threshold once it is about to expire, instead of dropping it
    /// silently.
    pub publish_on_expire: bool,
    pub retention_seconds: f64,
    pub housekeeping_interval: Duration,
    pub capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            publish_delays_seconds: vec![3.0, 6.0],
            publish_on_expire: true,
            retention_seconds: 86_400.0,
            housekeeping_interval: Duration::from_secs(60),
            capacity: 10_000,
        }
    }
}

pub struct OutputTracker {
    config: OutputConfig,
    cache: DashMap<u64, TrackedHypo>,
    insertion_order: Mutex<Vec<u64>>,
    sink: Arc<dyn PublishSink>,
    running: AtomicBool,
}

impl OutputTracker {
    pub fn new(config: OutputConfig, sink: Arc<dyn PublishSink>) -> Arc<Self> {
        Arc::new(OutputTracker {
            config,
            cache: DashMap::new(),
            insertion_order: Mutex::new(Vec::new()),
            sink,
            running: AtomicBool::new(true),
        })
    }

    /// Insert-or-update the cache entry for `update.id` and apply the
    /// publish policy: a cancel for an already-published id emits a
    /// retraction; otherwise, once a configured delay has elapsed since
    /// creation and the version has advanced since the last publish,
    /// emit a detection.
    pub fn record(&self, update: HypoUpdate) {
        let now = now_seconds();

        if update.cancelled {
            if let Some(mut entry) = self.cache.get_mut(&update.id) {
                let was_published = entry.published_version.is_some();
                entry.cancelled = true;
                entry.latest = update.clone();
                if was_published {
                    self.sink.publish_retraction(update.id);
                }
            }
            return;
        }

        let mut is_new = false;
        self.cache
            .entry(update.id)
            .and_modify(|entry| entry.latest = update.clone())
            .or_insert_with(|| {
                is_new = true;
                TrackedHypo {
                    create_time: now,
                    report_time: None,
                    cancelled: false,
                    published_version: None,
                    latest: update.clone(),
                }
            });

        if is_new {
            let mut order = self.insertion_order.lock().unwrap();
            if order.len() >= self.config.capacity {
                let oldest = order.remove(0);
                self.cache.remove(&oldest);
            }
            order.push(update.id);
        }

        self.maybe_publish(update.id, now);
    }

    fn maybe_publish(&self, id: u64, now: f64) {
        let should_publish = match self.cache.get(&id) {
            Some(entry) if !entry.cancelled => {
                let elapsed = now - entry.create_time;
                let delay_elapsed = self
                    .config
                    .publish_delays_seconds
                    .iter()
                    .any(|d| elapsed >= *d);
                let version_advanced = entry
                    .published_version
                    .map(|v| entry.latest.version > v)
                    .unwrap_or(true);
                delay_elapsed && version_advanced
            }
            _ => false,
        };

        if !should_publish {
            return;
        }

        if let Some(mut entry) = self.cache.get_mut(&id) {
            self.sink.publish_detection(&entry.latest);
            entry.published_version = Some(entry.latest.version);
            entry.report_time = Some(now);
            debug!(id, version = entry.latest.version, "published hypocenter update");
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_published(&self, id: u64) -> bool {
        self.cache
            .get(&id)
            .map(|e| e.published_version.is_some())
            .unwrap_or(false)
    }

    /// Spawn the periodic expiry sweep as a detached thread, modeled on
    /// the teacher's "wake on interval, snapshot, act" director loop.
    pub fn spawn_housekeeping(self: &Arc<Self>) -> std::thread::JoinHandle<()> {
        let tracker = self.clone();
        std::thread::Builder::new()
            .name("output-housekeeping".into())
            .spawn(move || {
                while tracker.running.load(Ordering::Acquire) {
                    std::thread::sleep(tracker.config.housekeeping_interval);
                    tracker.expire_stale();
                }
            })
            .expect("failed to spawn output housekeeping thread")
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn expire_stale(&self) {
        let now = now_seconds();
        let stale: Vec<u64> = self
            .cache
            .iter()
            .filter(|entry| now - entry.create_time > self.config.retention_seconds)
            .map(|entry| *entry.key())
            .collect();

        for id in &stale {
            if self.config.publish_on_expire {
                if let Some(entry) = self.cache.get(id) {
                    if entry.published_version.is_none() && !entry.cancelled {
                        self.sink.publish_detection(&entry.latest);
                    }
                }
            }
            self.cache.remove(id);
        }

        if !stale.is_empty() {
            let mut order = self.insertion_order.lock().unwrap();
            order.retain(|id| !stale.contains(id));
            info!(count = stale.len(), "expired stale tracked hypocenters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        detections: StdMutex<Vec<HypoUpdate>>,
        retractions: StdMutex<Vec<u64>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                detections: StdMutex::new(Vec::new()),
                retractions: StdMutex::new(Vec::new()),
            })
        }
    }

    impl PublishSink for RecordingSink {
        fn publish_detection(&self, update: &HypoUpdate) {
            self.detections.lock().unwrap().push(update.clone());
        }
        fn publish_retraction(&self, id: u64) {
            self.retractions.lock().unwrap().push(id);
        }
    }

    fn sample_update(id: u64, version: u64) -> HypoUpdate {
        HypoUpdate {
            id,
            version,
            cancelled: false,
            latitude: 0.0,
            longitude: 0.0,
            depth_km: 10.0,
            origin_time: 0.0,
        }
    }

    #[test]
    fn no_publish_before_delay_elapses() {
        let sink = RecordingSink::new();
        let config = OutputConfig {
            publish_delays_seconds: vec![3600.0],
            ..OutputConfig::default()
        };
        let tracker = OutputTracker::new(config, sink.clone());
        tracker.record(sample_update(1, 1));
        assert!(sink.detections.lock().unwrap().is_empty());
        assert!(!tracker.is_published(1));
    }

    #[test]
    fn publishes_immediately_when_delay_is_zero() {
        let sink = RecordingSink::new();
        let config = OutputConfig {
            publish_delays_seconds: vec![0.0],
            ..OutputConfig::default()
        };
        let tracker = OutputTracker::new(config, sink.clone());
        tracker.record(sample_update(1, 1));
        assert_eq!(sink.detections.lock().unwrap().len(), 1);
        assert!(tracker.is_published(1));
    }

    #[test]
    fn republishes_only_when_version_advances() {
        let sink = RecordingSink::new();
        let config = OutputConfig {
            publish_delays_seconds: vec![0.0],
            ..OutputConfig::default()
        };
        let tracker = OutputTracker::new(config, sink.clone());
        tracker.record(sample_update(1, 1));
        tracker.record(sample_update(1, 1));
        assert_eq!(sink.detections.lock().unwrap().len(), 1);

        tracker.record(sample_update(1, 2));
        assert_eq!(sink.detections.lock().unwrap().len(), 2);
    }

    #[test]
    fn cancel_after_publish_emits_retraction() {
        let sink = RecordingSink::new();
        let config = OutputConfig {
            publish_delays_seconds: vec![0.0],
            ..OutputConfig::default()
        };
        let tracker = OutputTracker::new(config, sink.clone());
        tracker.record(sample_update(1, 1));
        assert!(tracker.is_published(1));

        let mut cancel = sample_update(1, 1);
        cancel.cancelled = true;
        tracker.record(cancel);
        assert_eq!(sink.retractions.lock().unwrap(), &[1]);
    }

    #[test]
    fn cancel_before_publish_emits_no_retraction() {
        let sink = RecordingSink::new();
        let config = OutputConfig {
            publish_delays_seconds: vec![3600.0],
            ..OutputConfig::default()
        };
        let tracker = OutputTracker::new(config, sink.clone());
        tracker.record(sample_update(1, 1));
        let mut cancel = sample_update(1, 1);
        cancel.cancelled = true;
        tracker.record(cancel);
        assert!(sink.retractions.lock().unwrap().is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_tracked_entry() {
        let sink = RecordingSink::new();
        let config = OutputConfig {
            capacity: 2,
            ..OutputConfig::default()
        };
        let tracker = OutputTracker::new(config, sink);
        tracker.record(sample_update(1, 1));
        tracker.record(sample_update(2, 1));
        tracker.record(sample_update(3, 1));
        assert_eq!(tracker.tracked_count(), 2);
        assert!(tracker.cache.get(&1).is_none());
    }
}
