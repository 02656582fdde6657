//! Station registry entry: geographic position, usability flags, and a
//! bounded ring of recent picks plus back-references to the node links
//! that point at this site.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::geo::Geo;
use crate::node::Node;
use crate::pick::Pick;

/// Station/Channel/Network/Location composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scnl {
    pub station: String,
    pub channel: String,
    pub network: String,
    pub location: String,
}

impl Scnl {
    pub fn new(
        station: impl Into<String>,
        channel: impl Into<String>,
        network: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Scnl {
            station: station.into(),
            channel: channel.into(),
            network: network.into(),
            location: location.into(),
        }
    }
}

impl std::fmt::Display for Scnl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.station, self.channel, self.network, self.location)
    }
}

/// Default capacity of a site's pick ring, per spec's "capacity
/// configurable, default 200".
pub const DEFAULT_PICK_RING_CAPACITY: usize = 200;

pub struct Site {
    pub scnl: Scnl,
    pub geo: Geo,
    enabled: Mutex<bool>,
    use_for_teleseismic: Mutex<bool>,
    quality: Mutex<f64>,
    pick_ring_capacity: usize,
    /// FIFO-evicted ring of weak references to recent picks.
    pick_ring: Mutex<Vec<Weak<Pick>>>,
    /// Back-references to every node that links to this site. Weak, to
    /// avoid a cycle with `Node`'s strong site references.
    node_back_links: Mutex<Vec<Weak<Node>>>,
}

impl Site {
    pub fn new(scnl: Scnl, geo: Geo) -> Arc<Self> {
        Self::with_capacity(scnl, geo, DEFAULT_PICK_RING_CAPACITY)
    }

    pub fn with_capacity(scnl: Scnl, geo: Geo, pick_ring_capacity: usize) -> Arc<Self> {
        Arc::new(Site {
            scnl,
            geo,
            enabled: Mutex::new(true),
            use_for_teleseismic: Mutex::new(true),
            quality: Mutex::new(1.0),
            pick_ring_capacity,
            pick_ring: Mutex::new(Vec::new()),
            node_back_links: Mutex::new(Vec::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    pub fn set_enabled(&self, value: bool) {
        *self.enabled.lock() = value;
    }

    pub fn use_for_teleseismic(&self) -> bool {
        *self.use_for_teleseismic.lock()
    }

    pub fn set_use_for_teleseismic(&self, value: bool) {
        *self.use_for_teleseismic.lock() = value;
    }

    pub fn quality(&self) -> f64 {
        *self.quality.lock()
    }

    pub fn set_quality(&self, value: f64) {
        *self.quality.lock() = value.clamp(0.0, 1.0);
    }

    /// Push a newly arrived pick, evicting the oldest entry (and any
    /// expired weak references) once at capacity. Matches the teacher's
    /// index-zero FIFO eviction shape for bounded logs.
    pub fn push_pick(&self, pick: &Arc<Pick>) {
        let mut ring = self.pick_ring.lock();
        ring.retain(|w| w.strong_count() > 0);
        if ring.len() >= self.pick_ring_capacity {
            ring.remove(0);
        }
        ring.push(Arc::downgrade(pick));
    }

    /// Snapshot of currently-live picks, oldest first (arrival order).
    pub fn picks(&self) -> Vec<Arc<Pick>> {
        let mut ring = self.pick_ring.lock();
        ring.retain(|w| w.strong_count() > 0);
        ring.iter().filter_map(|w| w.upgrade()).collect()
    }

    pub fn add_node_back_link(&self, node: &Arc<Node>) {
        let mut links = self.node_back_links.lock();
        links.retain(|w| w.strong_count() > 0);
        links.push(Arc::downgrade(node));
    }

    pub fn remove_node_back_link(&self, node: &Arc<Node>) {
        let mut links = self.node_back_links.lock();
        links.retain(|w| w.upgrade().map_or(false, |n| !Arc::ptr_eq(&n, node)));
    }

    /// Snapshot of nodes currently linked to this site.
    pub fn linked_nodes(&self) -> Vec<Arc<Node>> {
        let mut links = self.node_back_links.lock();
        links.retain(|w| w.strong_count() > 0);
        links.iter().filter_map(|w| w.upgrade()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_KM;
    use crate::pick::PickId;

    fn sample_site() -> Arc<Site> {
        Site::with_capacity(
            Scnl::new("BOZ", "", "US", ""),
            Geo::from_geographic(45.0, -111.0, EARTH_RADIUS_KM),
            3,
        )
    }

    #[test]
    fn pick_ring_evicts_fifo_at_capacity() {
        let site = sample_site();
        let mut picks = Vec::new();
        for i in 0..5u64 {
            let p = Arc::new(Pick::new(PickId(i), site.clone(), i as f64));
            site.push_pick(&p);
            picks.push(p);
        }
        let live = site.picks();
        assert_eq!(live.len(), 3);
        assert_eq!(live[0].id, PickId(2));
        assert_eq!(live[2].id, PickId(4));
    }

    #[test]
    fn pick_ring_drops_expired_weak_refs() {
        let site = sample_site();
        {
            let p = Arc::new(Pick::new(PickId(1), site.clone(), 1.0));
            site.push_pick(&p);
        }
        assert!(site.picks().is_empty());
    }
}
