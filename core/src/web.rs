//! A named collection of nodes sharing nucleation configuration and
//! phases, covering a region or the globe. Builds node geometry, links
//! nodes to their nearest eligible sites, and services dynamic
//! station add/remove against the resulting graph through a small
//! worker pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::concurrency::WorkerPool;
use crate::geo::{Geo, DEG2KM, EARTH_RADIUS_KM};
use crate::node::{Node, SiteLink};
use crate::site::Site;
use crate::taper::Taper;
use crate::traveltime::TravelTimeSet;

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Empirical fit mapping target inter-node resolution (km) to the
/// global node count: `N ~= 5e8 * r^-1.965`, bumped to the nearest odd
/// integer (the Fibonacci-lattice construction needs an odd count).
pub fn global_node_count(resolution_km: f64) -> u64 {
    let n = 5.0e8 * resolution_km.powf(-1.965);
    let mut n = n.round() as i64;
    if n < 1 {
        n = 1;
    }
    if n % 2 == 0 {
        n += 1;
    }
    n as u64
}

#[derive(Debug, Clone, Copy)]
pub struct NucleationPhaseTimes {
    pub primary: &'static str,
    pub secondary: Option<&'static str>,
}

pub struct WebConfig {
    pub name: String,
    pub resolution_km: f64,
    pub detect_count: usize,
    pub nucleate_cut: usize,
    pub thresh: f64,
    pub nets: Vec<String>,
    pub allowed_sites: Vec<String>,
    pub teleseismic_only: bool,
    pub azimuth_gap_taper: Option<Taper>,
    pub max_depth_km: Option<f64>,
    pub beam_matching_azimuth_window_deg: f64,
    pub pick_window_seconds: f64,
    pub significance_floor: f64,
    pub web_threads: usize,
    pub primary_phase: String,
    pub secondary_phase: Option<String>,
}

enum WebJob {
    AddSite(Arc<Site>),
    RemoveSite(Arc<Site>),
}

pub struct Web {
    self_weak: Weak<Web>,
    pub config: WebConfig,
    nodes: Mutex<Vec<Arc<Node>>>,
    eligible_sites: Mutex<Vec<Arc<Site>>>,
    update: AtomicBool,
    travel_times: Arc<TravelTimeSet>,
    job_pool: Mutex<Option<WorkerPool>>,
    jobs_processed: AtomicUsize,
}

impl Web {
    pub fn new(config: WebConfig, travel_times: Arc<TravelTimeSet>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Web {
            self_weak: weak.clone(),
            config,
            nodes: Mutex::new(Vec::new()),
            eligible_sites: Mutex::new(Vec::new()),
            update: AtomicBool::new(true),
            travel_times,
            job_pool: Mutex::new(None),
            jobs_processed: AtomicUsize::new(0),
        })
    }

    fn self_arc(&self) -> Arc<Web> {
        self.self_weak
            .upgrade()
            .expect("Web outlived its own Arc; internal invariant violated")
    }

    pub fn nucleate_cut(&self) -> usize {
        self.config.nucleate_cut
    }
    pub fn thresh(&self) -> f64 {
        self.config.thresh
    }
    pub fn beam_matching_azimuth_window_deg(&self) -> f64 {
        self.config.beam_matching_azimuth_window_deg
    }
    pub fn pick_window_seconds(&self) -> f64 {
        self.config.pick_window_seconds
    }
    pub fn significance_floor(&self) -> f64 {
        self.config.significance_floor
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.lock().clone()
    }

    fn is_site_allowed(&self, site: &Site) -> bool {
        if !self.config.nets.is_empty() && !self.config.nets.contains(&site.scnl.network) {
            return false;
        }
        if !self.config.allowed_sites.is_empty()
            && !self.config.allowed_sites.contains(&site.scnl.station)
        {
            return false;
        }
        if self.config.teleseismic_only && !site.use_for_teleseismic() {
            return false;
        }
        true
    }

    // --- Geometry construction -------------------------------------------------

    /// Fibonacci-lattice global node set, one layer per configured depth.
    pub fn build_global(self: &Arc<Self>, depths_km: &[f64]) -> Vec<Arc<Node>> {
        let n = global_node_count(self.config.resolution_km);
        let m = (n as i64 - 1) / 2;
        let mut created = Vec::with_capacity(depths_km.len() * n as usize);
        let mut next_id = self.nodes.lock().len() as u64;

        for &depth_km in depths_km {
            for i in -m..=m {
                let lat = ((2.0 * i as f64) / n as f64).asin() * crate::geo::RAD2DEG;
                let lon = ((i as f64 % GOLDEN_RATIO) * 360.0 / GOLDEN_RATIO).rem_euclid(360.0);
                let lon = if lon > 180.0 { lon - 360.0 } else { lon };
                let node = Node::new(next_id, self.self_weak.clone(), lat, lon, depth_km, self.config.resolution_km);
                next_id += 1;
                created.push(node);
            }
        }
        self.nodes.lock().extend(created.iter().cloned());
        info!(web = %self.config.name, count = created.len(), "built global web geometry");
        created
    }

    /// Rectangular lat/lon grid centered at `(center_lat, center_lon)`.
    pub fn build_regional_grid(
        self: &Arc<Self>,
        center_lat: f64,
        center_lon: f64,
        rows: usize,
        cols: usize,
        depths_km: &[f64],
    ) -> Vec<Arc<Node>> {
        let lat_step = self.config.resolution_km / DEG2KM;
        let lon_step = lat_step / (center_lat * crate::geo::DEG2RAD).cos().abs().max(1e-6);

        let mut created = Vec::with_capacity(rows * cols * depths_km.len());
        let mut next_id = self.nodes.lock().len() as u64;

        let row_start = -((rows as i64 - 1) / 2);
        let col_start = -((cols as i64 - 1) / 2);

        for &depth_km in depths_km {
            for r in 0..rows {
                for c in 0..cols {
                    let lat = center_lat + (row_start + r as i64) as f64 * lat_step;
                    let lon = center_lon + (col_start + c as i64) as f64 * lon_step;
                    let node = Node::new(next_id, self.self_weak.clone(), lat, lon, depth_km, self.config.resolution_km);
                    next_id += 1;
                    created.push(node);
                }
            }
        }
        self.nodes.lock().extend(created.iter().cloned());
        created
    }

    /// Explicit `(lat, lon, depth)` node list.
    pub fn build_explicit(self: &Arc<Self>, points: &[(f64, f64, f64)]) -> Vec<Arc<Node>> {
        let mut created = Vec::with_capacity(points.len());
        let mut next_id = self.nodes.lock().len() as u64;
        for &(lat, lon, depth_km) in points {
            let node = Node::new(next_id, self.self_weak.clone(), lat, lon, depth_km, self.config.resolution_km);
            next_id += 1;
            created.push(node);
        }
        self.nodes.lock().extend(created.iter().cloned());
        created
    }

    // --- Node-site linking -------------------------------------------------

    /// Core build step: for `node`, select the `N` nearest eligible sites
    /// from `candidate_sites`, compute primary (and optional secondary)
    /// travel times, reject sites where both are the sentinel, and
    /// install the bidirectional link.
    pub fn link_node(&self, node: &Arc<Node>, candidate_sites: &[Arc<Site>]) {
        let node_geo = node.geo();

        let mut scored: Vec<(f64, Arc<Site>)> = candidate_sites
            .iter()
            .filter(|s| self.is_site_allowed(s))
            .map(|s| (node_geo.delta(&s.geo), s.clone()))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut links = Vec::new();
        for (_, site) in scored.into_iter().take(self.config.detect_count) {
            let tt1 = self
                .travel_times
                .lookup(&node_geo, &site.geo, &self.config.primary_phase)
                .map(|(t, _)| t)
                .unwrap_or(-1.0);
            let tt2 = self
                .config
                .secondary_phase
                .as_deref()
                .and_then(|phase| self.travel_times.lookup(&node_geo, &site.geo, phase))
                .map(|(t, _)| t)
                .unwrap_or(-1.0);

            if tt1 < 0.0 && tt2 < 0.0 {
                continue;
            }
            links.push(SiteLink::new(site, tt1, tt2));
        }

        for link in links {
            node.link_site(link);
        }
    }

    // --- Dynamic add/remove -------------------------------------------------

    fn do_add_site(&self, site: Arc<Site>) {
        if !self.update.load(Ordering::Acquire) || !self.is_site_allowed(&site) {
            return;
        }

        self.eligible_sites.lock().push(site.clone());

        for node in self.nodes() {
            let node_geo = node.geo();
            let distance = node_geo.delta(&site.geo);

            let links = node.links_snapshot();
            if links.len() >= self.config.detect_count {
                let farthest = links
                    .iter()
                    .map(|l| node_geo.delta(&l.site.geo))
                    .fold(f64::MIN, f64::max);
                if distance > farthest {
                    continue;
                }
                node.unlink_last_site();
            }

            let tt1 = self
                .travel_times
                .lookup(&node_geo, &site.geo, &self.config.primary_phase)
                .map(|(t, _)| t)
                .unwrap_or(-1.0);
            let tt2 = self
                .config
                .secondary_phase
                .as_deref()
                .and_then(|phase| self.travel_times.lookup(&node_geo, &site.geo, phase))
                .map(|(t, _)| t)
                .unwrap_or(-1.0);
            if tt1 < 0.0 && tt2 < 0.0 {
                continue;
            }
            node.link_site(SiteLink::new(site.clone(), tt1, tt2));
        }
    }

    fn do_remove_site(&self, site: Arc<Site>) {
        for node in site.linked_nodes() {
            node.unlink_site(&site);

            let eligible = self.eligible_sites.lock().clone();
            if eligible.len() >= self.config.detect_count {
                let node_geo = node.geo();
                let mut by_distance: Vec<(f64, Arc<Site>)> = eligible
                    .into_iter()
                    .filter(|s| !Arc::ptr_eq(s, &site))
                    .map(|s| (node_geo.delta(&s.geo), s))
                    .collect();
                by_distance
                    .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                if let Some((_, promoted)) = by_distance.into_iter().nth(self.config.detect_count - 1) {
                    let node_geo2 = node.geo();
                    let tt1 = self
                        .travel_times
                        .lookup(&node_geo2, &promoted.geo, &self.config.primary_phase)
                        .map(|(t, _)| t)
                        .unwrap_or(-1.0);
                    if tt1 >= 0.0 {
                        node.link_site(SiteLink::new(promoted, tt1, -1.0));
                    }
                }
            }
        }
        self.eligible_sites.lock().retain(|s| !Arc::ptr_eq(s, &site));
    }

    /// Enqueue an add-site job onto the web's job pool (inline if the
    /// pool has zero worker threads).
    pub fn add_site(self: &Arc<Self>, site: Arc<Site>) {
        self.dispatch(WebJob::AddSite(site));
    }

    pub fn remove_site(self: &Arc<Self>, site: Arc<Site>) {
        self.dispatch(WebJob::RemoveSite(site));
    }

    fn dispatch(self: &Arc<Self>, job: WebJob) {
        if self.config.web_threads == 0 {
            self.run_job(job);
            return;
        }
        let mut pool_guard = self.job_pool.lock();
        if pool_guard.is_none() {
            *pool_guard = Some(self.spawn_pool());
        }
        let web = self.self_arc();
        if let Some(pool) = pool_guard.as_ref() {
            pool.submit(move || web.run_job(job));
        }
    }

    fn run_job(&self, job: WebJob) {
        match job {
            WebJob::AddSite(site) => {
                debug!(web = %self.config.name, site = %site.scnl, "adding site");
                self.do_add_site(site);
            }
            WebJob::RemoveSite(site) => {
                debug!(web = %self.config.name, site = %site.scnl, "removing site");
                self.do_remove_site(site);
            }
        }
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn spawn_pool(&self) -> WorkerPool {
        WorkerPool::new(&format!("web-{}", self.config.name), self.config.web_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traveltime::table::TravelTimeTable;
    use crate::traveltime::{PhaseRange, MAX_TRAV};
    use crate::timewarp::TimeWarp;

    fn flat_p_table() -> TravelTimeTable {
        let n_dist = 200;
        let distance_warp = TimeWarp::new(0.0, n_dist as f64 - 1.0, 0.05, 1.0, 8.0);
        let depth_warp = TimeWarp::new(0.0, 9.0, 0.05, 1.0, 8.0);
        let mut travel_time = Vec::new();
        let mut depth_distance = Vec::new();
        for _depth in 0..10 {
            for dist in 0..n_dist {
                travel_time.push(dist as f64 * 10.0);
                depth_distance.push(dist as f64);
            }
        }
        TravelTimeTable {
            branch_name: "P".into(),
            phase_list: "P".into(),
            n_dist,
            n_depth: 10,
            distance_warp,
            depth_warp,
            travel_time,
            depth_distance,
            phase_tag: vec![b'P'; n_dist * 10],
        }
    }

    fn sample_web() -> Arc<Web> {
        let mut ttt = TravelTimeSet::new();
        ttt.add_phase("P", PhaseRange::Weight(Taper::default()), flat_p_table())
            .unwrap();
        let config = WebConfig {
            name: "test".into(),
            resolution_km: 100.0,
            detect_count: 5,
            nucleate_cut: 3,
            thresh: 2.0,
            nets: Vec::new(),
            allowed_sites: Vec::new(),
            teleseismic_only: false,
            azimuth_gap_taper: None,
            max_depth_km: None,
            beam_matching_azimuth_window_deg: 180.0,
            pick_window_seconds: 1000.0,
            significance_floor: 0.1,
            web_threads: 0,
            primary_phase: "P".into(),
            secondary_phase: None,
        };
        Web::new(config, Arc::new(ttt))
    }

    #[test]
    fn global_node_count_matches_empirical_fit() {
        let n = global_node_count(100.0);
        assert!(n % 2 == 1);
        // 5e8 * 100^-1.965 ~= 747.x
        assert!((740..760).contains(&n), "n={n}");
    }

    #[test]
    fn link_count_never_exceeds_detect_or_eligible_sites() {
        let web = sample_web();
        let node = Node::new(0, Arc::downgrade(&web), 0.0, 0.0, 0.0, 100.0);
        let sites: Vec<Arc<Site>> = (0..3)
            .map(|i| {
                Site::new(
                    crate::site::Scnl::new(format!("S{i}"), "", "XX", ""),
                    Geo::from_geographic(i as f64, 0.0, EARTH_RADIUS_KM),
                )
            })
            .collect();
        web.link_node(&node, &sites);
        assert!(node.link_count() <= web.config.detect_count.min(sites.len()));
    }

    #[test]
    fn links_are_sorted_by_ascending_primary_travel_time() {
        let web = sample_web();
        let node = Node::new(0, Arc::downgrade(&web), 0.0, 0.0, 0.0, 100.0);
        let sites: Vec<Arc<Site>> = (1..6)
            .map(|i| {
                Site::new(
                    crate::site::Scnl::new(format!("S{i}"), "", "XX", ""),
                    Geo::from_geographic(0.0, i as f64 * 3.0, EARTH_RADIUS_KM),
                )
            })
            .collect();
        web.link_node(&node, &sites);
        let links = node.links_snapshot();
        for w in links.windows(2) {
            assert!(w[0].tt1 <= w[1].tt1);
        }
    }

    #[test]
    fn back_references_are_symmetric_after_linking() {
        let web = sample_web();
        let node = Node::new(0, Arc::downgrade(&web), 0.0, 0.0, 0.0, 100.0);
        let site = Site::new(
            crate::site::Scnl::new("S1", "", "XX", ""),
            Geo::from_geographic(1.0, 0.0, EARTH_RADIUS_KM),
        );
        web.link_node(&node, &[site.clone()]);
        assert_eq!(node.link_count(), 1);
        let linked = site.linked_nodes();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, node.id);
    }
}
