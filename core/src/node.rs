//! A fixed hypothesized hypocenter in a detection web, linked to its
//! nearest eligible sites through precomputed travel times, and the
//! nucleation algorithm that turns coincident picks into a `Trigger`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::warn;

use crate::geo::{Geo, EARTH_RADIUS_KM};
use crate::site::Site;
use crate::trigger::Trigger;
use crate::web::Web;

/// A node<->site relation carrying one or two precomputed travel times.
/// `tt2` is `-1.0` if only a primary phase is linked.
#[derive(Clone)]
pub struct SiteLink {
    pub site: Arc<Site>,
    pub tt1: f64,
    pub tt2: f64,
}

impl SiteLink {
    pub fn new(site: Arc<Site>, tt1: f64, tt2: f64) -> Self {
        SiteLink { site, tt1, tt2 }
    }
}

/// Divides a node's resolution to get the Gaussian sigma used for
/// per-pick significance. The original leaves this implementation
/// detail unnamed; kept as an explicit, documented constant rather than
/// an inline magic number.
const RESOLUTION_SIGMA_FACTOR: f64 = 1.0;

pub struct Node {
    pub id: u64,
    pub web: Weak<Web>,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub resolution_km: f64,
    enabled: AtomicBool,
    /// Guards node-level mutation (enabling/disabling, and wraps
    /// `nucleate`). Recursive because nucleation calls into site
    /// getters that may re-enter node code through weak back-pointers.
    node_mutex: ReentrantMutex<()>,
    /// Guards the link vector alone, independent of `node_mutex`.
    links: Mutex<Vec<SiteLink>>,
}

impl Node {
    pub fn new(
        id: u64,
        web: Weak<Web>,
        latitude: f64,
        longitude: f64,
        depth_km: f64,
        resolution_km: f64,
    ) -> Arc<Self> {
        Arc::new(Node {
            id,
            web,
            latitude,
            longitude,
            depth_km,
            resolution_km,
            enabled: AtomicBool::new(true),
            node_mutex: ReentrantMutex::new(()),
            links: Mutex::new(Vec::new()),
        })
    }

    pub fn geo(&self) -> Geo {
        Geo::from_geographic(self.latitude, self.longitude, EARTH_RADIUS_KM - self.depth_km)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, value: bool) {
        self.enabled.store(value, Ordering::Release);
    }

    /// Link ordering invariant: ascending primary travel time.
    pub fn sort_site_links(&self) {
        let mut links = self.links.lock();
        links.sort_by(|a, b| a.tt1.partial_cmp(&b.tt1).unwrap_or(std::cmp::Ordering::Equal));
    }

    pub fn link_site(self: &Arc<Self>, link: SiteLink) {
        link.site.add_node_back_link(self);
        let mut links = self.links.lock();
        links.push(link);
        drop(links);
        self.sort_site_links();
    }

    pub fn unlink_site(self: &Arc<Self>, site: &Arc<Site>) {
        let mut links = self.links.lock();
        links.retain(|l| !Arc::ptr_eq(&l.site, site));
        drop(links);
        site.remove_node_back_link(self);
    }

    pub fn unlink_last_site(self: &Arc<Self>) -> Option<Arc<Site>> {
        // Mirrors the original's lock order: the site's own mutexes are
        // independent of the node's, but a node-initiated unlink always
        // acquires its own link-vector lock first.
        let mut links = self.links.lock();
        let removed = links.pop();
        drop(links);
        if let Some(link) = &removed {
            link.site.remove_node_back_link(self);
        }
        removed.map(|l| l.site)
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }

    pub fn links_snapshot(&self) -> Vec<SiteLink> {
        self.links.lock().clone()
    }

    fn gauss(x: f64, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return 0.0;
        }
        (-(x * x) / (2.0 * sigma * sigma)).exp()
    }

    /// Best significance for `link` given an observed travel time
    /// `t_obs`, or `-1.0` if there is no valid travel time on the link.
    pub fn best_significance(&self, t_obs: f64, link: &SiteLink) -> f64 {
        let sigma = self.resolution_km / RESOLUTION_SIGMA_FACTOR;
        let mut best = -1.0_f64;
        if link.tt1 >= 0.0 {
            best = best.max(Self::gauss((t_obs - link.tt1).abs(), sigma));
        }
        if link.tt2 >= 0.0 {
            best = best.max(Self::gauss((t_obs - link.tt2).abs(), sigma));
        }
        best
    }

    /// Coincidence test: does this node, hypothesizing origin time
    /// `t_origin`, see enough consistent picks on enough linked sites?
    pub fn nucleate(self: &Arc<Self>, t_origin: f64) -> Option<Arc<Trigger>> {
        let _guard = self.node_mutex.lock();

        let web = match self.web.upgrade() {
            Some(w) => w,
            None => {
                warn!("Node::nucleate: web pointer is gone");
                return None;
            }
        };

        if !self.is_enabled() {
            return None;
        }

        let nucleate_cut = web.nucleate_cut();
        let thresh = web.thresh();
        let azimuth_window_deg = web.beam_matching_azimuth_window_deg();
        let pick_window_seconds = web.pick_window_seconds();
        let significance_floor = web.significance_floor();

        let links = self.links.lock().clone();

        let mut sum = 0.0_f64;
        let mut count = 0usize;
        let mut picks = Vec::new();

        for link in &links {
            if !link.site.is_enabled() {
                continue;
            }

            let mut sig_best = -1.0_f64;
            let mut pick_best = None;

            for pick in link.site.picks() {
                let t_obs = pick.time - t_origin;
                if t_obs < 0.0 || t_obs > pick_window_seconds {
                    continue;
                }

                if let Some(back_azimuth) = pick.back_azimuth {
                    let node_geo = self.geo();
                    let site_azimuth_deg =
                        link.site.geo.azimuth(&node_geo) * crate::geo::RAD2DEG;
                    let diff = angular_diff_deg(back_azimuth, site_azimuth_deg);
                    if diff.abs() > azimuth_window_deg {
                        continue;
                    }
                }

                let sig = self.best_significance(t_obs, link);
                if sig > sig_best {
                    sig_best = sig;
                    pick_best = Some(pick);
                }
            }

            if sig_best >= significance_floor {
                count += 1;
                sum += sig_best;
                if let Some(p) = pick_best {
                    picks.push(p);
                }
            }
        }

        if count < nucleate_cut {
            return None;
        }
        if sum < thresh {
            return None;
        }

        Some(Trigger::new(
            self.latitude,
            self.longitude,
            self.depth_km,
            t_origin,
            self.resolution_km,
            sum,
            count,
            picks,
            Arc::downgrade(&web),
        ))
    }
}

fn angular_diff_deg(a: f64, b: f64) -> f64 {
    let mut diff = (a - b) % 360.0;
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff < -180.0 {
        diff += 360.0;
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_peaks_at_zero_residual() {
        assert!((Node::gauss(0.0, 1.0) - 1.0).abs() < 1e-12);
        assert!(Node::gauss(5.0, 1.0) < Node::gauss(1.0, 1.0));
    }

    #[test]
    fn best_significance_is_sentinel_with_no_valid_times() {
        let node = Node::new(1, Weak::new(), 0.0, 0.0, 0.0, 100.0);
        let site = Site::new(
            crate::site::Scnl::new("AAA", "", "XX", ""),
            Geo::from_geographic(0.0, 1.0, EARTH_RADIUS_KM),
        );
        let link = SiteLink::new(site, -1.0, -1.0);
        assert_eq!(node.best_significance(10.0, &link), -1.0);
    }
}
