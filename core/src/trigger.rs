//! An immutable snapshot produced by a successful nucleation.

use std::sync::{Arc, Weak};

use crate::geo::{Geo, EARTH_RADIUS_KM};
use crate::pick::Pick;
use crate::web::Web;

pub struct Trigger {
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub origin_time: f64,
    pub resolution_km: f64,
    pub bayesian_sum: f64,
    pub pick_count: usize,
    pub picks: Vec<Arc<Pick>>,
    /// Back-pointer to the web whose node nucleated this trigger, so a
    /// downstream hand-off can report which web produced it.
    pub source_web: Weak<Web>,
}

impl Trigger {
    pub fn new(
        latitude: f64,
        longitude: f64,
        depth_km: f64,
        origin_time: f64,
        resolution_km: f64,
        bayesian_sum: f64,
        pick_count: usize,
        picks: Vec<Arc<Pick>>,
        source_web: Weak<Web>,
    ) -> Arc<Self> {
        Arc::new(Trigger {
            latitude,
            longitude,
            depth_km,
            origin_time,
            resolution_km,
            bayesian_sum,
            pick_count,
            picks,
            source_web,
        })
    }

    pub fn geo(&self) -> Geo {
        Geo::from_geographic(self.latitude, self.longitude, EARTH_RADIUS_KM - self.depth_km)
    }

    /// Every contributing pick must have a distinct owning site.
    pub fn picks_have_distinct_sites(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.picks
            .iter()
            .all(|p| seen.insert(p.site.scnl.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pick::PickId;
    use crate::site::{Scnl, Site};

    #[test]
    fn distinct_site_check_catches_duplicates() {
        let site = Site::new(Scnl::new("AAA", "", "XX", ""), Geo::from_geographic(0.0, 0.0, EARTH_RADIUS_KM));
        let p1 = Arc::new(Pick::new(PickId(1), site.clone(), 0.0));
        let p2 = Arc::new(Pick::new(PickId(2), site, 1.0));
        let trigger = Trigger::new(0.0, 0.0, 0.0, 0.0, 100.0, 3.0, 2, vec![p1, p2], Weak::new());
        assert!(!trigger.picks_have_distinct_sites());
    }
}
