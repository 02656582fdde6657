//! A single-station phase arrival. Picks are shared: referenced by the
//! owning site's pick ring, by the global pick list, and, once they
//! contribute to a trigger, by the trigger's member list.

use std::sync::Arc;

use crate::site::Site;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickId(pub u64);

#[derive(Debug)]
pub struct Pick {
    pub id: PickId,
    pub site: Arc<Site>,
    /// Arrival time, epoch seconds.
    pub time: f64,
    pub back_azimuth: Option<f64>,
    pub slowness: Option<f64>,
    pub source: Option<String>,
    pub phase: Option<String>,
}

impl Pick {
    pub fn new(id: PickId, site: Arc<Site>, time: f64) -> Self {
        Pick {
            id,
            site,
            time,
            back_azimuth: None,
            slowness: None,
            source: None,
            phase: None,
        }
    }
}

impl PartialEq for Pick {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
