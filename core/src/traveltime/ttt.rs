//! Per-hypothesis travel-time set: a keyed collection of travel-time
//! tables plus, per phase, either a taper used as a distance-dependent
//! nucleation weight or a two-point associable window.

use std::collections::HashMap;

use crate::error::{GlassError, Result};
use crate::geo::Geo;
use crate::taper::Taper;
use crate::traveltime::table::{TravelTimeTable, NO_TIME};

pub const MAX_TRAV: usize = 40;

/// Either a four-point cosine taper (nucleation weighting) or a simple
/// two-point associable window `[min, max]` distance in degrees.
#[derive(Debug, Clone, Copy)]
pub enum PhaseRange {
    Weight(Taper),
    Assoc { min: f64, max: f64 },
}

impl PhaseRange {
    fn weight_at(&self, distance_deg: f64) -> f64 {
        match self {
            PhaseRange::Weight(taper) => taper.val(distance_deg),
            PhaseRange::Assoc { min, max } => {
                if distance_deg >= *min && distance_deg <= *max {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn in_window(&self, distance_deg: f64) -> bool {
        match self {
            PhaseRange::Weight(_) => true,
            PhaseRange::Assoc { min, max } => distance_deg >= *min && distance_deg <= *max,
        }
    }
}

struct PhaseEntry {
    table: TravelTimeTable,
    range: PhaseRange,
}

pub struct TravelTimeSet {
    phases: Vec<(String, PhaseEntry)>,
    origin: Option<Geo>,
    /// Distance used by the last `T()` call, for callers computing
    /// distance-dependent weights externally.
    pub last_delta_deg: f64,
    pub last_depth: f64,
    pub last_weight: f64,
}

impl TravelTimeSet {
    pub fn new() -> Self {
        TravelTimeSet {
            phases: Vec::new(),
            origin: None,
            last_delta_deg: 0.0,
            last_depth: 0.0,
            last_weight: 0.0,
        }
    }

    pub fn add_phase(&mut self, name: impl Into<String>, range: PhaseRange, table: TravelTimeTable) -> Result<()> {
        if self.phases.len() >= MAX_TRAV {
            return Err(GlassError::config(format!(
                "travel time set already holds the maximum of {MAX_TRAV} phases"
            )));
        }
        self.phases.push((name.into(), PhaseEntry { table, range }));
        Ok(())
    }

    pub fn set_origin(&mut self, origin: Geo) {
        self.origin = Some(origin);
    }

    /// Travel time for a named phase at `geo`, with `last_weight` set to
    /// the taper value at that distance. Returns `NO_TIME` on miss.
    pub fn travel_time_for_phase(&mut self, geo: &Geo, phase: &str) -> f64 {
        let origin = match self.origin {
            Some(o) => o,
            None => return NO_TIME,
        };
        let entry = match self.phases.iter().find(|(name, _)| name == phase) {
            Some((_, e)) => e,
            None => return NO_TIME,
        };
        let delta_deg = origin.delta_deg(geo);
        let depth = origin.depth_km();
        let t = entry.table.bilinear(delta_deg, depth);
        self.last_delta_deg = delta_deg;
        self.last_depth = depth;
        self.last_weight = entry.range.weight_at(delta_deg);
        t
    }

    /// Find the phase whose predicted travel time is closest to
    /// `t_observed`, subject to its associable window. Ties broken by
    /// configured (insertion) order. Returns `(phase, travel_time)`, or
    /// `None` on no match.
    pub fn best_phase_for_observation(
        &mut self,
        geo: &Geo,
        t_observed: f64,
    ) -> Option<(String, f64)> {
        let origin = self.origin?;
        let delta_deg = origin.delta_deg(geo);
        let depth = origin.depth_km();

        let mut best: Option<(String, f64, f64)> = None; // (phase, predicted_t, residual)
        for (name, entry) in &self.phases {
            if !entry.range.in_window(delta_deg) {
                continue;
            }
            let predicted = entry.table.bilinear(delta_deg, depth);
            if predicted < 0.0 {
                continue;
            }
            let residual = (t_observed - predicted).abs();
            match &best {
                Some((_, _, best_residual)) if *best_residual <= residual => {}
                _ => best = Some((name.clone(), predicted, residual)),
            }
        }

        best.map(|(name, predicted, _)| {
            self.last_delta_deg = delta_deg;
            self.last_weight = self
                .phases
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, e)| e.range.weight_at(delta_deg))
                .unwrap_or(0.0);
            (name, predicted)
        })
    }

    /// Transient override: travel time for a named phase at a given
    /// distance (degrees) and depth, without touching `origin`/`last_*`.
    pub fn travel_time_at_distance(&self, delta_deg: f64, phase: &str, depth: f64) -> f64 {
        match self.phases.iter().find(|(name, _)| name == phase) {
            Some((_, entry)) => entry.table.bilinear(delta_deg, depth),
            None => NO_TIME,
        }
    }

    /// Stateless travel time + taper weight lookup between two
    /// geographic points, safe to call concurrently from multiple
    /// threads (unlike `travel_time_for_phase`/`best_phase_for_observation`,
    /// which thread the legacy-style `origin`/`last_*` scratch fields).
    /// Treats a loaded table set as immutable after setup, matching the
    /// "no locking required on reads" design note.
    pub fn lookup(&self, origin: &Geo, target: &Geo, phase: &str) -> Option<(f64, f64)> {
        let (_, entry) = self.phases.iter().find(|(name, _)| name == phase)?;
        let delta_deg = origin.delta_deg(target);
        if !entry.range.in_window(delta_deg) {
            return None;
        }
        let t = entry.table.bilinear(delta_deg, origin.depth_km());
        if t < 0.0 {
            return None;
        }
        Some((t, entry.range.weight_at(delta_deg)))
    }
}

impl Default for TravelTimeSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timewarp::TimeWarp;

    fn flat_table(n_dist: usize) -> TravelTimeTable {
        let distance_warp = TimeWarp::new(0.0, n_dist as f64 - 1.0, 0.05, 1.0, 8.0);
        let depth_warp = TimeWarp::new(0.0, 9.0, 0.05, 1.0, 8.0);
        let mut travel_time = Vec::new();
        let mut depth_distance = Vec::new();
        for _depth in 0..10 {
            for dist in 0..n_dist {
                travel_time.push(dist as f64 * 0.2);
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

    #[test]
    fn add_phase_rejects_beyond_capacity() {
        let mut set = TravelTimeSet::new();
        for i in 0..MAX_TRAV {
            set.add_phase(format!("phase{i}"), PhaseRange::Weight(Taper::default()), flat_table(30))
                .unwrap();
        }
        let err = set.add_phase("overflow", PhaseRange::Weight(Taper::default()), flat_table(30));
        assert!(err.is_err());
    }

    #[test]
    fn travel_time_for_unknown_phase_is_sentinel() {
        let mut set = TravelTimeSet::new();
        set.set_origin(Geo::from_geographic(0.0, 0.0, crate::geo::EARTH_RADIUS_KM));
        let target = Geo::from_geographic(1.0, 0.0, crate::geo::EARTH_RADIUS_KM);
        assert_eq!(set.travel_time_for_phase(&target, "S"), NO_TIME);
    }
}
