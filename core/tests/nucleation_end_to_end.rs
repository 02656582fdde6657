//! End-to-end test exercising the public API surface: build a web from a
//! flat travel-time table, link it to a handful of sites via `Web::link_node`
//! (not the lower-level `Node::link_site` the unit tests use directly), then
//! drive a single pick through the `Nucleator` and confirm a trigger comes
//! out the other side carrying the full site count and Bayesian sum.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use glass_core::geo::{Geo, EARTH_RADIUS_KM};
use glass_core::node::Node;
use glass_core::nucleator::{Nucleator, TriggerSink};
use glass_core::pick::{Pick, PickId};
use glass_core::site::{Scnl, Site};
use glass_core::taper::Taper;
use glass_core::timewarp::TimeWarp;
use glass_core::traveltime::table::TravelTimeTable;
use glass_core::traveltime::{PhaseRange, TravelTimeSet};
use glass_core::trigger::Trigger;
use glass_core::web::{Web, WebConfig};

fn flat_p_table(n_dist: usize) -> TravelTimeTable {
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

fn build_web() -> Arc<Web> {
    let mut ttt = TravelTimeSet::new();
    ttt.add_phase("P", PhaseRange::Weight(Taper::default()), flat_p_table(200))
        .unwrap();
    let config = WebConfig {
        name: "integration".into(),
        resolution_km: 100.0,
        detect_count: 8,
        nucleate_cut: 6,
        thresh: 2.5,
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

struct CollectingSink {
    triggers: Mutex<Vec<Arc<Trigger>>>,
}

impl TriggerSink for CollectingSink {
    fn dispatch_trigger(&self, trigger: Arc<Trigger>) {
        self.triggers.lock().unwrap().push(trigger);
    }
}

#[test]
fn coincident_picks_across_a_built_web_dispatch_a_trigger() {
    let web = build_web();
    let node = Node::new(0, Arc::downgrade(&web), 0.0, 0.0, 0.0, 100.0);

    let sites: Vec<Arc<Site>> = (0..8)
        .map(|i| {
            Site::new(
                Scnl::new(format!("S{i}"), "", "XX", ""),
                Geo::from_geographic(0.0, i as f64 * 3.0, EARTH_RADIUS_KM),
            )
        })
        .collect();
    web.link_node(&node, &sites);
    assert_eq!(node.link_count(), 8);

    // Populate every site's pick ring directly (as the real ingest path
    // would have done by the time the last pick arrives), then drive the
    // nucleation scan by submitting only the last pick through the
    // asynchronous pool.
    let links = node.links_snapshot();
    let mut last_pick = None;
    for (i, link) in links.iter().enumerate() {
        let pick = Arc::new(Pick::new(PickId(i as u64), link.site.clone(), link.tt1));
        link.site.push_pick(&pick);
        last_pick = Some(pick);
    }

    let sink = Arc::new(CollectingSink {
        triggers: Mutex::new(Vec::new()),
    });
    let nucleator = Nucleator::start(1, 64, sink.clone());
    assert!(nucleator.submit(last_pick.expect("at least one linked site")));

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(nucleator.picks_processed(), 1);
    nucleator.shutdown();

    let triggers = sink.triggers.lock().unwrap();
    assert_eq!(
        triggers.len(),
        1,
        "expected exactly one trigger, got {}",
        triggers.len()
    );
    assert_eq!(triggers[0].pick_count, 8);
    assert!((triggers[0].bayesian_sum - 8.0).abs() < 1e-6);
}
