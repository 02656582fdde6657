//! `glass-app <configfile> [logname] [noconsole]`
//!
//! Loads the root configuration, the nucleation tuning file, the
//! station registry, and every configured detection web, then starts
//! the nucleation pool and output tracker and runs the same
//! wake-every-five-seconds health check loop as the original.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use glass_core::concurrency::DEFAULT_HEALTH_CHECK_INTERVAL;
use glass_core::config::{Configuration, GridCommand, GridConfig, Initialize, InputConfig};
use glass_core::error::{GlassError, Result};
use glass_core::geo::{Geo, EARTH_RADIUS_KM};
use glass_core::nucleator::{Nucleator, PickList, TriggerSink};
use glass_core::output::{HypoUpdate, OutputConfig, OutputTracker, PublishSink};
use glass_core::pick::{Pick, PickId};
use glass_core::site::{Scnl as CoreScnl, Site};
use glass_core::taper::Taper;
use glass_core::traveltime::{PhaseRange, TravelTimeSet, TravelTimeTable};
use glass_core::trigger::Trigger;
use glass_core::web::{Web, WebConfig};

#[derive(Parser, Debug)]
#[command(name = "glass-app", version)]
struct Cli {
    /// Path to the root Configuration JSON file.
    configfile: PathBuf,
    /// Optional trailing positional args, either a log name or the
    /// literal token `noconsole`, in either order, matching the
    /// original's manual argv scan.
    #[arg(num_args = 0..=2)]
    extra: Vec<String>,
}

struct LoggedSink;

impl TriggerSink for LoggedSink {
    fn dispatch_trigger(&self, trigger: Arc<Trigger>) {
        info!(
            lat = trigger.latitude,
            lon = trigger.longitude,
            depth_km = trigger.depth_km,
            origin_time = trigger.origin_time,
            bayes = trigger.bayesian_sum,
            picks = trigger.pick_count,
            "nucleation trigger"
        );
    }
}

/// Bridges a dispatched trigger into the output tracker's hypocenter
/// cache. Real deployments sit a non-linear locator between the two;
/// absent one, each trigger is treated as its own one-shot hypocenter
/// update (version 1, never cancelled).
struct TriggerToOutput {
    tracker: Arc<OutputTracker>,
    next_id: std::sync::atomic::AtomicU64,
}

impl TriggerSink for TriggerToOutput {
    fn dispatch_trigger(&self, trigger: Arc<Trigger>) {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.tracker.record(HypoUpdate {
            id,
            version: 1,
            cancelled: false,
            latitude: trigger.latitude,
            longitude: trigger.longitude,
            depth_km: trigger.depth_km,
            origin_time: trigger.origin_time,
        });
    }
}

struct LoggedPublishSink;

impl PublishSink for LoggedPublishSink {
    fn publish_detection(&self, update: &HypoUpdate) {
        info!(id = update.id, version = update.version, "publish detection");
    }
    fn publish_retraction(&self, id: u64) {
        info!(id, "publish retraction");
    }
}

fn main() {
    let cli = Cli::parse();

    let mut log_name = "glass-app".to_string();
    let mut log_console = true;
    for token in &cli.extra {
        if token == "noconsole" {
            log_console = false;
        } else {
            log_name = token.clone();
        }
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "glass_app=info,glass_core=info".into());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log_console {
        subscriber.init();
    } else {
        subscriber.with_writer(std::io::sink).init();
    }

    info!(log_name, "glass-app startup");

    match run(&cli.configfile) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "glass-app exiting after startup failure");
            std::process::exit(1);
        }
    }
}

fn run(config_path: &Path) -> Result<()> {
    let configuration = Configuration::load(config_path)?;
    let config_dir = configuration.config_directory.clone();

    info!(path = %config_path.display(), "loaded root configuration");

    let initialize = Initialize::load(&config_dir.join(&configuration.initialize_file))?;
    info!("loaded initialize file");

    let sites = Arc::new(load_site_registry(&configuration, &config_dir)?);
    info!(count = sites.len(), "loaded station registry");

    let travel_times = Arc::new(load_travel_time_set(&initialize, &config_dir)?);

    if configuration.grid_files.is_empty() {
        return Err(GlassError::config("no <GridFiles> specified, exiting"));
    }

    let mut webs = Vec::new();
    for grid_file in &configuration.grid_files {
        if grid_file.as_os_str().is_empty() {
            continue;
        }
        let raw = std::fs::read_to_string(config_dir.join(grid_file))?;
        let grid: GridConfig = serde_json::from_str(&raw)
            .map_err(|e| GlassError::config(format!("failed to parse grid file: {e}")))?;
        let web = build_web(&grid, travel_times.clone(), &initialize, &sites)?;
        info!(web = %grid.name, nodes = web.nodes().len(), "built detection web");
        webs.push(web);
    }

    let output_tracker = OutputTracker::new(OutputConfig::default(), Arc::new(LoggedPublishSink));
    let _housekeeping = output_tracker.spawn_housekeeping();

    let sink: Arc<dyn TriggerSink> = Arc::new(TriggerToOutput {
        tracker: output_tracker.clone(),
        next_id: std::sync::atomic::AtomicU64::new(1),
    });
    let nucleator = Arc::new(Nucleator::start(initialize.num_nucleation_threads, 4096, sink));

    if let Some(input_config_path) = &configuration.input_config {
        let input_config = InputConfig::load(&config_dir.join(input_config_path))?;
        let pick_list = Arc::new(PickList::new(initialize.pick_max.unwrap_or(10_000)));
        info!(dir = %input_config.input_directory.display(), "starting pick-ingest thread");
        spawn_pick_ingest(
            input_config,
            sites.clone(),
            pick_list,
            nucleator.clone(),
            initialize.pick_duplicate_window,
        );
    } else {
        warn!("no <InputConfig> specified; glass-app will not ingest any picks");
    }

    info!("glass is running");
    loop {
        std::thread::sleep(Duration::from_secs(5));
        for state in nucleator.states() {
            if state.is_unhealthy(DEFAULT_HEALTH_CHECK_INTERVAL) {
                warn!("nucleation worker thread has gone stale");
            }
        }
    }
}

fn load_site_registry(
    configuration: &Configuration,
    config_dir: &Path,
) -> Result<HashMap<CoreScnl, Arc<Site>>> {
    let list_path = configuration
        .station_list
        .as_ref()
        .ok_or_else(|| GlassError::config("missing <StationList>"))?;
    let raw = std::fs::read_to_string(config_dir.join(list_path))?;
    let station_list: wire::StationInfoList = serde_json::from_str(&raw)
        .map_err(|e| GlassError::config(format!("failed to parse station list: {e}")))?;

    let mut sites = HashMap::new();
    for entry in station_list.station_list {
        let scnl = CoreScnl::new(
            entry.site.station.clone(),
            entry.site.channel.clone().unwrap_or_default(),
            entry.site.network.clone(),
            entry.site.location.clone().unwrap_or_default(),
        );
        let geo = Geo::from_geographic(entry.latitude, entry.longitude, EARTH_RADIUS_KM - entry.elevation / 1000.0);
        let site = Site::new(scnl.clone(), geo);
        site.set_enabled(entry.enable);
        site.set_use_for_teleseismic(entry.use_for_teleseismic);
        site.set_quality(entry.quality);
        sites.insert(scnl, site);
    }
    Ok(sites)
}

/// Starts the background thread that polls `input_config.input_directory`
/// for newline-delimited pick/correlation JSON files, converts each line
/// into a `core::pick::Pick`, and submits it to `nucleator`. Mirrors the
/// original broker input module's "one format directory, archive or drop
/// the file when done" shape, minus its multi-parser dispatch (this engine
/// only ever receives the JSON wire formats).
fn spawn_pick_ingest(
    input_config: InputConfig,
    sites: Arc<HashMap<CoreScnl, Arc<Site>>>,
    pick_list: Arc<PickList>,
    nucleator: Arc<Nucleator>,
    pick_duplicate_window: f64,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("pick-ingest".to_string())
        .spawn(move || loop {
            match next_input_file(&input_config) {
                Some(path) => {
                    if let Err(e) = process_input_file(
                        &path,
                        &input_config,
                        &sites,
                        &pick_list,
                        &nucleator,
                        pick_duplicate_window,
                    ) {
                        warn!(path = %path.display(), error = %e, "failed to process input file");
                    }
                }
                None => std::thread::sleep(Duration::from_millis(input_config.poll_interval_ms)),
            }
        })
        .expect("failed to spawn pick-ingest thread")
}

fn next_input_file(input_config: &InputConfig) -> Option<PathBuf> {
    let entries = std::fs::read_dir(&input_config.input_directory).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if input_config.formats.iter().any(|f| f == extension) {
            return Some(path);
        }
    }
    None
}

fn process_input_file(
    path: &Path,
    input_config: &InputConfig,
    sites: &HashMap<CoreScnl, Arc<Site>>,
    pick_list: &PickList,
    nucleator: &Nucleator,
    pick_duplicate_window: f64,
) -> Result<()> {
    let raw = std::fs::read_to_string(path)?;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_pick_line(line, sites) {
            Some(pick) => {
                if !pick_list.contains_duplicate(&pick.site, pick.time, pick_duplicate_window) {
                    pick.site.push_pick(&pick);
                    pick_list.push(pick.clone());
                    nucleator.submit(pick);
                }
            }
            None => warn!(line, "skipping unparseable or unknown-site input line"),
        }
    }

    match &input_config.archive_directory {
        Some(archive_dir) => {
            std::fs::create_dir_all(archive_dir)?;
            let file_name = path.file_name().ok_or_else(|| GlassError::bug("input file has no name"))?;
            std::fs::rename(path, archive_dir.join(file_name))?;
        }
        None => std::fs::remove_file(path)?,
    }
    Ok(())
}

/// Parses one input line as either a `PickMessage` or a `CorrelationMessage`
/// (discriminated by its `Type` tag) and resolves it against the known site
/// registry. Returns `None` on a parse failure or an unrecognized SCNL.
fn parse_pick_line(line: &str, sites: &HashMap<CoreScnl, Arc<Site>>) -> Option<Arc<Pick>> {
    static NEXT_PICK_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let is_correlation = value.get("Type").and_then(|t| t.as_str()) == Some("Correlation");

    let (wire_site, time, phase, back_azimuth, slowness) = if is_correlation {
        let msg: wire::CorrelationMessage = serde_json::from_value(value).ok()?;
        (msg.pick.site, msg.pick.time, msg.pick.phase, msg.pick.back_azimuth, msg.pick.slowness)
    } else {
        let msg: wire::PickMessage = serde_json::from_value(value).ok()?;
        (msg.site, msg.time, msg.phase, msg.back_azimuth, msg.slowness)
    };

    let scnl = CoreScnl::new(
        wire_site.station,
        wire_site.channel.unwrap_or_default(),
        wire_site.network,
        wire_site.location.unwrap_or_default(),
    );
    let site = sites.get(&scnl)?.clone();

    let id = PickId(NEXT_PICK_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
    let mut pick = Pick::new(id, site, time.timestamp_millis() as f64 / 1000.0);
    pick.phase = phase;
    pick.back_azimuth = back_azimuth;
    pick.slowness = slowness;
    Some(Arc::new(pick))
}

fn load_travel_time_set(initialize: &Initialize, config_dir: &Path) -> Result<TravelTimeSet> {
    let mut set = TravelTimeSet::new();

    let table = read_table(config_dir, &initialize.default_nucleation_phase.trav_file)?;
    set.add_phase(
        initialize.default_nucleation_phase.phase_name.clone(),
        PhaseRange::Weight(Taper::default()),
        table,
    )?;

    for phase in &initialize.association_phases {
        let table = read_table(config_dir, &phase.trav_file)?;
        let range = if let Some([x1, x2, x3, x4]) = phase.range {
            PhaseRange::Weight(Taper::new(x1, x2, x3, x4))
        } else if let Some([min, max]) = phase.assoc {
            PhaseRange::Assoc { min, max }
        } else {
            PhaseRange::Weight(Taper::default())
        };
        set.add_phase(phase.phase_name.clone(), range, table)?;
    }

    Ok(set)
}

fn read_table(config_dir: &Path, trav_file: &Path) -> Result<TravelTimeTable> {
    let mut file = std::fs::File::open(config_dir.join(trav_file))?;
    TravelTimeTable::read(&mut file)
}

fn build_web(
    grid: &GridConfig,
    travel_times: Arc<TravelTimeSet>,
    initialize: &Initialize,
    sites: &HashMap<CoreScnl, Arc<Site>>,
) -> Result<Arc<Web>> {
    let config = WebConfig {
        name: grid.name.clone(),
        resolution_km: grid.resolution_km,
        detect_count: grid.detect,
        nucleate_cut: grid.nucleate,
        thresh: grid.thresh,
        nets: grid.nets.clone(),
        allowed_sites: grid.sites.clone(),
        teleseismic_only: grid.use_only_teleseismic_stations,
        azimuth_gap_taper: grid
            .azimuth_gap_taper
            .map(|[x1, x2, x3, x4]| Taper::new(x1, x2, x3, x4)),
        max_depth_km: grid.maximum_depth,
        beam_matching_azimuth_window_deg: initialize.params.beam_matching_azimuth_window,
        pick_window_seconds: initialize.params.pick_window_seconds,
        significance_floor: initialize.params.significance_floor,
        web_threads: initialize.num_web_threads,
        primary_phase: grid.nucleation_phases.phase1.clone(),
        secondary_phase: grid.nucleation_phases.phase2.clone(),
    };

    let web = Web::new(config, travel_times);

    let nodes = match grid.cmd {
        GridCommand::Global => web.build_global(&grid.depths_km),
        GridCommand::Grid => {
            let center_lat = grid
                .center_latitude
                .ok_or_else(|| GlassError::config("regional grid missing CenterLatitude"))?;
            let center_lon = grid
                .center_longitude
                .ok_or_else(|| GlassError::config("regional grid missing CenterLongitude"))?;
            let rows = grid
                .rows
                .ok_or_else(|| GlassError::config("regional grid missing Rows"))?;
            let cols = grid
                .cols
                .ok_or_else(|| GlassError::config("regional grid missing Cols"))?;
            web.build_regional_grid(center_lat, center_lon, rows, cols, &grid.depths_km)
        }
        GridCommand::GridExplicit => {
            let points: Vec<(f64, f64, f64)> = grid
                .nodes
                .iter()
                .map(|n| (n.latitude, n.longitude, n.depth))
                .collect();
            web.build_explicit(&points)
        }
    };

    let candidate_sites: Vec<Arc<Site>> = sites.values().cloned().collect();
    for node in &nodes {
        web.link_node(node, &candidate_sites);
    }

    Ok(web)
}
