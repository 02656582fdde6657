//! Configuration and Initialize-file schemas, and the nucleation
//! thresholds that the original hardcoded (1000s pick window, 0.1
//! significance floor) — promoted here to configuration with defaults
//! matching the original exactly, so behavior is unchanged unless an
//! operator opts into something different.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GlassError, Result};

/// Root configuration JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(rename = "Configuration")]
    pub configuration: String,
    #[serde(rename = "ConfigDirectory", default = "default_config_dir")]
    pub config_directory: PathBuf,
    #[serde(rename = "LogLevel", default)]
    pub log_level: Option<String>,
    #[serde(rename = "InitializeFile")]
    pub initialize_file: PathBuf,
    #[serde(rename = "StationList", default)]
    pub station_list: Option<PathBuf>,
    #[serde(rename = "GridFiles", default)]
    pub grid_files: Vec<PathBuf>,
    #[serde(rename = "InputConfig", default)]
    pub input_config: Option<PathBuf>,
    #[serde(rename = "OutputConfig", default)]
    pub output_config: Option<PathBuf>,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("./")
}

impl Configuration {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Configuration = serde_json::from_str(&raw)
            .map_err(|e| GlassError::config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.configuration != "glass-app" && self.configuration != "glass-broker-app" {
            return Err(GlassError::validate(
                "Configuration",
                format!(
                    "expected \"glass-app\" or \"glass-broker-app\", got {:?}",
                    self.configuration
                ),
            ));
        }
        Ok(())
    }
}

/// Nucleation tuning parameters (`Initialize.Params`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    #[serde(rename = "Thresh", default = "default_thresh")]
    pub thresh: f64,
    #[serde(rename = "Nucleate", default = "default_nucleate")]
    pub nucleate: usize,
    #[serde(rename = "sdAssociate", default)]
    pub sd_associate: f64,
    #[serde(rename = "sdPrune", default)]
    pub sd_prune: f64,
    #[serde(rename = "expAffinity", default)]
    pub exp_affinity: f64,
    #[serde(rename = "avgDelta", default)]
    pub avg_delta: f64,
    #[serde(rename = "avgSigma", default)]
    pub avg_sigma: f64,
    #[serde(rename = "dCutFactor", default)]
    pub d_cut_factor: f64,
    #[serde(rename = "dCutPercentage", default)]
    pub d_cut_percentage: f64,
    #[serde(rename = "dCutMin", default)]
    pub d_cut_min: f64,
    #[serde(rename = "iCycleLimit", default)]
    pub i_cycle_limit: u32,
    #[serde(rename = "CorrelationTimeWindow", default)]
    pub correlation_time_window: f64,
    #[serde(rename = "CorrelationDistanceWindow", default)]
    pub correlation_distance_window: f64,
    #[serde(rename = "CorrelationCancelAge", default)]
    pub correlation_cancel_age: f64,
    #[serde(rename = "BeamMatchingAzimuthWindow", default = "default_azimuth_window")]
    pub beam_matching_azimuth_window: f64,
    #[serde(rename = "ReportThresh", default)]
    pub report_thresh: f64,
    #[serde(rename = "ReportCut", default)]
    pub report_cut: usize,

    /// Promoted from the original's hardcoded constant: the longest
    /// teleseismic first-arrival budget a pick's observed travel time
    /// may fall within. Default matches the original exactly.
    #[serde(rename = "PickWindowSeconds", default = "default_pick_window")]
    pub pick_window_seconds: f64,
    /// Promoted from the original's hardcoded constant: the minimum
    /// per-site significance required to count toward a node's
    /// Bayesian sum. Default matches the original exactly.
    #[serde(rename = "SignificanceFloor", default = "default_significance_floor")]
    pub significance_floor: f64,
}

fn default_thresh() -> f64 {
    2.5
}
fn default_nucleate() -> usize {
    7
}
fn default_azimuth_window() -> f64 {
    180.0
}
fn default_pick_window() -> f64 {
    1000.0
}
fn default_significance_floor() -> f64 {
    0.1
}

impl Default for Params {
    fn default() -> Self {
        Params {
            thresh: default_thresh(),
            nucleate: default_nucleate(),
            sd_associate: 0.0,
            sd_prune: 0.0,
            exp_affinity: 0.0,
            avg_delta: 0.0,
            avg_sigma: 0.0,
            d_cut_factor: 0.0,
            d_cut_percentage: 0.0,
            d_cut_min: 0.0,
            i_cycle_limit: 0,
            correlation_time_window: 0.0,
            correlation_distance_window: 0.0,
            correlation_cancel_age: 0.0,
            beam_matching_azimuth_window: default_azimuth_window(),
            report_thresh: 0.0,
            report_cut: 0,
            pick_window_seconds: default_pick_window(),
            significance_floor: default_significance_floor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseFile {
    #[serde(rename = "PhaseName")]
    pub phase_name: String,
    #[serde(rename = "TravFile")]
    pub trav_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationPhase {
    #[serde(rename = "PhaseName")]
    pub phase_name: String,
    #[serde(rename = "Range", default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 4]>,
    #[serde(rename = "Assoc", default, skip_serializing_if = "Option::is_none")]
    pub assoc: Option<[f64; 2]>,
    #[serde(rename = "TravFile")]
    pub trav_file: PathBuf,
}

/// Core tuning file (`InitializeFile`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initialize {
    #[serde(rename = "DefaultNucleationPhase")]
    pub default_nucleation_phase: PhaseFile,
    #[serde(rename = "AssociationPhases", default)]
    pub association_phases: Vec<AssociationPhase>,
    #[serde(rename = "TestTravelTimes", default)]
    pub test_travel_times: bool,
    #[serde(rename = "UseL1ResidualLocator", default)]
    pub use_l1_residual_locator: bool,
    #[serde(rename = "Params", default)]
    pub params: Params,
    #[serde(rename = "PickMax", default)]
    pub pick_max: Option<usize>,
    #[serde(rename = "SitePickMax", default = "default_site_pick_max")]
    pub site_pick_max: usize,
    #[serde(rename = "CorrelationMax", default)]
    pub correlation_max: Option<usize>,
    #[serde(rename = "PickDuplicateWindow", default)]
    pub pick_duplicate_window: f64,
    #[serde(rename = "HypoMax", default)]
    pub hypo_max: Option<usize>,
    #[serde(rename = "NumNucleationThreads", default = "default_nucleation_threads")]
    pub num_nucleation_threads: usize,
    #[serde(rename = "NumHypoThreads", default = "default_hypo_threads")]
    pub num_hypo_threads: usize,
    #[serde(rename = "NumWebThreads", default)]
    pub num_web_threads: usize,
    #[serde(rename = "SiteHoursWithoutPicking", default)]
    pub site_hours_without_picking: f64,
    #[serde(rename = "SiteLookupInterval", default)]
    pub site_lookup_interval: f64,
}

fn default_site_pick_max() -> usize {
    200
}
fn default_nucleation_threads() -> usize {
    5
}
fn default_hypo_threads() -> usize {
    3
}

impl Initialize {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| GlassError::config(format!("failed to parse {}: {e}", path.display())))
    }
}

/// Geometry construction mode for a web's grid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GridCommand {
    Global,
    Grid,
    GridExplicit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NucleationPhases {
    #[serde(rename = "Phase1")]
    pub phase1: String,
    #[serde(rename = "Phase2", default)]
    pub phase2: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitNode {
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Depth")]
    pub depth: f64,
}

/// Per-web grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(rename = "Cmd")]
    pub cmd: GridCommand,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Detect", default = "default_detect")]
    pub detect: usize,
    #[serde(rename = "Nucleate", default = "default_nucleate")]
    pub nucleate: usize,
    #[serde(rename = "Thresh", default = "default_thresh")]
    pub thresh: f64,
    #[serde(rename = "Resolution")]
    pub resolution_km: f64,
    #[serde(rename = "Z", default)]
    pub depths_km: Vec<f64>,
    #[serde(rename = "AzimuthGapTaper", default)]
    pub azimuth_gap_taper: Option<[f64; 4]>,
    #[serde(rename = "MaximumDepth", default)]
    pub maximum_depth: Option<f64>,
    #[serde(rename = "NucleationPhases")]
    pub nucleation_phases: NucleationPhases,
    #[serde(rename = "Nets", default)]
    pub nets: Vec<String>,
    #[serde(rename = "Sites", default)]
    pub sites: Vec<String>,
    #[serde(rename = "UseOnlyTeleseismicStations", default)]
    pub use_only_teleseismic_stations: bool,
    #[serde(rename = "SaveGrid", default)]
    pub save_grid: bool,
    #[serde(rename = "Update", default = "default_true")]
    pub update: bool,

    // Regional-grid-only fields.
    #[serde(rename = "CenterLatitude", default)]
    pub center_latitude: Option<f64>,
    #[serde(rename = "CenterLongitude", default)]
    pub center_longitude: Option<f64>,
    #[serde(rename = "Rows", default)]
    pub rows: Option<usize>,
    #[serde(rename = "Cols", default)]
    pub cols: Option<usize>,

    // Explicit-grid-only field.
    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<ExplicitNode>,
}

fn default_detect() -> usize {
    20
}
fn default_true() -> bool {
    true
}

/// Pick/correlation file-ingest configuration (`InputConfig`'s referenced
/// JSON file), grounded on the original broker input module's own
/// configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(rename = "InputDirectory")]
    pub input_directory: PathBuf,
    #[serde(rename = "Formats")]
    pub formats: Vec<String>,
    #[serde(rename = "ArchiveDirectory", default)]
    pub archive_directory: Option<PathBuf>,
    #[serde(rename = "ErrorDirectory", default)]
    pub error_directory: Option<PathBuf>,
    #[serde(rename = "PollIntervalMs", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl InputConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| GlassError::config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_configuration_tag() {
        let c = Configuration {
            configuration: "not-glass".into(),
            config_directory: PathBuf::from("./"),
            log_level: None,
            initialize_file: PathBuf::from("init.json"),
            station_list: None,
            grid_files: Vec::new(),
            input_config: None,
            output_config: None,
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn params_defaults_match_original_hardcoded_values() {
        let p = Params::default();
        assert_eq!(p.pick_window_seconds, 1000.0);
        assert_eq!(p.significance_floor, 0.1);
        assert_eq!(p.nucleate, 7);
        assert_eq!(p.thresh, 2.5);
    }

    #[test]
    fn input_config_defaults_poll_interval_when_absent() {
        let json = r#"{"InputDirectory": "./in", "Formats": ["json"]}"#;
        let c: InputConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.poll_interval_ms, 100);
        assert!(c.archive_directory.is_none());
    }
}
