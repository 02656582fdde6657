//! JSON wire formats exchanged with the outside world: picks and
//! correlation detections coming in, detection/retract objects and
//! station info going out.
//!
//! Kept as its own crate, mirroring the teacher's `uwb-types` package, so a
//! downstream locator or a test harness can depend on the wire shapes
//! without pulling in the nucleation engine itself.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Station/Channel/Network/Location composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scnl {
    #[serde(rename = "Station")]
    pub station: String,
    #[serde(rename = "Channel", default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(rename = "Network")]
    pub network: String,
    #[serde(rename = "Location", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Scnl {
    pub fn key(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.station,
            self.channel.as_deref().unwrap_or(""),
            self.network,
            self.location.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "AgencyID", default, skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<String>,
    #[serde(rename = "Author", default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterBand {
    #[serde(rename = "HighPass")]
    pub high_pass: f64,
    #[serde(rename = "LowPass")]
    pub low_pass: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amplitude {
    #[serde(rename = "Amplitude", default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f64>,
    #[serde(rename = "Period", default, skip_serializing_if = "Option::is_none")]
    pub period: Option<f64>,
    #[serde(rename = "SNR", default, skip_serializing_if = "Option::is_none")]
    pub snr: Option<f64>,
}

/// Incoming single-station phase arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickMessage {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Site")]
    pub site: Scnl,
    #[serde(rename = "Source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(rename = "Time", with = "iso8601")]
    pub time: DateTime<Utc>,
    #[serde(rename = "Phase", default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(rename = "Picker", default, skip_serializing_if = "Option::is_none")]
    pub picker: Option<String>,
    #[serde(rename = "Polarity", default, skip_serializing_if = "Option::is_none")]
    pub polarity: Option<String>,
    #[serde(rename = "Filter", default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<FilterBand>,
    #[serde(rename = "Amplitude", default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<Amplitude>,
    #[serde(rename = "BackAzimuth", default, skip_serializing_if = "Option::is_none")]
    pub back_azimuth: Option<f64>,
    #[serde(rename = "Slowness", default, skip_serializing_if = "Option::is_none")]
    pub slowness: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypocenter {
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Depth")]
    pub depth: f64,
    #[serde(rename = "Time", with = "iso8601")]
    pub time: DateTime<Utc>,
    #[serde(rename = "LatitudeError", default, skip_serializing_if = "Option::is_none")]
    pub latitude_error: Option<f64>,
    #[serde(rename = "LongitudeError", default, skip_serializing_if = "Option::is_none")]
    pub longitude_error: Option<f64>,
    #[serde(rename = "DepthError", default, skip_serializing_if = "Option::is_none")]
    pub depth_error: Option<f64>,
    #[serde(rename = "TimeError", default, skip_serializing_if = "Option::is_none")]
    pub time_error: Option<f64>,
}

/// Incoming waveform-correlation detection, same envelope as a pick plus a
/// tentative hypocenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMessage {
    #[serde(flatten)]
    pub pick: PickMessage,
    #[serde(rename = "Hypocenter")]
    pub hypocenter: Hypocenter,
    #[serde(rename = "Correlation", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<f64>,
    #[serde(rename = "Magnitude", default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    #[serde(rename = "SNR", default, skip_serializing_if = "Option::is_none")]
    pub snr: Option<f64>,
    #[serde(rename = "DetectionThreshold", default, skip_serializing_if = "Option::is_none")]
    pub detection_threshold: Option<f64>,
    #[serde(rename = "ThresholdType", default, skip_serializing_if = "Option::is_none")]
    pub threshold_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionType {
    New,
    Update,
}

/// One contributing pick/correlation, annotated with how it associated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationInfo {
    #[serde(rename = "Phase")]
    pub phase: String,
    #[serde(rename = "Residual")]
    pub residual: f64,
    #[serde(rename = "Distance")]
    pub distance: f64,
    #[serde(rename = "Azimuth")]
    pub azimuth: f64,
    #[serde(flatten)]
    pub pick: PickMessage,
}

/// Outgoing detection (new or updated event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionMessage {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(rename = "Hypocenter")]
    pub hypocenter: Hypocenter,
    #[serde(rename = "DetectionType")]
    pub detection_type: DetectionType,
    #[serde(rename = "Bayes")]
    pub bayes: f64,
    #[serde(rename = "MinimumDistance")]
    pub minimum_distance: f64,
    #[serde(rename = "Gap")]
    pub gap: f64,
    #[serde(rename = "Data")]
    pub data: Vec<AssociationInfo>,
}

impl DetectionMessage {
    pub fn new(detection_type: DetectionType) -> Self {
        Self {
            message_type: "Detection".to_string(),
            id: String::new(),
            source: None,
            hypocenter: Hypocenter {
                latitude: 0.0,
                longitude: 0.0,
                depth: 0.0,
                time: Utc::now(),
                latitude_error: None,
                longitude_error: None,
                depth_error: None,
                time_error: None,
            },
            detection_type,
            bayes: 0.0,
            minimum_distance: 0.0,
            gap: 0.0,
            data: Vec::new(),
        }
    }
}

/// Outgoing retraction of a previously published detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractMessage {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl RetractMessage {
    pub fn new(id: impl Into<String>, source: Option<Source>) -> Self {
        Self {
            message_type: "Retract".to_string(),
            id: id.into(),
            source,
        }
    }
}

/// A single station's registry entry, shared on the wire in the same shape
/// as the internal site registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationInfo {
    #[serde(rename = "Site")]
    pub site: Scnl,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Elevation")]
    pub elevation: f64,
    #[serde(rename = "Quality", default)]
    pub quality: f64,
    #[serde(rename = "Enable", default = "default_true")]
    pub enable: bool,
    #[serde(rename = "UseForTeleseismic", default)]
    pub use_for_teleseismic: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationInfoRequest {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "Site")]
    pub site: Scnl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationInfoList {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "StationList")]
    pub station_list: Vec<StationInfo>,
}

impl StationInfoList {
    pub fn new(stations: Vec<StationInfo>) -> Self {
        Self {
            message_type: "StationInfoList".to_string(),
            station_list: stations,
        }
    }
}

/// `serde(with = "iso8601")` helper: wire times are
/// `YYYY-MM-DDTHH:MM:SS.sssZ`, millisecond precision, always UTC.
pub mod iso8601 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Encode an epoch-seconds value as the wire ISO-8601 string.
pub fn encode_iso8601(epoch_seconds: f64) -> String {
    let millis = (epoch_seconds * 1000.0).round() as i64;
    let t = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(|| Utc::now());
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a wire ISO-8601 string into epoch seconds.
pub fn decode_iso8601(s: &str) -> Result<f64, chrono::ParseError> {
    let t = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
    Ok(t.timestamp_millis() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_round_trip_is_millisecond_exact() {
        let original = 1_700_000_000.123;
        let encoded = encode_iso8601(original);
        let decoded = decode_iso8601(&encoded).unwrap();
        assert!((decoded - original).abs() < 1e-3);
    }

    #[test]
    fn pick_message_round_trips_through_json() {
        let json = r#"{
            "Type": "Pick",
            "ID": "abc123",
            "Site": {"Station": "BOZ", "Network": "US"},
            "Time": "2024-01-01T00:00:00.000Z",
            "Phase": "P"
        }"#;
        let pick: PickMessage = serde_json::from_str(json).unwrap();
        assert_eq!(pick.site.station, "BOZ");
        assert_eq!(pick.phase.as_deref(), Some("P"));
        let back = serde_json::to_string(&pick).unwrap();
        let reparsed: PickMessage = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed.id, pick.id);
    }

    #[test]
    fn retract_message_serializes_with_type_tag() {
        let r = RetractMessage::new("evt-1", None);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["Type"], "Retract");
        assert_eq!(v["ID"], "evt-1");
    }

    proptest::proptest! {
        #[test]
        fn iso8601_round_trips_for_any_millisecond_epoch(
            epoch_seconds in 0i64..2_000_000_000,
            millis in 0i64..1000,
        ) {
            let original = epoch_seconds as f64 + millis as f64 / 1000.0;
            let encoded = encode_iso8601(original);
            let decoded = decode_iso8601(&encoded).unwrap();
            proptest::prop_assert!((decoded - original).abs() < 1e-3);
        }
    }
}
