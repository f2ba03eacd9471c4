//! Wire types for the `/ws` client protocol and the HTTP patient surface.
//!
//! Inbound frames are tagged on `action`; outbound frames are a single
//! envelope shape with a `type` discriminant. Both follow the literal
//! strings the original telemetry server produces so a client written
//! against it needs no changes.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------------

/// A telemetry parameter channel. Closed but extensible — new variants can
/// be added without breaking the wire format of existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    PressureFlow,
    Ecg,
    BreathCycle,
    MePAP,
    EcgQrsInfo,
    Photodiode,
}

impl ParamType {
    /// The exact string used on the wire and in log lines. Irregular casing
    /// is intentional: it matches the original table-to-label mapping
    /// byte-for-byte (`"ECG"`, not `"ecg"`; `"MePAP"`, not `"mepap"`).
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::PressureFlow => "pressure_flow",
            ParamType::Ecg => "ECG",
            ParamType::BreathCycle => "breath_cycle",
            ParamType::MePAP => "MePAP",
            ParamType::EcgQrsInfo => "ECG_QRS_INFO",
            ParamType::Photodiode => "photodiode",
        }
    }

    pub fn all() -> &'static [ParamType] {
        &[
            ParamType::PressureFlow,
            ParamType::Ecg,
            ParamType::BreathCycle,
            ParamType::MePAP,
            ParamType::EcgQrsInfo,
            ParamType::Photodiode,
        ]
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamTypeParseError(pub String);

impl fmt::Display for ParamTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised param_type {:?}", self.0)
    }
}

impl std::error::Error for ParamTypeParseError {}

impl std::str::FromStr for ParamType {
    type Err = ParamTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamType::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParamTypeParseError(s.to_owned()))
    }
}

impl Serialize for ParamType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ParamType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One labelled waveform channel: `{"unit": "...", "values": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub unit: String,
    pub values: Vec<f64>,
}

/// A structured, already-decoded JSON object for the param types whose
/// schema is defined by the upstream sensor firmware rather than by this
/// server (`breath_cycle`, `MePAP`, `photodiode`).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The normalised payload for one decoded sample, one variant per
/// [`ParamType`]. This is both the in-process cache representation and
/// (via `Serialize`) the shape of the outbound `data` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamPayload {
    PressureFlow { pressure: Channel, flow: Channel },
    Ecg { ecg: Channel, emg: Channel, impedance: Channel, eeg: Channel },
    BreathCycle(JsonMap),
    MePAP(JsonMap),
    EcgQrsInfo { analysis: JsonMap, vitals: JsonMap },
    Photodiode(JsonMap),
}

impl ParamPayload {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamPayload::PressureFlow { .. } => ParamType::PressureFlow,
            ParamPayload::Ecg { .. } => ParamType::Ecg,
            ParamPayload::BreathCycle(_) => ParamType::BreathCycle,
            ParamPayload::MePAP(_) => ParamType::MePAP,
            ParamPayload::EcgQrsInfo { .. } => ParamType::EcgQrsInfo,
            ParamPayload::Photodiode(_) => ParamType::Photodiode,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound client frames
// ---------------------------------------------------------------------------

/// One inbound `/ws` frame, tagged on `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum ClientAction {
    #[serde(rename = "get_patients")]
    GetPatients,
    #[serde(rename = "get_parameters")]
    GetParameters {
        patient_id: i64,
        param_type: Vec<ParamType>,
    },
    #[serde(rename = "analyze_deltaPEEP")]
    AnalyzeDeltaPeep {
        #[serde(rename = "pressureData")]
        pressure_data: Vec<f64>,
        #[serde(rename = "flowData")]
        flow_data: Vec<f64>,
        #[serde(rename = "deltaPEEP")]
        delta_peep: Vec<f64>,
    },
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "deepseek_chat")]
    DeepseekChat { message: String },
    #[serde(rename = "store_peep_snapshot")]
    StorePeepSnapshot {
        patient_id: i64,
        record_time: String,
        #[serde(default)]
        avg_current_peep: Option<f64>,
        #[serde(default)]
        avg_recommended_peep: Option<f64>,
    },
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Success,
    Failure,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    GetPatientList,
    GetParameters,
    AnalyzeDeltaPeep,
    PeepHistory,
    DeepseekResponse,
}

impl FrameType {
    fn as_str(self) -> &'static str {
        match self {
            FrameType::GetPatientList => "get_patient_list",
            FrameType::GetParameters => "get_parameters",
            FrameType::AnalyzeDeltaPeep => "analyze_deltaPEEP",
            FrameType::PeepHistory => "peep_history",
            FrameType::DeepseekResponse => "deepseek_response",
        }
    }
}

impl Serialize for FrameType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Either a raw seconds-since-epoch number (used for `get_parameters`,
/// carrying the sample's `collection_ts` verbatim) or an ISO-8601 string
/// (used everywhere else, stamped at send time).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FrameTimestamp {
    Seconds(f64),
    Iso8601(String),
}

/// The single outbound envelope shape used by every `/ws` reply.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub status: FrameStatus,
    pub code: u16,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: FrameTimestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param_type: Option<Vec<ParamType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl OutboundFrame {
    pub fn success(frame_type: FrameType, message: impl Into<String>, data: serde_json::Value, timestamp: FrameTimestamp) -> Self {
        Self {
            frame_type,
            status: FrameStatus::Success,
            code: 200,
            message: message.into(),
            data,
            timestamp,
            param_type: None,
            analysis_id: None,
            progress: None,
        }
    }

    pub fn failure(frame_type: FrameType, code: u16, message: impl Into<String>, timestamp: FrameTimestamp) -> Self {
        Self {
            frame_type,
            status: FrameStatus::Failure,
            code,
            message: message.into(),
            data: serde_json::Value::Null,
            timestamp,
            param_type: None,
            analysis_id: None,
            progress: None,
        }
    }

    /// Used for the `analyze_deltaPEEP` progress frames (10%/20%) that
    /// precede the final `success`/`failure` frame.
    pub fn processing(frame_type: FrameType, message: impl Into<String>, timestamp: FrameTimestamp) -> Self {
        Self {
            frame_type,
            status: FrameStatus::Processing,
            code: 200,
            message: message.into(),
            data: serde_json::Value::Null,
            timestamp,
            param_type: None,
            analysis_id: None,
            progress: None,
        }
    }
}

/// Frozen close code used when the server rejects a connection for
/// capacity reasons (spec's `MAX_CONNECTIONS`).
pub const CLOSE_CODE_OVERLOADED: u16 = 4000;
pub const CLOSE_REASON_OVERLOADED: &str = "Server overloaded";

pub mod codes {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const INTERNAL_ERROR: u16 = 500;
}

// ---------------------------------------------------------------------------
// HTTP surface DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub patient_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientDetail {
    pub patient_id: i64,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub admission_date: Option<String>,
    pub ethnicity: Option<String>,
    pub marital_status: Option<String>,
    pub birth_date: Option<String>,
    pub admission_count: Option<i32>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub admission_date: Option<String>,
    pub ethnicity: Option<String>,
    pub marital_status: Option<String>,
    pub birth_date: Option<String>,
    pub admission_count: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeepHistoryPoint {
    pub record_time: String,
    pub current_peep: Option<f64>,
    pub recommended_peep: Option<f64>,
}

/// Frozen HTTP error envelope used by all non-2xx HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_round_trips_through_its_wire_string() {
        for p in ParamType::all() {
            let s = p.as_str();
            assert_eq!(s.parse::<ParamType>().unwrap(), *p);
        }
    }

    #[test]
    fn param_type_rejects_unknown_strings() {
        assert!("unknown_param".parse::<ParamType>().is_err());
    }

    #[test]
    fn get_parameters_action_treats_param_type_uniformly_as_a_list() {
        let json = r#"{"action":"get_parameters","patient_id":42,"param_type":["ECG","pressure_flow"]}"#;
        match serde_json::from_str::<ClientAction>(json).unwrap() {
            ClientAction::GetParameters { patient_id, param_type } => {
                assert_eq!(patient_id, 42);
                assert_eq!(param_type, vec![ParamType::Ecg, ParamType::PressureFlow]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn outbound_success_frame_matches_get_parameters_envelope_shape() {
        let frame = OutboundFrame::success(
            FrameType::GetParameters,
            "Data fetched successfully",
            serde_json::json!({"pressure": {"unit": "cmH2O", "values": [1.0, 2.0]}}),
            FrameTimestamp::Seconds(1000.0),
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "get_parameters");
        assert_eq!(value["status"], "success");
        assert_eq!(value["code"], 200);
        assert_eq!(value["timestamp"], 1000.0);
        assert!(value.get("analysis_id").is_none());
    }

    #[test]
    fn processing_frame_carries_the_processing_status() {
        let frame = OutboundFrame::processing(FrameType::AnalyzeDeltaPeep, "Analysis started", FrameTimestamp::Seconds(1.0));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["status"], "processing");
        assert_eq!(value["code"], 200);
    }

    #[test]
    fn analyze_deltapeep_action_requires_exact_field_names() {
        let json = r#"{"action":"analyze_deltaPEEP","pressureData":[1.0],"flowData":[2.0],"deltaPEEP":[3.0]}"#;
        match serde_json::from_str::<ClientAction>(json).unwrap() {
            ClientAction::AnalyzeDeltaPeep { pressure_data, flow_data, delta_peep } => {
                assert_eq!(pressure_data, vec![1.0]);
                assert_eq!(flow_data, vec![2.0]);
                assert_eq!(delta_peep, vec![3.0]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
