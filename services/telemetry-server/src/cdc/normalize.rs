//! Per-table payload normalisation: one function per watched table,
//! mirroring the original row-to-sample mapping table for table.

use serde_json::{Map, Value};

use telemetry_protocol::{Channel, ParamPayload, ParamType};

use super::{RawValue, ReplicationRow};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field {0}")]
    MissingField(String),
    #[error("invalid utf-8: {0}")]
    Encoding(String),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected shape: {0}")]
    Shape(String),
    #[error("unrecognised table {0}")]
    UnsupportedTable(String),
}

/// Collapses a column value that may have arrived as already-structured
/// JSON, as raw UTF-8 bytes, or as a text string into a single
/// `serde_json::Value`. Every normaliser below goes through this first.
pub fn coerce_json(raw: &RawValue) -> Result<Value, DecodeError> {
    match raw {
        RawValue::Json(v) => Ok(v.clone()),
        RawValue::Text(s) => serde_json::from_str(s).map_err(DecodeError::from),
        RawValue::Bytes(b) => {
            let text = std::str::from_utf8(b).map_err(|e| DecodeError::Encoding(e.to_string()))?;
            serde_json::from_str(text).map_err(DecodeError::from)
        }
        other => Err(DecodeError::Shape(format!("{other:?} is not json-bearing"))),
    }
}

fn as_object(value: Value, context: &str) -> Result<Map<String, Value>, DecodeError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(DecodeError::Shape(format!("{context} is not an object"))),
    }
}

fn extract_channel(obj: &Map<String, Value>, key: &str) -> Result<Channel, DecodeError> {
    let sub = obj
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| DecodeError::MissingField(key.to_string()))?;
    let unit = sub
        .get("unit")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::MissingField(format!("{key}.unit")))?
        .to_string();
    let values = sub
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| DecodeError::MissingField(format!("{key}.values")))?
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| DecodeError::Shape(format!("{key}.values not numeric"))))
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(Channel { unit, values })
}

fn column(row: &ReplicationRow, name: &str) -> Result<&RawValue, DecodeError> {
    row.values.get(name).ok_or_else(|| DecodeError::MissingField(name.to_string()))
}

fn normalize_pressure_flow(row: &ReplicationRow) -> Result<ParamPayload, DecodeError> {
    let params = as_object(coerce_json(column(row, "parameters")?)?, "parameters")?;
    Ok(ParamPayload::PressureFlow {
        pressure: extract_channel(&params, "pressure")?,
        flow: extract_channel(&params, "flow")?,
    })
}

fn normalize_ecg(row: &ReplicationRow) -> Result<ParamPayload, DecodeError> {
    let params = as_object(coerce_json(column(row, "parameters")?)?, "parameters")?;
    Ok(ParamPayload::Ecg {
        ecg: extract_channel(&params, "ecg")?,
        emg: extract_channel(&params, "emg")?,
        impedance: extract_channel(&params, "impedance")?,
        eeg: extract_channel(&params, "eeg")?,
    })
}

fn normalize_breath_cycle(row: &ReplicationRow) -> Result<ParamPayload, DecodeError> {
    let params = as_object(coerce_json(column(row, "parameters")?)?, "parameters")?;
    Ok(ParamPayload::BreathCycle(params))
}

fn normalize_mepap(row: &ReplicationRow) -> Result<ParamPayload, DecodeError> {
    let params = as_object(coerce_json(column(row, "parameters")?)?, "parameters")?;
    Ok(ParamPayload::MePAP(params))
}

fn normalize_ecg_model(row: &ReplicationRow) -> Result<ParamPayload, DecodeError> {
    let analysis = as_object(coerce_json(column(row, "analysis_data")?)?, "analysis_data")?;
    let vitals = as_object(coerce_json(column(row, "vitals_data")?)?, "vitals_data")?;
    Ok(ParamPayload::EcgQrsInfo { analysis, vitals })
}

fn normalize_photodiode(row: &ReplicationRow) -> Result<ParamPayload, DecodeError> {
    let params = as_object(coerce_json(column(row, "parameters")?)?, "parameters")?;
    Ok(ParamPayload::Photodiode(params))
}

/// Dispatches on `row.table` to the matching normaliser.
pub fn normalize(row: &ReplicationRow) -> Result<(ParamType, ParamPayload), DecodeError> {
    let payload = match row.table.as_str() {
        "pressure_flow_params" => normalize_pressure_flow(row)?,
        "ecg_params" => normalize_ecg(row)?,
        "ella_sensor_params" => normalize_breath_cycle(row)?,
        "mepap_sensor_params" => normalize_mepap(row)?,
        "ecg_model_output" => normalize_ecg_model(row)?,
        "photodiode_params" => normalize_photodiode(row)?,
        other => return Err(DecodeError::UnsupportedTable(other.to_string())),
    };
    Ok((payload.param_type(), payload))
}

/// Extracts `patient_id` (accepting int, float, or text columns) and
/// `collection_time` (accepting a decoded timestamp, or a numeric column
/// already in seconds) — the two fields every watched table carries.
pub fn extract_identity(row: &ReplicationRow) -> Result<(i64, f64), DecodeError> {
    let patient_id = match column(row, "patient_id")? {
        RawValue::Int(i) => *i,
        RawValue::Float(f) => *f as i64,
        RawValue::Text(s) => s.parse().map_err(|_| DecodeError::Shape("patient_id not an integer".into()))?,
        other => return Err(DecodeError::Shape(format!("unexpected patient_id shape: {other:?}"))),
    };
    let collection_ts = match column(row, "collection_time")? {
        RawValue::Timestamp(ts) => *ts,
        RawValue::Float(f) => *f,
        RawValue::Int(i) => *i as f64,
        other => return Err(DecodeError::Shape(format!("unexpected collection_time shape: {other:?}"))),
    };
    Ok((patient_id, collection_ts))
}
