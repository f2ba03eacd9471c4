//! Replication-log ingest: a blocking source of row-insert events, decoded
//! per-table into typed samples and fed into the cache/activity/dispatch
//! pipeline from a dedicated OS thread.

pub mod decoder;
pub mod normalize;
pub mod source;

use std::collections::HashMap;

pub use decoder::spawn;
pub use source::{ChannelReplicationSource, ReplicationError, ReplicationSource};

/// The fixed allow-list of tables the replication source is filtered to.
pub const WATCHED_TABLES: &[&str] = &[
    "pressure_flow_params",
    "ecg_params",
    "ella_sensor_params",
    "mepap_sensor_params",
    "ecg_model_output",
    "photodiode_params",
];

/// A column value as it arrives off the wire, before the bytes-or-text
/// coercion normalisers apply. Upstream JSON-typed columns may surface as
/// already-structured JSON, as raw bytes, or as a text string depending on
/// the driver and column definition — `normalize::coerce_json` is the one
/// place that collapses all three into a `serde_json::Value`.
#[derive(Debug, Clone)]
pub enum RawValue {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
    Int(i64),
    Float(f64),
    /// Seconds since the Unix epoch.
    Timestamp(f64),
}

/// One row-insert event from the replication log, already split into a
/// table name and its column values. `values` always carries at least
/// `patient_id` and `collection_time` for the watched tables; the
/// remaining keys are table-specific (`parameters`, or `analysis_data` /
/// `vitals_data` for `ecg_model_output`).
#[derive(Debug, Clone)]
pub struct ReplicationRow {
    pub table: String,
    pub values: HashMap<String, RawValue>,
}

/// Replication-endpoint credentials and connection parameters, loaded from
/// configuration (`DB_HOST`/`DB_PORT`/`BINLOG_USER`/`BINLOG_PASSWORD`).
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub server_id: u32,
}
