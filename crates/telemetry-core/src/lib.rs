//! Pure in-process logic for the ingest → cache → dispatch pipeline:
//! the sample cache, subscription registry, activity tracker and the
//! sharded dispatch queues that sit between them. None of this module
//! touches the network, the database, or the replication stream — those
//! live in the server binary, which wires this crate's types together.

pub mod activity;
pub mod cache;
pub mod event;
pub mod registry;

pub type PatientId = i64;
pub use telemetry_protocol::ParamType;
