//! S5: a session subscribed to two parameters that disconnects is fully
//! unregistered and unsubscribed — a sample ingested afterward for either
//! key has nowhere to go, and the registry holds no trace of the patient.

mod support;

use std::time::Duration;

use serde_json::json;
use telemetry_core::event::DispatchEvent;
use telemetry_protocol::{Channel, ParamPayload, ParamType};

#[tokio::test]
async fn dropped_connection_is_unregistered_and_unsubscribed() {
    let server = support::start_server(10).await;
    let patient_id = 3i64;

    server.state.activity.mark_active(patient_id, ParamType::PressureFlow, tokio::time::Instant::now());
    server.state.activity.mark_active(patient_id, ParamType::Ecg, tokio::time::Instant::now());

    let mut client = support::WsTestClient::connect(&server.ws_url()).await;
    client
        .send_json(json!({
            "action": "get_parameters",
            "patient_id": patient_id,
            "param_type": ["pressure_flow", "ECG"],
        }))
        .await;

    support::poll_until(|| server.state.sessions.len() == 1, Duration::from_secs(2)).await;
    assert_eq!(server.state.registry.subscribers(patient_id, ParamType::PressureFlow).len(), 1);
    assert_eq!(server.state.registry.subscribers(patient_id, ParamType::Ecg).len(), 1);

    client.close().await;

    support::poll_until(|| server.state.sessions.is_empty(), Duration::from_secs(2)).await;
    assert!(!server.state.registry.has_any(patient_id, ParamType::PressureFlow));
    assert!(!server.state.registry.has_any(patient_id, ParamType::Ecg));

    // A sample ingested after the disconnect has no subscriber and must
    // not panic the dispatch worker.
    let payload = ParamPayload::PressureFlow {
        pressure: Channel { unit: "cmH2O".into(), values: vec![1.0] },
        flow: Channel { unit: "L/min".into(), values: vec![2.0] },
    };
    let ts = 1_700_000_200.0;
    server.state.cache.update(patient_id, ParamType::PressureFlow, payload, ts);
    server.state.queues.push(DispatchEvent { patient_id, param_type: ParamType::PressureFlow, collection_ts: ts });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(server.state.sessions.is_empty());
}
