//! S3: once the activity sweep flips a parameter to inactive, a `/ws`
//! client that subscribes afterward is rejected the same way a parameter
//! that was never active would be. The sweep's own timing arithmetic is
//! covered by `telemetry-core`'s unit tests; this exercises the live
//! effect of a sweep on the session loop.

mod support;

use std::time::Duration;

use serde_json::json;
use telemetry_core::activity::INACTIVITY_THRESHOLD;
use telemetry_protocol::ParamType;

#[tokio::test]
async fn subscribe_after_sweep_flip_is_rejected() {
    let server = support::start_server(10).await;
    let patient_id = 9i64;

    let last_seen = tokio::time::Instant::now();
    server.state.activity.mark_active(patient_id, ParamType::BreathCycle, last_seen);
    assert!(server.state.activity.is_active(patient_id, ParamType::BreathCycle));

    // Simulate the periodic sweeper ticking once the patient has gone
    // quiet for longer than the threshold, without a real 20s wait.
    let past_threshold = last_seen + INACTIVITY_THRESHOLD + Duration::from_secs(1);
    server.state.activity.sweep(past_threshold, INACTIVITY_THRESHOLD);
    assert!(!server.state.activity.is_active(patient_id, ParamType::BreathCycle));

    let mut client = support::WsTestClient::connect(&server.ws_url()).await;
    client
        .send_json(json!({
            "action": "get_parameters",
            "patient_id": patient_id,
            "param_type": ["breath_cycle"],
        }))
        .await;

    let frame = client
        .recv_json(Duration::from_secs(2))
        .await
        .expect("expected a rejection frame after the sweep flipped the parameter inactive");

    assert_eq!(frame["status"], "failure");
    assert_eq!(frame["code"], 400);
    assert!(server.state.registry.subscribers(patient_id, ParamType::BreathCycle).is_empty());
}
