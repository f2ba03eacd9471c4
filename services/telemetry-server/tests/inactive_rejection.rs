//! S2: subscribing to a parameter that has never been ingested is
//! rejected with a named failure frame instead of a silent subscribe.

mod support;

use std::time::Duration;

use serde_json::json;
use telemetry_protocol::ParamType;

#[tokio::test]
async fn subscribing_to_never_ingested_parameter_is_rejected() {
    let server = support::start_server(10).await;
    let patient_id = 7i64;

    let mut client = support::WsTestClient::connect(&server.ws_url()).await;
    client
        .send_json(json!({
            "action": "get_parameters",
            "patient_id": patient_id,
            "param_type": ["ECG"],
        }))
        .await;

    let frame = client
        .recv_json(Duration::from_secs(2))
        .await
        .expect("expected a rejection frame");

    assert_eq!(frame["type"], "get_parameters");
    assert_eq!(frame["status"], "failure");
    assert_eq!(frame["code"], 400);
    let message = frame["message"].as_str().unwrap();
    assert!(message.contains("inactive"));
    assert!(message.contains("ECG"));

    assert!(server.state.registry.subscribers(patient_id, ParamType::Ecg).is_empty());
}
