//! The `/ws` client session: upgrade, the `MAX_CONNECTIONS` gate, and the
//! action dispatch loop. Grounded on the teacher's `ws_forwarder.rs` for the
//! handler/select shape, and on `original_source/backend/app/websocket/
//! handlers.py`'s `handle_user` for the exact action semantics (which
//! actions reply, which don't, and the inactive-parameter rejection
//! message).

pub mod registry;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use tracing::{info, warn};

use telemetry_protocol::{
    ClientAction, FrameTimestamp, FrameType, OutboundFrame, CLOSE_CODE_OVERLOADED, CLOSE_REASON_OVERLOADED,
};

use crate::repo::patients;
use crate::state::AppState;

use registry::SessionId;

pub async fn ws_session_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn now_iso8601() -> FrameTimestamp {
    FrameTimestamp::Iso8601(Utc::now().to_rfc3339())
}

async fn deliver(state: &AppState, session_id: SessionId, frame: &OutboundFrame) {
    match serde_json::to_string(frame) {
        Ok(text) => {
            state.sessions.try_deliver(session_id, Message::Text(text.into()));
        }
        Err(e) => warn!(error = %e, "failed to encode outbound frame"),
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let Some((session_id, mut inbox)) = state.sessions.try_register() else {
        warn!("rejecting connection: at MAX_CONNECTIONS capacity");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_CODE_OVERLOADED,
                reason: CLOSE_REASON_OVERLOADED.into(),
            })))
            .await;
        return;
    };
    info!(session_id, "client connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_action(&state, session_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            outgoing = inbox.recv() => {
                match outgoing {
                    Some(msg) => {
                        if socket.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.registry.unsubscribe_all(session_id);
    state.sessions.unregister(session_id);
    info!(session_id, "client disconnected");
}

async fn handle_action(state: &AppState, session_id: SessionId, text: &str) {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(a) => a,
        Err(e) => {
            warn!(session_id, error = %e, "malformed client frame, ignoring");
            return;
        }
    };

    match action {
        ClientAction::GetPatients => handle_get_patients(state, session_id).await,
        ClientAction::GetParameters { patient_id, param_type } => {
            handle_get_parameters(state, session_id, patient_id, param_type).await;
        }
        ClientAction::AnalyzeDeltaPeep { pressure_data, flow_data, delta_peep } => {
            handle_analyze_delta_peep(state, session_id, pressure_data, flow_data, delta_peep).await;
        }
        ClientAction::Stop => {
            state.registry.unsubscribe_all(session_id);
        }
        ClientAction::DeepseekChat { message } => handle_deepseek_chat(state, session_id, message),
        ClientAction::StorePeepSnapshot { patient_id, record_time, avg_current_peep, avg_recommended_peep } => {
            handle_store_peep_snapshot(state, session_id, patient_id, record_time, avg_current_peep, avg_recommended_peep).await;
        }
    }
}

async fn handle_get_patients(state: &AppState, session_id: SessionId) {
    match patients::fetch_patients(&state.pool).await {
        Ok(list) => {
            let frame = OutboundFrame::success(
                FrameType::GetPatientList,
                "Patients fetched successfully",
                serde_json::to_value(list).unwrap_or(serde_json::Value::Null),
                now_iso8601(),
            );
            deliver(state, session_id, &frame).await;
        }
        Err(e) => {
            warn!(session_id, error = %e, "failed to fetch patients");
            let frame = OutboundFrame::failure(FrameType::GetPatientList, 500, "Failed to fetch patients", now_iso8601());
            deliver(state, session_id, &frame).await;
        }
    }
}

/// On success this sends no reply at all — data reaches the client later
/// through the dispatch pool. Only a rejection produces a frame.
async fn handle_get_parameters(
    state: &AppState,
    session_id: SessionId,
    patient_id: i64,
    param_type: Vec<telemetry_protocol::ParamType>,
) {
    let inactive: Vec<telemetry_protocol::ParamType> =
        param_type.iter().copied().filter(|&p| !state.activity.is_active(patient_id, p)).collect();

    if !inactive.is_empty() {
        let joined = inactive.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ");
        let mut frame = OutboundFrame::failure(
            FrameType::GetParameters,
            400,
            format!("Current device not connected: {patient_id} -- {joined} inactive"),
            now_iso8601(),
        );
        frame.param_type = Some(param_type);
        deliver(state, session_id, &frame).await;
        info!(session_id, patient_id, ?inactive, "subscription rejected: inactive parameters");
        return;
    }

    state.registry.subscribe(patient_id, &param_type, session_id);
    info!(session_id, patient_id, ?param_type, "subscribed");
}

async fn handle_analyze_delta_peep(
    state: &AppState,
    session_id: SessionId,
    pressure_data: Vec<f64>,
    flow_data: Vec<f64>,
    delta_peep: Vec<f64>,
) {
    const EXPECTED_LEN: usize = 2501;
    if pressure_data.len() != EXPECTED_LEN || flow_data.len() != EXPECTED_LEN {
        let frame = OutboundFrame::failure(FrameType::AnalyzeDeltaPeep, 400, "Invalid parameters", now_iso8601());
        deliver(state, session_id, &frame).await;
        return;
    }

    let analysis_id = uuid::Uuid::new_v4().to_string();

    let mut started = OutboundFrame::processing(FrameType::AnalyzeDeltaPeep, "Analysis started", now_iso8601());
    started.analysis_id = Some(analysis_id.clone());
    started.progress = Some(10);
    deliver(state, session_id, &started).await;

    let mut validated =
        OutboundFrame::processing(FrameType::AnalyzeDeltaPeep, "Data validation passed", now_iso8601());
    validated.analysis_id = Some(analysis_id.clone());
    validated.progress = Some(20);
    deliver(state, session_id, &validated).await;

    let sampling_rate = state.sampling_rate;
    match state.analysis.analyse(pressure_data, flow_data, delta_peep, sampling_rate).await {
        Ok(results) => {
            let mut frame = OutboundFrame::success(
                FrameType::AnalyzeDeltaPeep,
                "Analysis completed",
                serde_json::to_value(results).unwrap_or(serde_json::Value::Null),
                now_iso8601(),
            );
            frame.analysis_id = Some(analysis_id);
            frame.progress = Some(100);
            deliver(state, session_id, &frame).await;
        }
        Err(e) => {
            let mut frame =
                OutboundFrame::failure(FrameType::AnalyzeDeltaPeep, 500, format!("Analysis failed: {e}"), now_iso8601());
            frame.analysis_id = Some(analysis_id);
            deliver(state, session_id, &frame).await;
        }
    }
}

/// Fires without blocking the session loop, matching
/// `asyncio.create_task(handle_deepseek_request(...))` upstream.
fn handle_deepseek_chat(state: &AppState, session_id: SessionId, message: String) {
    let Some(chat) = state.chat.clone() else {
        return;
    };
    let state = state.clone();
    tokio::spawn(async move {
        let frame = match chat.send(&message).await {
            Ok(answer) => OutboundFrame::success(
                FrameType::DeepseekResponse,
                "Success",
                serde_json::Value::String(answer),
                now_iso8601(),
            ),
            Err(e) => {
                warn!(session_id, error = %e, "deepseek chat request failed");
                OutboundFrame::failure(FrameType::DeepseekResponse, 500, format!("chat request failed: {e}"), now_iso8601())
            }
        };
        deliver(&state, session_id, &frame).await;
    });
}

async fn handle_store_peep_snapshot(
    state: &AppState,
    session_id: SessionId,
    patient_id: i64,
    record_time: String,
    avg_current_peep: Option<f64>,
    avg_recommended_peep: Option<f64>,
) {
    let parsed = record_time.parse::<chrono::DateTime<Utc>>();
    let Ok(record_time) = parsed else {
        let frame = OutboundFrame::failure(FrameType::PeepHistory, 400, "invalid record_time", now_iso8601());
        deliver(state, session_id, &frame).await;
        return;
    };

    if avg_current_peep.is_some() || avg_recommended_peep.is_some() {
        if let Err(e) = crate::repo::snapshots::upsert_snapshot(
            &state.pool,
            patient_id,
            record_time,
            avg_current_peep,
            avg_recommended_peep,
        )
        .await
        {
            warn!(session_id, error = %e, "failed to store peep snapshot");
            let frame = OutboundFrame::failure(FrameType::PeepHistory, 500, "failed to store snapshot", now_iso8601());
            deliver(state, session_id, &frame).await;
            return;
        }
    }

    match crate::repo::snapshots::history(&state.pool, patient_id).await {
        Ok(points) => {
            let times: Vec<String> = points.iter().map(|p| p.record_time.clone()).collect();
            let current: Vec<Option<f64>> = points.iter().map(|p| p.current_peep).collect();
            let recommended: Vec<Option<f64>> = points.iter().map(|p| p.recommended_peep).collect();
            let data = serde_json::json!({ "times": times, "current": current, "recommended": recommended });
            let frame = OutboundFrame::success(FrameType::PeepHistory, "Snapshot stored", data, now_iso8601());
            deliver(state, session_id, &frame).await;
        }
        Err(e) => {
            warn!(session_id, error = %e, "failed to fetch peep history");
            let frame = OutboundFrame::failure(FrameType::PeepHistory, 500, "failed to fetch peep history", now_iso8601());
            deliver(state, session_id, &frame).await;
        }
    }
}
