pub mod patients;
pub mod response;

use axum::routing::get;
use axum::Router;

use crate::session::ws_session_handler;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_session_handler))
        .route("/patients", get(patients::list_patients))
        .route("/patients/:patient_id", get(patients::get_patient).put(patients::update_patient))
        .route("/patients/:patient_id/records", get(patients::list_patient_records))
        .route("/patients/:patient_id/records/:record_id", get(patients::get_patient_record))
        .route("/patients/:patient_id/peep_history", get(patients::peep_history))
        .with_state(state)
}
