//! Patient directory HTTP surface (spec.md §6). Grounded on the teacher's
//! `http/races.rs` handler shape, backed by `fetch_patients`/
//! `fetch_patient_by_id`/`update_patient_info` in `original_source/backend/
//! app/database/queries.py`.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use serde::Deserialize;

use crate::repo::patients::{self as repo, RecordFilter};
use crate::repo::snapshots;
use crate::state::AppState;

use super::response::{internal_error, not_found};

pub async fn list_patients(State(state): State<AppState>) -> impl IntoResponse {
    match repo::fetch_patients(&state.pool).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn get_patient(State(state): State<AppState>, Path(patient_id): Path<i64>) -> impl IntoResponse {
    match repo::fetch_patient_by_id(&state.pool, patient_id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => not_found(format!("patient {patient_id} not found")).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(update): Json<telemetry_protocol::PatientUpdate>,
) -> impl IntoResponse {
    match repo::update_patient_info(&state.pool, patient_id, &update).await {
        Ok(0) => not_found(format!("patient {patient_id} not found")).into_response(),
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub record_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn list_patient_records(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Query(query): Query<RecordsQuery>,
) -> impl IntoResponse {
    let filter = match &query.record_type {
        Some(record_type) => RecordFilter::ByType {
            record_type,
            start_date: query.start_date.as_deref(),
            end_date: query.end_date.as_deref(),
        },
        None => RecordFilter::All,
    };

    match repo::fetch_patient_records(&state.pool, patient_id, filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn get_patient_record(State(state): State<AppState>, Path(record_id): Path<i64>) -> impl IntoResponse {
    match repo::fetch_patient_record_detail(&state.pool, record_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found(format!("record {record_id} not found")).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn peep_history(State(state): State<AppState>, Path(patient_id): Path<i64>) -> impl IntoResponse {
    match snapshots::history(&state.pool, patient_id).await {
        Ok(points) => Json(points).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
