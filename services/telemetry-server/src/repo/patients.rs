//! Patient directory and record storage. This is the explicitly
//! out-of-scope collaborator spec.md §1 calls "relational storage of
//! patient records" — the core only needs a thin repo so the HTTP surface
//! (§6) and the `get_patients` action (§4.6) have something to call.
//! Grounded on `fetch_patients`/`fetch_patient_by_id`/`update_patient_info`
//! in `original_source/backend/app/database/queries.py`, adopting the
//! later, fuller column set per spec.md §9's Open Question 4.

use sqlx::PgPool;

use telemetry_protocol::{PatientDetail, PatientSummary, PatientUpdate};

pub async fn fetch_patients(pool: &PgPool) -> Result<Vec<PatientSummary>, sqlx::Error> {
    let rows = sqlx::query!("SELECT patient_id, name FROM patient_info ORDER BY patient_id ASC")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| PatientSummary { patient_id: r.patient_id, name: r.name })
        .collect())
}

pub async fn fetch_patient_by_id(pool: &PgPool, patient_id: i64) -> Result<Option<PatientDetail>, sqlx::Error> {
    let row = sqlx::query!(
        r#"SELECT patient_id, name, age, gender, admission_date, ethnicity,
                  marital_status, birth_date, admission_count, notes
           FROM patient_info WHERE patient_id = $1"#,
        patient_id
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| PatientDetail {
        patient_id: r.patient_id,
        name: r.name,
        age: r.age,
        gender: r.gender,
        admission_date: r.admission_date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
        ethnicity: r.ethnicity,
        marital_status: r.marital_status,
        birth_date: r.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
        admission_count: r.admission_count,
        notes: r.notes.unwrap_or_default(),
    }))
}

/// Returns the number of rows affected — zero means "no such patient",
/// matching the original's `cursor.rowcount` check before raising 404.
pub async fn update_patient_info(pool: &PgPool, patient_id: i64, update: &PatientUpdate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query!(
        r#"UPDATE patient_info SET
               name = COALESCE($1, name),
               gender = COALESCE($2, gender),
               age = COALESCE($3, age),
               admission_date = COALESCE($4, admission_date),
               ethnicity = COALESCE($5, ethnicity),
               marital_status = COALESCE($6, marital_status),
               birth_date = COALESCE($7, birth_date),
               admission_count = COALESCE($8, admission_count),
               notes = COALESCE($9, notes)
           WHERE patient_id = $10"#,
        update.name,
        update.gender,
        update.age,
        update.admission_date.as_deref().and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok()),
        update.ethnicity,
        update.marital_status,
        update.birth_date.as_deref().and_then(|s| s.parse::<chrono::NaiveDate>().ok()),
        update.admission_count,
        update.notes,
        patient_id,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter<'a> {
    All,
    ByType { record_type: &'a str, start_date: Option<&'a str>, end_date: Option<&'a str> },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PatientRecord {
    pub record_id: i64,
    pub patient_id: i64,
    pub record_type: String,
    pub recorded_at: String,
    pub data: serde_json::Value,
}

pub async fn fetch_patient_records(pool: &PgPool, patient_id: i64, filter: RecordFilter<'_>) -> Result<Vec<PatientRecord>, sqlx::Error> {
    let rows = match filter {
        RecordFilter::All => {
            sqlx::query!(
                r#"SELECT record_id, patient_id, record_type, recorded_at, data
                   FROM patient_records WHERE patient_id = $1 ORDER BY recorded_at ASC"#,
                patient_id
            )
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|r| PatientRecord {
                record_id: r.record_id,
                patient_id: r.patient_id,
                record_type: r.record_type,
                recorded_at: r.recorded_at.to_rfc3339(),
                data: r.data,
            })
            .collect()
        }
        RecordFilter::ByType { record_type, start_date, end_date } => {
            sqlx::query!(
                r#"SELECT record_id, patient_id, record_type, recorded_at, data
                   FROM patient_records
                   WHERE patient_id = $1 AND record_type = $2
                     AND ($3::date IS NULL OR recorded_at >= $3)
                     AND ($4::date IS NULL OR recorded_at <= $4)
                   ORDER BY recorded_at ASC"#,
                patient_id,
                record_type,
                start_date.and_then(|s| s.parse::<chrono::NaiveDate>().ok()),
                end_date.and_then(|s| s.parse::<chrono::NaiveDate>().ok()),
            )
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|r| PatientRecord {
                record_id: r.record_id,
                patient_id: r.patient_id,
                record_type: r.record_type,
                recorded_at: r.recorded_at.to_rfc3339(),
                data: r.data,
            })
            .collect()
        }
    };
    Ok(rows)
}

pub async fn fetch_patient_record_detail(pool: &PgPool, record_id: i64) -> Result<Option<PatientRecord>, sqlx::Error> {
    let row = sqlx::query!(
        "SELECT record_id, patient_id, record_type, recorded_at, data FROM patient_records WHERE record_id = $1",
        record_id
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| PatientRecord {
        record_id: r.record_id,
        patient_id: r.patient_id,
        record_type: r.record_type,
        recorded_at: r.recorded_at.to_rfc3339(),
        data: r.data,
    }))
}
