//! Storage for the Snapshot Store Bridge (spec.md §4.8): periodic peep
//! vitals snapshots keyed by `(patient_id, record_time)`. Grounded on
//! `repo::events::upsert_event`'s select-or-insert shape in the teacher,
//! adapted to `ON CONFLICT ... DO UPDATE` since duplicates on the key are
//! an update, not a conflict to reject (spec.md §4.8/§7).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use telemetry_protocol::PeepHistoryPoint;

pub async fn upsert_snapshot(
    pool: &PgPool,
    patient_id: i64,
    record_time: DateTime<Utc>,
    current_peep: Option<f64>,
    recommended_peep: Option<f64>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"INSERT INTO patient_vital_snapshot (patient_id, record_time, current_peep, recommended_peep)
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (patient_id, record_time) DO UPDATE
               SET current_peep = EXCLUDED.current_peep,
                   recommended_peep = EXCLUDED.recommended_peep"#,
        patient_id,
        record_time,
        current_peep,
        recommended_peep,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Restricted to the last 12 hours by server clock, ascending — spec.md §4.8.
pub async fn history(pool: &PgPool, patient_id: i64) -> Result<Vec<PeepHistoryPoint>, sqlx::Error> {
    let rows = sqlx::query!(
        r#"SELECT record_time, current_peep, recommended_peep
           FROM patient_vital_snapshot
           WHERE patient_id = $1 AND record_time >= now() - interval '12 hours'
           ORDER BY record_time ASC"#,
        patient_id
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| PeepHistoryPoint {
            record_time: r.record_time.to_rfc3339(),
            current_peep: r.current_peep,
            recommended_peep: r.recommended_peep,
        })
        .collect())
}
