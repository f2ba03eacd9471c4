//! Postgres pool construction and migration runner. Grounded on the
//! teacher's `db.rs` verbatim.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> PgPool {
    PgPoolOptions::new().max_connections(10).connect(database_url).await.expect("failed to connect to Postgres")
}

pub async fn run_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations").run(pool).await.expect("failed to run database migrations")
}
