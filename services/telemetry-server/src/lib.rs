pub mod bridges;
pub mod cdc;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod http;
pub mod repo;
pub mod session;
pub mod state;

pub use state::AppState;

use axum::Router;

pub fn build_router(state: AppState) -> Router {
    http::router(state)
}
