//! Shared application state handed to every Axum handler and background
//! task. Grounded on the teacher's `state.rs` (`AppState` as a `Clone`
//! bundle of `Arc`s and a `PgPool`, passed via `State<AppState>`).

use std::sync::Arc;

use sqlx::PgPool;

use telemetry_core::activity::ActivityTracker;
use telemetry_core::cache::SampleCache;
use telemetry_core::event::DispatchQueues;
use telemetry_core::registry::SubscriptionRegistry;
use ui_log::UiLogger;

use crate::bridges::analysis::AnalysisBridge;
use crate::bridges::chat::ChatBridge;
use crate::session::registry::SessionTable;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: Arc<SampleCache>,
    pub registry: Arc<SubscriptionRegistry>,
    pub activity: Arc<ActivityTracker>,
    pub queues: Arc<DispatchQueues>,
    pub sessions: Arc<SessionTable>,
    pub analysis: Arc<AnalysisBridge>,
    pub chat: Option<Arc<ChatBridge>>,
    pub sampling_rate: u32,
    pub activity_log: Arc<UiLogger<String>>,
}
