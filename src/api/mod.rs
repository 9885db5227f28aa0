use crate::coordinator::TickTrigger;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

pub mod handlers;
pub mod responses;

/// Shared by every handler: the published state and the driver's trigger queue.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub state: Arc<RwLock<AppState>>,
    pub triggers: mpsc::Sender<TickTrigger>,
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/events", get(handlers::get_events))
        .route("/api/trackers/{tracker_id}/event", get(handlers::get_tracker_event))
        .route(
            "/api/trackers/{tracker_id}/last-route",
            get(handlers::get_last_route),
        )
        .route(
            "/api/trackers/{tracker_id}/location",
            post(handlers::post_location),
        )
        .with_state(context)
}
