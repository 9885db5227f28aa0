use crate::api::ApiContext;
use crate::api::responses::{
    ApiErrorCode, ErrorResponse, EventAttributes, EventSensorResponse, EventsResponse,
    HealthResponse, HealthStatus, LastRouteResponse, LocationAcceptedResponse, LocationRequest,
};
use crate::coordinator::TickTrigger;
use crate::engine::TrackerEventState;
use crate::finder::TrackerLocation;
use crate::state::{AppState, TickStatus};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format timestamp");
        FALLBACK_TIMESTAMP.to_string()
    })
}

fn error_response<T>(
    status: StatusCode,
    error_code: ApiErrorCode,
    message: impl Into<String>,
    now: OffsetDateTime,
) -> ApiResponse<T> {
    ApiResponse::Error {
        status,
        body: ErrorResponse {
            error_code,
            error_message: message.into(),
            timestamp: format_timestamp(now),
        },
    }
}

fn internal_error<T>(message: &str, now: OffsetDateTime) -> ApiResponse<T> {
    error!(message = message, "Internal error while handling request");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiErrorCode::InternalError,
        INTERNAL_ERROR_MESSAGE,
        now,
    )
}

fn unknown_tracker<T>(tracker_id: &str, now: OffsetDateTime) -> ApiResponse<T> {
    error_response(
        StatusCode::NOT_FOUND,
        ApiErrorCode::UnknownTracker,
        format!("tracker {tracker_id} is not configured"),
        now,
    )
}

pub async fn get_health(State(context): State<ApiContext>) -> impl IntoResponse {
    build_health_response(&context.state, OffsetDateTime::now_utc())
}

pub async fn get_events(State(context): State<ApiContext>) -> impl IntoResponse {
    build_events_response(&context.state, OffsetDateTime::now_utc())
}

pub async fn get_tracker_event(
    State(context): State<ApiContext>,
    Path(tracker_id): Path<String>,
) -> impl IntoResponse {
    build_tracker_event_response(&context.state, &tracker_id, OffsetDateTime::now_utc())
}

pub async fn get_last_route(
    State(context): State<ApiContext>,
    Path(tracker_id): Path<String>,
) -> impl IntoResponse {
    build_last_route_response(&context.state, &tracker_id, OffsetDateTime::now_utc())
}

pub async fn post_location(
    State(context): State<ApiContext>,
    Path(tracker_id): Path<String>,
    Json(request): Json<LocationRequest>,
) -> impl IntoResponse {
    forward_location(
        &context.state,
        &context.triggers,
        tracker_id,
        request,
        OffsetDateTime::now_utc(),
    )
    .await
}

fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    now: OffsetDateTime,
) -> ApiResponse<HealthResponse> {
    let Ok(guard) = state.read() else {
        return internal_error("state lock poisoned while reading last tick", now);
    };
    let last_tick = guard.last_tick().cloned();
    let vehicles_indexed = guard.snapshot().vehicles_indexed;
    drop(guard);

    let (status, code, last_error) = match &last_tick {
        None => (HealthStatus::Starting, StatusCode::SERVICE_UNAVAILABLE, None),
        Some(outcome) => match &outcome.status {
            TickStatus::Ok => (HealthStatus::Ok, StatusCode::OK, None),
            TickStatus::Failed { reason } => {
                (HealthStatus::Degraded, StatusCode::OK, Some(reason.clone()))
            }
        },
    };

    ApiResponse::Success {
        status: code,
        body: HealthResponse {
            status,
            last_tick: last_tick.map(|outcome| format_timestamp(outcome.finished_at)),
            last_error,
            vehicles_indexed,
            timestamp: format_timestamp(now),
        },
    }
}

fn event_sensor(tracker_id: &str, name: &str, event: Option<&TrackerEventState>) -> EventSensorResponse {
    EventSensorResponse {
        tracker_id: tracker_id.to_string(),
        name: name.to_string(),
        state: event.map(|e| e.vehicle.route_id.clone()),
        attributes: event.map(|e| EventAttributes {
            vehicle_id: e.vehicle_id.clone(),
            route_short_name: e.vehicle.route_id.clone(),
            lat: e.vehicle.latitude,
            lon: e.vehicle.longitude,
            generated: format_timestamp(e.vehicle.reported_at),
            distance: format!("{:.2}m", e.distance_meters),
            shots_in: e.shots_in,
            shots_out: e.shots_out,
            summary: e.summary.clone(),
        }),
    }
}

fn build_events_response(
    state: &Arc<RwLock<AppState>>,
    now: OffsetDateTime,
) -> ApiResponse<EventsResponse> {
    let Ok(guard) = state.read() else {
        return internal_error("state lock poisoned while reading events", now);
    };
    let events = guard
        .snapshot()
        .events
        .iter()
        .map(|(tracker_id, event)| {
            event_sensor(tracker_id, guard.tracker_name(tracker_id), Some(event))
        })
        .collect();

    ApiResponse::Success {
        status: StatusCode::OK,
        body: EventsResponse {
            events,
            timestamp: format_timestamp(now),
        },
    }
}

fn build_tracker_event_response(
    state: &Arc<RwLock<AppState>>,
    tracker_id: &str,
    now: OffsetDateTime,
) -> ApiResponse<EventSensorResponse> {
    let Ok(guard) = state.read() else {
        return internal_error("state lock poisoned while reading tracker event", now);
    };
    if !guard.is_tracked(tracker_id) {
        return unknown_tracker(tracker_id, now);
    }

    ApiResponse::Success {
        status: StatusCode::OK,
        body: event_sensor(
            tracker_id,
            guard.tracker_name(tracker_id),
            guard.snapshot().events.get(tracker_id),
        ),
    }
}

fn build_last_route_response(
    state: &Arc<RwLock<AppState>>,
    tracker_id: &str,
    now: OffsetDateTime,
) -> ApiResponse<LastRouteResponse> {
    let Ok(guard) = state.read() else {
        return internal_error("state lock poisoned while reading last route", now);
    };
    if !guard.is_tracked(tracker_id) {
        return unknown_tracker(tracker_id, now);
    }

    ApiResponse::Success {
        status: StatusCode::OK,
        body: LastRouteResponse {
            tracker_id: tracker_id.to_string(),
            name: guard.tracker_name(tracker_id).to_string(),
            state: guard.snapshot().last_route(tracker_id).to_string(),
            available: guard.last_update_success(),
        },
    }
}

fn tracker_is_configured(state: &Arc<RwLock<AppState>>, tracker_id: &str) -> Option<bool> {
    state.read().ok().map(|guard| guard.is_tracked(tracker_id))
}

async fn forward_location(
    state: &Arc<RwLock<AppState>>,
    triggers: &mpsc::Sender<TickTrigger>,
    tracker_id: String,
    request: LocationRequest,
    now: OffsetDateTime,
) -> ApiResponse<LocationAcceptedResponse> {
    match tracker_is_configured(state, &tracker_id) {
        Some(true) => {}
        Some(false) => return unknown_tracker(&tracker_id, now),
        None => return internal_error("state lock poisoned while checking tracker", now),
    }

    let (Some(latitude), Some(longitude)) = (request.latitude, request.longitude) else {
        warn!(tracker_id = %tracker_id, "Location update has no latitude or longitude");
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiErrorCode::MissingCoordinates,
            "latitude and longitude are required",
            now,
        );
    };

    let trigger = TickTrigger::LocationChanged {
        tracker_id: tracker_id.clone(),
        location: TrackerLocation::new(latitude, longitude),
    };
    if triggers.send(trigger).await.is_err() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::DriverUnavailable,
            "refresh driver is not running",
            now,
        );
    }

    ApiResponse::Success {
        status: StatusCode::ACCEPTED,
        body: LocationAcceptedResponse {
            tracker_id,
            timestamp: format_timestamp(now),
        },
    }
}
