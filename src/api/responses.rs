use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Starting,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub vehicles_indexed: usize,
    pub timestamp: String,
}

/// Vehicle and counters of an active event.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct EventAttributes {
    pub vehicle_id: String,
    pub route_short_name: String,
    pub lat: f64,
    pub lon: f64,
    pub generated: String,
    pub distance: String,
    pub shots_in: u32,
    pub shots_out: u32,
    pub summary: String,
}

/// Per-tracker event sensor: `state` is the route of the active event.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct EventSensorResponse {
    pub tracker_id: String,
    pub name: String,
    pub state: Option<String>,
    pub attributes: Option<EventAttributes>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EventsResponse {
    pub events: Vec<EventSensorResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LastRouteResponse {
    pub tracker_id: String,
    pub name: String,
    pub state: String,
    pub available: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct LocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LocationAcceptedResponse {
    pub tracker_id: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    UnknownTracker,
    MissingCoordinates,
    DriverUnavailable,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn health_response_omits_missing_tick() {
        let response = HealthResponse {
            status: HealthStatus::Starting,
            last_tick: None,
            last_error: None,
            vehicles_indexed: 0,
            timestamp: "2026-10-16T10:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health response");
        assert_eq!(
            value,
            json!({
                "status": "starting",
                "vehicles_indexed": 0,
                "timestamp": "2026-10-16T10:00:00Z"
            })
        );
    }

    #[test]
    fn idle_event_sensor_serializes_nulls() {
        let response = EventSensorResponse {
            tracker_id: "device_tracker.phone".to_string(),
            name: "Phone".to_string(),
            state: None,
            attributes: None,
        };

        let value = serde_json::to_value(response).expect("serialize event sensor");
        assert_eq!(
            value,
            json!({
                "tracker_id": "device_tracker.phone",
                "name": "Phone",
                "state": null,
                "attributes": null
            })
        );
    }

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = ErrorResponse {
            error_code: ApiErrorCode::MissingCoordinates,
            error_message: "latitude and longitude are required".to_string(),
            timestamp: "2026-10-16T10:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "MISSING_COORDINATES",
                "error_message": "latitude and longitude are required",
                "timestamp": "2026-10-16T10:00:00Z"
            })
        );
    }

    #[test]
    fn location_request_tolerates_missing_fields() {
        let request: LocationRequest =
            serde_json::from_value(json!({"latitude": 54.35})).expect("deserialize request");
        assert_eq!(request.latitude, Some(54.35));
        assert_eq!(request.longitude, None);
    }
}
