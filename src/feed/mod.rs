use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use thiserror::Error;
use tracing::debug;

pub mod http;
pub mod mock;

/// One vehicle entry as published by the positional feed.
///
/// Every field is optional: completeness is checked when the record is
/// considered for a tracker, not when it is decoded, so one bad record never
/// invalidates the batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub route_short_name: Option<String>,
    /// GPS report time, ISO 8601.
    #[serde(default)]
    pub generated: Option<String>,
}

/// Top-level feed document. Other top-level fields are ignored.
///
/// Entries stay raw until [`decode_batch`] converts them one by one.
#[derive(Debug, Deserialize)]
pub struct FeedPayload {
    pub vehicles: Vec<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("http status {0}")]
    Status(u16),
    #[error("failed to decode feed: {0}")]
    Decode(String),
}

/// Source of vehicle position batches.
pub trait VehicleFeed: Send + Sync {
    fn fetch_vehicle_batch(&self)
    -> impl Future<Output = Result<Vec<VehicleRecord>, FetchError>> + Send;
}

/// Decode a raw feed body into its vehicle records.
///
/// Only a body that is not a `{"vehicles": [...]}` document is an error.
/// Entries that do not decode as a record are skipped.
pub fn decode_batch(body: &[u8]) -> Result<Vec<VehicleRecord>, FetchError> {
    let payload: FeedPayload =
        serde_json::from_slice(body).map_err(|err| FetchError::Decode(err.to_string()))?;

    let mut records = Vec::with_capacity(payload.vehicles.len());
    for (position, entry) in payload.vehicles.into_iter().enumerate() {
        match serde_json::from_value::<VehicleRecord>(entry) {
            Ok(record) => records.push(record),
            Err(err) => debug!(position, error = %err, "Skipping malformed vehicle entry"),
        }
    }
    Ok(records)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Integer(i64),
    Float(f64),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<StringOrNumber> = Option::deserialize(deserializer)?;
    Ok(value.map(|value| match value {
        StringOrNumber::String(s) => s,
        StringOrNumber::Integer(n) => n.to_string(),
        StringOrNumber::Float(n) => n.to_string(),
    }))
}
