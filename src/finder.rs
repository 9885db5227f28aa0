//! Nearest eligible vehicle lookup.
//!
//! A vehicle is eligible for a tracker when its record is complete, its route
//! passes the whitelist and its GPS report is within the staleness tolerance.
//! Among eligible vehicles the nearest one wins; on equal distance the one met
//! first in index order is kept.

use crate::feed::VehicleRecord;
use crate::geo::distance_meters;
use crate::index::VehicleIndex;
use std::collections::HashSet;
use std::time::Duration;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl TrackerLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn as_pair(self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// A complete vehicle record with its report time parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePosition {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub route_id: String,
    pub reported_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosestVehicle {
    pub vehicle: VehiclePosition,
    pub distance_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Accepted route ids; empty accepts every route.
    pub route_whitelist: HashSet<String>,
    pub max_staleness: Duration,
}

impl FilterConfig {
    pub fn new(route_whitelist: HashSet<String>, max_staleness: Duration) -> Self {
        Self {
            route_whitelist,
            max_staleness,
        }
    }

    fn accepts_route(&self, route_id: &str) -> bool {
        self.route_whitelist.is_empty() || self.route_whitelist.contains(route_id)
    }
}

/// Split a comma-separated whitelist, trimming items and dropping empty ones.
pub fn parse_route_whitelist(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|route| !route.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a feed timestamp. Timestamps without an offset are taken as UTC.
pub fn parse_report_time(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(parsed) => Ok(parsed),
        Err(_) => PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).map(PrimitiveDateTime::assume_utc),
    }
}

/// Why a record was not considered.
#[derive(Debug, Clone, PartialEq)]
enum Skip {
    Incomplete,
    RouteNotWhitelisted,
    UnparsableTimestamp(String),
    Stale(Duration),
}

fn eligible_position(
    record: &VehicleRecord,
    filter: &FilterConfig,
    now: OffsetDateTime,
) -> Result<VehiclePosition, Skip> {
    let (Some(id), Some(latitude), Some(longitude), Some(route_id), Some(generated)) = (
        record.vehicle_id.as_ref(),
        record.lat,
        record.lon,
        record.route_short_name.as_ref(),
        record.generated.as_deref(),
    ) else {
        return Err(Skip::Incomplete);
    };
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(Skip::Incomplete);
    }

    if !filter.accepts_route(route_id) {
        return Err(Skip::RouteNotWhitelisted);
    }

    let reported_at =
        parse_report_time(generated).map_err(|err| Skip::UnparsableTimestamp(err.to_string()))?;
    let age = (now - reported_at).unsigned_abs();
    if age > filter.max_staleness {
        return Err(Skip::Stale(age));
    }

    Ok(VehiclePosition {
        id: id.clone(),
        latitude,
        longitude,
        route_id: route_id.clone(),
        reported_at,
    })
}

/// Find the nearest eligible vehicle to `location`.
pub fn find_closest(
    location: TrackerLocation,
    index: &VehicleIndex,
    filter: &FilterConfig,
    now: OffsetDateTime,
) -> Option<ClosestVehicle> {
    if index.is_empty() {
        debug!("No vehicle data available");
        return None;
    }

    let mut closest: Option<ClosestVehicle> = None;
    for record in index.iter() {
        let vehicle = match eligible_position(record, filter, now) {
            Ok(vehicle) => vehicle,
            Err(Skip::UnparsableTimestamp(reason)) => {
                warn!(
                    vehicle_id = record.vehicle_id.as_deref().unwrap_or_default(),
                    error = %reason,
                    "Could not parse GPS timestamp"
                );
                continue;
            }
            Err(Skip::Stale(age)) => {
                debug!(
                    vehicle_id = record.vehicle_id.as_deref().unwrap_or_default(),
                    age_secs = age.as_secs(),
                    "Skipping vehicle with stale GPS report"
                );
                continue;
            }
            Err(skip) => {
                debug!(?skip, ?record, "Skipping vehicle");
                continue;
            }
        };

        let distance = distance_meters(location.as_pair(), (vehicle.latitude, vehicle.longitude));
        if closest
            .as_ref()
            .is_none_or(|current| distance < current.distance_meters)
        {
            closest = Some(ClosestVehicle {
                vehicle,
                distance_meters: distance,
            });
        }
    }

    debug!(
        vehicle_id = closest.as_ref().map(|c| c.vehicle.id.as_str()),
        distance_m = closest.as_ref().map(|c| c.distance_meters),
        "Closest vehicle resolved"
    );
    closest
}
