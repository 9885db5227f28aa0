//! Per-tracker presence detection.
//!
//! Each tracker runs a small hysteresis machine fed with the nearest eligible
//! vehicle of every tick. An event starts on the first in-radius observation,
//! counts consecutive confirmations of the same vehicle (`shots_in`) and ends
//! after `shots_out` consecutive ticks without that vehicle in radius.

use crate::finder::{ClosestVehicle, FilterConfig, TrackerLocation, VehiclePosition, find_closest};
use crate::index::VehicleIndex;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

pub const UNKNOWN_ROUTE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventThresholds {
    /// Exposed to observers only; an event starts on the first in-radius tick
    /// whatever this value is.
    pub shots_in: u32,
    /// Consecutive out-of-radius ticks that end an event.
    pub shots_out: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerEventState {
    pub vehicle_id: String,
    pub shots_in: u32,
    pub shots_out: u32,
    pub vehicle: VehiclePosition,
    /// Distance at the last in-radius observation.
    pub distance_meters: f64,
    pub summary: String,
}

impl TrackerEventState {
    fn detected(tracker_name: &str, closest: &ClosestVehicle, shots_in: u32) -> Self {
        Self {
            vehicle_id: closest.vehicle.id.clone(),
            shots_in,
            shots_out: 0,
            vehicle: closest.vehicle.clone(),
            distance_meters: closest.distance_meters,
            summary: format!(
                "Tracker {tracker_name} is near route {}",
                closest.vehicle.route_id
            ),
        }
    }
}

/// Outcome of one tick for one tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// No event before, none now.
    Idle,
    Started(TrackerEventState),
    Continued(TrackerEventState),
    /// A different vehicle came in radius; the old event is dropped without grace.
    Replaced {
        previous_vehicle_id: String,
        state: TrackerEventState,
    },
    Grace(TrackerEventState),
    Ended {
        vehicle_id: String,
    },
}

impl Transition {
    pub fn into_state(self) -> Option<TrackerEventState> {
        match self {
            Self::Started(state)
            | Self::Continued(state)
            | Self::Grace(state)
            | Self::Replaced { state, .. } => Some(state),
            Self::Idle | Self::Ended { .. } => None,
        }
    }
}

/// Next state of one tracker given its previous state and this tick's nearest vehicle.
pub fn advance(
    tracker_name: &str,
    previous: Option<&TrackerEventState>,
    closest: Option<&ClosestVehicle>,
    radius_meters: f64,
    thresholds: EventThresholds,
) -> Transition {
    let in_radius = closest.filter(|c| c.distance_meters <= radius_meters);

    match (previous, in_radius) {
        (None, None) => Transition::Idle,
        (None, Some(closest)) => {
            Transition::Started(TrackerEventState::detected(tracker_name, closest, 1))
        }
        (Some(previous), Some(closest)) if previous.vehicle_id == closest.vehicle.id => {
            Transition::Continued(TrackerEventState::detected(
                tracker_name,
                closest,
                previous.shots_in.saturating_add(1),
            ))
        }
        (Some(previous), Some(closest)) => Transition::Replaced {
            previous_vehicle_id: previous.vehicle_id.clone(),
            state: TrackerEventState::detected(tracker_name, closest, 1),
        },
        (Some(previous), None) => {
            let shots_out = previous.shots_out.saturating_add(1);
            if shots_out < thresholds.shots_out {
                Transition::Grace(TrackerEventState {
                    shots_out,
                    ..previous.clone()
                })
            } else {
                Transition::Ended {
                    vehicle_id: previous.vehicle_id.clone(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Configured trackers, in evaluation order.
    pub trackers: Vec<String>,
    /// Display names; trackers without one use their id.
    pub tracker_names: HashMap<String, String>,
    pub radius_meters: f64,
    pub thresholds: EventThresholds,
    pub filter: FilterConfig,
}

impl EngineSettings {
    pub fn tracker_name<'a>(&'a self, tracker_id: &'a str) -> &'a str {
        self.tracker_names
            .get(tracker_id)
            .map_or(tracker_id, String::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("tracker {0} is not configured")]
pub struct UnknownTracker(pub String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub started: usize,
    pub ended: usize,
    pub active: usize,
}

/// Owns every piece of state that survives between ticks.
#[derive(Debug, Clone)]
pub struct ProximityEngine {
    settings: EngineSettings,
    locations: HashMap<String, TrackerLocation>,
    index: VehicleIndex,
    events: BTreeMap<String, TrackerEventState>,
    last_routes: HashMap<String, String>,
}

impl ProximityEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            locations: HashMap::new(),
            index: VehicleIndex::new(),
            events: BTreeMap::new(),
            last_routes: HashMap::new(),
        }
    }

    pub fn is_tracked(&self, tracker_id: &str) -> bool {
        self.settings.trackers.iter().any(|id| id == tracker_id)
    }

    /// Record the latest location of a tracker. Last write wins.
    pub fn update_location(
        &mut self,
        tracker_id: &str,
        location: TrackerLocation,
    ) -> Result<(), UnknownTracker> {
        if !self.is_tracked(tracker_id) {
            return Err(UnknownTracker(tracker_id.to_string()));
        }
        debug!(
            tracker_id,
            latitude = location.latitude,
            longitude = location.longitude,
            "Location updated"
        );
        self.locations.insert(tracker_id.to_string(), location);
        Ok(())
    }

    pub fn location(&self, tracker_id: &str) -> Option<TrackerLocation> {
        self.locations.get(tracker_id).copied()
    }

    pub fn locations(&self) -> &HashMap<String, TrackerLocation> {
        &self.locations
    }

    /// Whether every configured tracker has reported a location.
    pub fn all_trackers_located(&self) -> bool {
        self.settings
            .trackers
            .iter()
            .all(|id| self.locations.contains_key(id))
    }

    pub fn index(&self) -> &VehicleIndex {
        &self.index
    }

    pub fn replace_index(&mut self, index: VehicleIndex) {
        self.index = index;
    }

    pub fn current_events(&self) -> &BTreeMap<String, TrackerEventState> {
        &self.events
    }

    pub fn last_route(&self, tracker_id: &str) -> &str {
        self.last_routes
            .get(tracker_id)
            .map_or(UNKNOWN_ROUTE, String::as_str)
    }

    pub fn last_routes(&self) -> &HashMap<String, String> {
        &self.last_routes
    }

    /// Run every located tracker through its state machine against the current index.
    pub fn evaluate(&mut self, now: OffsetDateTime) -> EvaluationSummary {
        let mut summary = EvaluationSummary::default();
        let mut next_events = BTreeMap::new();

        for tracker_id in &self.settings.trackers {
            let Some(location) = self.locations.get(tracker_id).copied() else {
                continue;
            };
            summary.evaluated += 1;

            let tracker_name = self.settings.tracker_name(tracker_id);
            let closest = find_closest(location, &self.index, &self.settings.filter, now);
            let transition = advance(
                tracker_name,
                self.events.get(tracker_id),
                closest.as_ref(),
                self.settings.radius_meters,
                self.settings.thresholds,
            );

            if let Transition::Started(state)
            | Transition::Continued(state)
            | Transition::Replaced { state, .. } = &transition
            {
                let label = format!("{tracker_name} - {}", state.vehicle.route_id);
                if self.last_routes.get(tracker_id) != Some(&label) {
                    info!(tracker_id, last_route = %label, "Last route updated");
                    self.last_routes.insert(tracker_id.clone(), label);
                }
            }

            match &transition {
                Transition::Idle => {}
                Transition::Started(state) => {
                    summary.started += 1;
                    info!(
                        tracker_id,
                        vehicle_id = %state.vehicle_id,
                        distance_m = state.distance_meters,
                        "New vehicle detected within radius"
                    );
                }
                Transition::Replaced {
                    previous_vehicle_id,
                    state,
                } => {
                    summary.started += 1;
                    info!(
                        tracker_id,
                        previous_vehicle_id = %previous_vehicle_id,
                        vehicle_id = %state.vehicle_id,
                        distance_m = state.distance_meters,
                        "Different vehicle detected within radius"
                    );
                }
                Transition::Continued(state) => {
                    debug!(tracker_id, shots_in = state.shots_in, "Vehicle still within radius");
                }
                Transition::Grace(state) => {
                    debug!(
                        tracker_id,
                        shots_out = state.shots_out,
                        "Vehicle out of radius, event continues"
                    );
                }
                Transition::Ended { vehicle_id } => {
                    summary.ended += 1;
                    info!(tracker_id, vehicle_id = %vehicle_id, "Event ended");
                }
            }

            if let Some(state) = transition.into_state() {
                next_events.insert(tracker_id.clone(), state);
            }
        }

        self.events = next_events;
        summary.active = self.events.len();
        info!(
            evaluated = summary.evaluated,
            active = summary.active,
            "Event processing complete"
        );
        summary
    }
}
