//! One configured integration: an engine and the feed that refreshes it.
//!
//! The coordinator is the only writer of its engine. Every tick goes through
//! [`Coordinator::advance_tick`]; a failed fetch leaves the vehicle index and
//! every tracker's event untouched so the next tick starts from valid data.

use crate::engine::{EngineSettings, EvaluationSummary, ProximityEngine, UnknownTracker};
use crate::error::AppError;
use crate::feed::VehicleFeed;
use crate::finder::TrackerLocation;
use crate::index::VehicleIndex;
use crate::state::PresenceSnapshot;
use time::OffsetDateTime;
use tracing::{info, warn};

/// What caused a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickTrigger {
    Timer,
    LocationChanged {
        tracker_id: String,
        location: TrackerLocation,
    },
}

impl TickTrigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::LocationChanged { .. } => "location_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub vehicles_indexed: usize,
    pub summary: EvaluationSummary,
}

#[derive(Debug)]
pub struct Coordinator<F> {
    engine: ProximityEngine,
    feed: F,
}

impl<F: VehicleFeed> Coordinator<F> {
    pub fn new(settings: EngineSettings, feed: F) -> Self {
        Self {
            engine: ProximityEngine::new(settings),
            feed,
        }
    }

    pub fn engine(&self) -> &ProximityEngine {
        &self.engine
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Record a tracker location without running a tick.
    pub fn apply_location(
        &mut self,
        tracker_id: &str,
        location: TrackerLocation,
    ) -> Result<(), UnknownTracker> {
        self.engine.update_location(tracker_id, location)
    }

    /// Run one refresh-and-evaluate cycle.
    pub async fn advance_tick(
        &mut self,
        trigger: TickTrigger,
        now: OffsetDateTime,
    ) -> Result<TickReport, AppError> {
        let kind = trigger.kind();
        if let TickTrigger::LocationChanged {
            tracker_id,
            location,
        } = trigger
        {
            self.apply_location(&tracker_id, location)?;
        }

        let batch = match self.feed.fetch_vehicle_batch().await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(trigger = kind, error = %err, "Vehicle fetch failed, keeping previous data");
                return Err(err.into());
            }
        };

        self.engine.replace_index(VehicleIndex::from_batch(batch));
        let vehicles_indexed = self.engine.index().len();
        info!(trigger = kind, vehicles = vehicles_indexed, "Fetched vehicle positions");

        let summary = self.engine.evaluate(now);
        Ok(TickReport {
            vehicles_indexed,
            summary,
        })
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            events: self.engine.current_events().clone(),
            last_routes: self.engine.last_routes().clone(),
            vehicles_indexed: self.engine.index().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventThresholds;
    use crate::feed::mock::{MockFetch, MockVehicleFeed};
    use crate::feed::{FetchError, VehicleRecord};
    use crate::finder::FilterConfig;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-10-16 10:00:00 UTC);

    fn settings() -> EngineSettings {
        EngineSettings {
            trackers: vec!["phone".to_string()],
            tracker_names: HashMap::new(),
            radius_meters: 50.0,
            thresholds: EventThresholds {
                shots_in: 2,
                shots_out: 3,
            },
            filter: FilterConfig::new(HashSet::new(), Duration::from_secs(120)),
        }
    }

    fn bus(id: &str) -> VehicleRecord {
        VehicleRecord {
            vehicle_id: Some(id.to_string()),
            lat: Some(54.352),
            lon: Some(18.6466),
            route_short_name: Some("5".to_string()),
            generated: Some("2026-10-16T09:59:45Z".to_string()),
        }
    }

    fn phone_moved() -> TickTrigger {
        TickTrigger::LocationChanged {
            tracker_id: "phone".to_string(),
            location: TrackerLocation::new(54.352, 18.6466),
        }
    }

    #[tokio::test]
    async fn location_trigger_runs_full_tick() -> Result<(), AppError> {
        let feed = MockVehicleFeed::with_batch(vec![bus("A"), bus("B")]);
        let mut coordinator = Coordinator::new(settings(), feed);

        let report = coordinator.advance_tick(phone_moved(), NOW).await?;

        assert_eq!(report.vehicles_indexed, 2);
        assert_eq!(report.summary.started, 1);
        let snapshot = coordinator.snapshot();
        assert_eq!(
            snapshot.events.get("phone").map(|e| e.vehicle_id.as_str()),
            Some("A")
        );
        assert_eq!(snapshot.last_route("phone"), "phone - 5");
        Ok(())
    }

    #[tokio::test]
    async fn failed_fetch_keeps_index_and_events() -> Result<(), AppError> {
        let feed = MockVehicleFeed::new(vec![
            MockFetch::Batch(vec![bus("A")]),
            MockFetch::Timeout,
            MockFetch::TransportError,
            MockFetch::DecodeError,
        ]);
        let mut coordinator = Coordinator::new(settings(), feed);
        coordinator.advance_tick(phone_moved(), NOW).await?;
        let index_before = coordinator.engine().index().clone();
        let events_before = coordinator.engine().current_events().clone();

        for _ in 0..3 {
            let result = coordinator.advance_tick(TickTrigger::Timer, NOW).await;
            assert!(matches!(result, Err(AppError::Fetch(_))));
        }

        assert_eq!(coordinator.engine().index(), &index_before);
        assert_eq!(coordinator.engine().current_events(), &events_before);
        assert_eq!(coordinator.feed().fetch_count(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn location_is_kept_even_when_fetch_fails() {
        let feed = MockVehicleFeed::new(vec![MockFetch::Status(502)]);
        let mut coordinator = Coordinator::new(settings(), feed);

        let result = coordinator.advance_tick(phone_moved(), NOW).await;

        assert!(matches!(
            result,
            Err(AppError::Fetch(FetchError::Status(502)))
        ));
        assert_eq!(
            coordinator.engine().location("phone"),
            Some(TrackerLocation::new(54.352, 18.6466))
        );
        assert!(coordinator.engine().current_events().is_empty());
    }

    #[tokio::test]
    async fn unknown_tracker_is_rejected_before_fetch() {
        let mut coordinator = Coordinator::new(settings(), MockVehicleFeed::default());

        let result = coordinator
            .advance_tick(
                TickTrigger::LocationChanged {
                    tracker_id: "tablet".to_string(),
                    location: TrackerLocation::new(54.0, 18.0),
                },
                NOW,
            )
            .await;

        assert!(matches!(result, Err(AppError::UnknownTracker(_))));
        assert_eq!(coordinator.feed().fetch_count(), 0);
    }

    #[tokio::test]
    async fn empty_batch_counts_as_out_of_radius() -> Result<(), AppError> {
        let feed = MockVehicleFeed::new(vec![
            MockFetch::Batch(vec![bus("A")]),
            MockFetch::Batch(Vec::new()),
        ]);
        let mut coordinator = Coordinator::new(settings(), feed);
        coordinator.advance_tick(phone_moved(), NOW).await?;

        coordinator.advance_tick(TickTrigger::Timer, NOW).await?;

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.vehicles_indexed, 0);
        assert_eq!(snapshot.events.get("phone").map(|e| e.shots_out), Some(1));
        Ok(())
    }
}
