use crate::engine::{TrackerEventState, UNKNOWN_ROUTE};
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use tokio::sync::watch;

/// Read-side copy of the engine after a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceSnapshot {
    pub events: BTreeMap<String, TrackerEventState>,
    pub last_routes: HashMap<String, String>,
    pub vehicles_indexed: usize,
}

impl PresenceSnapshot {
    pub fn last_route(&self, tracker_id: &str) -> &str {
        self.last_routes
            .get(tracker_id)
            .map_or(UNKNOWN_ROUTE, String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    Ok,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub finished_at: OffsetDateTime,
    pub status: TickStatus,
}

impl TickOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TickStatus::Ok)
    }
}

#[derive(Debug)]
pub struct AppState {
    trackers: Vec<String>,
    tracker_names: HashMap<String, String>,
    snapshot: PresenceSnapshot,
    snapshot_tx: watch::Sender<PresenceSnapshot>,
    last_tick: Option<TickOutcome>,
    last_tick_tx: watch::Sender<Option<TickOutcome>>,
}

impl AppState {
    pub fn new(trackers: Vec<String>, tracker_names: HashMap<String, String>) -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(PresenceSnapshot::default());
        let (last_tick_tx, _last_tick_rx) = watch::channel(None);
        Self {
            trackers,
            tracker_names,
            snapshot: PresenceSnapshot::default(),
            snapshot_tx,
            last_tick: None,
            last_tick_tx,
        }
    }

    pub fn is_tracked(&self, tracker_id: &str) -> bool {
        self.trackers.iter().any(|id| id == tracker_id)
    }

    pub fn tracker_name<'a>(&'a self, tracker_id: &'a str) -> &'a str {
        self.tracker_names
            .get(tracker_id)
            .map_or(tracker_id, String::as_str)
    }

    pub fn snapshot(&self) -> &PresenceSnapshot {
        &self.snapshot
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Publishes even when nobody is subscribed.
    pub fn set_snapshot(&mut self, snapshot: PresenceSnapshot) {
        self.snapshot = snapshot.clone();
        self.snapshot_tx.send_replace(snapshot);
    }

    pub fn last_tick(&self) -> Option<&TickOutcome> {
        self.last_tick.as_ref()
    }

    pub fn subscribe_last_tick(&self) -> watch::Receiver<Option<TickOutcome>> {
        self.last_tick_tx.subscribe()
    }

    pub fn set_last_tick(&mut self, outcome: TickOutcome) {
        self.last_tick = Some(outcome.clone());
        self.last_tick_tx.send_replace(Some(outcome));
    }

    /// Whether the most recent tick refreshed its data. False before the first tick.
    pub fn last_update_success(&self) -> bool {
        self.last_tick.as_ref().is_some_and(TickOutcome::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn state() -> AppState {
        AppState::new(
            vec!["phone".to_string()],
            HashMap::from([("phone".to_string(), "Alex".to_string())]),
        )
    }

    #[test]
    fn set_snapshot_updates_state_and_watch() {
        let mut state = state();
        let receiver = state.subscribe_snapshot();
        let snapshot = PresenceSnapshot {
            events: BTreeMap::new(),
            last_routes: HashMap::from([("phone".to_string(), "Alex - 5".to_string())]),
            vehicles_indexed: 12,
        };

        state.set_snapshot(snapshot.clone());

        assert_eq!(state.snapshot(), &snapshot);
        assert_eq!(*receiver.borrow(), snapshot);
        assert_eq!(state.snapshot().last_route("phone"), "Alex - 5");
        assert_eq!(state.snapshot().last_route("watch"), UNKNOWN_ROUTE);
    }

    #[test]
    fn last_update_success_follows_last_tick() {
        let mut state = state();
        let receiver = state.subscribe_last_tick();
        assert!(!state.last_update_success());

        state.set_last_tick(TickOutcome {
            finished_at: datetime!(2026-10-16 10:00:00 UTC),
            status: TickStatus::Ok,
        });
        assert!(state.last_update_success());
        assert!(receiver.borrow().as_ref().is_some_and(TickOutcome::is_success));

        state.set_last_tick(TickOutcome {
            finished_at: datetime!(2026-10-16 10:03:00 UTC),
            status: TickStatus::Failed {
                reason: "http status 502".to_string(),
            },
        });
        assert!(!state.last_update_success());
    }

    #[test]
    fn tracker_lookup_and_names() {
        let state = state();
        assert!(state.is_tracked("phone"));
        assert!(!state.is_tracked("watch"));
        assert_eq!(state.tracker_name("phone"), "Alex");
        assert_eq!(state.tracker_name("watch"), "watch");
    }
}
