use crate::coordinator::{Coordinator, TickTrigger};
use crate::feed::VehicleFeed;
use crate::state::{AppState, TickOutcome, TickStatus};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const TRACKER_WAIT_ATTEMPTS: u32 = 10;
pub const TRACKER_WAIT_DELAY: Duration = Duration::from_secs(1);
pub const TRIGGER_QUEUE_CAPACITY: usize = 64;

/// Owns a coordinator and runs its ticks one at a time.
///
/// Ticks come from the interval timer and from the trigger channel. Triggers
/// that queue up while a tick is running are folded into the next tick.
pub struct RefreshDriver<F> {
    coordinator: Coordinator<F>,
    state: Arc<RwLock<AppState>>,
    triggers: mpsc::Receiver<TickTrigger>,
    interval: Duration,
    stop: watch::Receiver<bool>,
    wait_attempts: u32,
    wait_delay: Duration,
}

impl<F: VehicleFeed> RefreshDriver<F> {
    pub fn new(
        coordinator: Coordinator<F>,
        state: Arc<RwLock<AppState>>,
        triggers: mpsc::Receiver<TickTrigger>,
        interval: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            coordinator,
            state,
            triggers,
            interval,
            stop,
            wait_attempts: TRACKER_WAIT_ATTEMPTS,
            wait_delay: TRACKER_WAIT_DELAY,
        }
    }

    pub fn with_tracker_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.wait_attempts = attempts;
        self.wait_delay = delay;
        self
    }

    /// Poll until every tracker has a location or the attempts run out.
    ///
    /// Returns whether all trackers reported. Running out is not an error: the
    /// first tick proceeds with whatever locations are known.
    pub async fn wait_for_trackers(&mut self) -> bool {
        debug!("Waiting for initial tracker locations");
        for _ in 0..self.wait_attempts {
            self.drain_locations();
            if self.coordinator.engine().all_trackers_located() {
                debug!("All trackers located");
                return true;
            }
            tokio::time::sleep(self.wait_delay).await;
        }
        self.drain_locations();
        if self.coordinator.engine().all_trackers_located() {
            return true;
        }
        warn!(
            attempts = self.wait_attempts,
            located = self.coordinator.engine().locations().len(),
            "Timed out waiting for tracker locations, continuing"
        );
        false
    }

    pub async fn run(mut self) -> Coordinator<F> {
        self.wait_for_trackers().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Refresh driver started");

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => TickTrigger::Timer,
                received = self.triggers.recv() => match received {
                    Some(trigger) => trigger,
                    None => break,
                },
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                    continue;
                }
            };
            let trigger = self.coalesce(trigger);
            self.run_tick(trigger).await;
        }

        info!("Refresh driver stopped");
        self.coordinator
    }

    /// Fold queued triggers into `first`; earlier location changes are applied directly.
    fn coalesce(&mut self, first: TickTrigger) -> TickTrigger {
        let mut trigger = first;
        let mut folded = 0usize;
        while let Ok(next) = self.triggers.try_recv() {
            let previous = std::mem::replace(&mut trigger, next);
            self.apply_if_location(previous);
            folded += 1;
        }
        if folded > 0 {
            debug!(folded, "Coalesced queued triggers");
        }
        trigger
    }

    fn drain_locations(&mut self) {
        while let Ok(trigger) = self.triggers.try_recv() {
            self.apply_if_location(trigger);
        }
    }

    fn apply_if_location(&mut self, trigger: TickTrigger) {
        if let TickTrigger::LocationChanged {
            tracker_id,
            location,
        } = trigger
            && let Err(err) = self.coordinator.apply_location(&tracker_id, location)
        {
            warn!(error = %err, "Ignoring location update");
        }
    }

    async fn run_tick(&mut self, trigger: TickTrigger) {
        let result = self
            .coordinator
            .advance_tick(trigger, OffsetDateTime::now_utc())
            .await;
        let status = match result {
            Ok(report) => {
                debug!(
                    vehicles = report.vehicles_indexed,
                    active = report.summary.active,
                    "Tick complete"
                );
                TickStatus::Ok
            }
            Err(err) => {
                warn!(error = %err, "Tick failed");
                TickStatus::Failed {
                    reason: err.to_string(),
                }
            }
        };

        let snapshot = self.coordinator.snapshot();
        match self.state.write() {
            Ok(mut guard) => {
                guard.set_snapshot(snapshot);
                guard.set_last_tick(TickOutcome {
                    finished_at: OffsetDateTime::now_utc(),
                    status,
                });
            }
            Err(_) => warn!("State lock poisoned while publishing tick"),
        }
    }
}
