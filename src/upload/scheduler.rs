use crate::error::UploadError;
use crate::events::{AgentEvent, EventBus};
use crate::frame::Frame;
use crate::observation::Observation;
use crate::upload::client::{validate_destination, ServerConfig};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Scheduler states.
///
/// `Uploading` means exactly one attempt is outstanding; the timer is not
/// polled in that state, so a second attempt can never start. `Disabled`
/// is terminal for the session: it takes a capture restart with a valid
/// destination to leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Uploading,
    Disabled,
}

/// A claimed upload attempt: the frame snapshot plus the validated destination
pub struct PendingUpload {
    pub frame: Frame,
    pub destination: Url,
}

/// Result of a finished upload attempt, as reported back to the scheduler
pub struct UploadOutcome {
    pub frame_id: u64,
    pub result: Result<ServerConfig, UploadError>,
}

/// What the completion did to the scheduler
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Attempt succeeded; carries the new period when the server's cadence
    /// differed from the current one
    Succeeded { interval_changed: Option<Duration> },
    /// Attempt failed; the pending flag was cleared anyway (no retry)
    Failed { error: UploadError },
}

/// Timer-driven upload state machine.
///
/// The agent loop owns the actual timer and calls `on_tick` when it fires and
/// the scheduler is idle; `on_complete` when the spawned attempt finishes.
/// Single-flight and no-retry discipline both live here.
pub struct UploadScheduler {
    state: SchedulerState,
    interval: Duration,
    destination: String,
    events: Arc<EventBus>,
}

impl UploadScheduler {
    pub fn new(interval: Duration, destination: String, events: Arc<EventBus>) -> Self {
        Self {
            state: SchedulerState::Idle,
            interval,
            destination,
            events,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SchedulerState::Idle
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Timer fired. Claims a snapshot of the pending observation and moves
    /// to `Uploading`, or disables the scheduler when the destination fails
    /// validation. The pending flag is never consumed here.
    pub fn on_tick(&mut self, observation: &Observation) -> Option<PendingUpload> {
        if self.state != SchedulerState::Idle {
            return None;
        }

        let frame = match observation.claim_snapshot() {
            Some(frame) => frame,
            None => {
                debug!("Tick with nothing pending, staying idle");
                return None;
            }
        };

        let destination = match validate_destination(&self.destination) {
            Ok(destination) => destination,
            Err(e) => {
                warn!("Destination rejected, disabling scheduler: {}", e);
                self.state = SchedulerState::Disabled;
                self.events.publish(AgentEvent::SchedulerDisabled {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        info!(
            "Starting upload of frame {} to {}",
            frame.id, self.destination
        );
        self.state = SchedulerState::Uploading;
        self.events
            .publish(AgentEvent::UploadStarted { frame_id: frame.id });

        Some(PendingUpload { frame, destination })
    }

    /// Upload attempt finished, successfully or not.
    ///
    /// Both paths clear the pending flag and return to `Idle`; a failed
    /// frame is not retried, the scheduler waits for fresh evidence. The
    /// interval is replaced only when the advertised cadence differs, so
    /// repeated identical responses cause no restart churn.
    pub fn on_complete(
        &mut self,
        outcome: UploadOutcome,
        observation: &mut Observation,
    ) -> Completion {
        self.state = SchedulerState::Idle;
        observation.clear_pending();

        match outcome.result {
            Ok(server_config) => {
                self.events.publish(AgentEvent::UploadSucceeded {
                    frame_id: outcome.frame_id,
                    server_duration_seconds: server_config.duration_seconds,
                });

                let advertised = Duration::from_secs(server_config.duration_seconds);
                // A zero cadence would stall the timer; keep the current one
                let interval_changed = (server_config.duration_seconds > 0
                    && advertised != self.interval)
                    .then(|| {
                        info!(
                            "Server cadence changed: {}s -> {}s",
                            self.interval.as_secs(),
                            advertised.as_secs()
                        );
                        self.interval = advertised;
                        self.events.publish(AgentEvent::IntervalChanged {
                            seconds: server_config.duration_seconds,
                        });
                        advertised
                    });

                Completion::Succeeded { interval_changed }
            }
            Err(error) => {
                warn!("Upload of frame {} failed: {}", outcome.frame_id, error);
                self.events.publish(AgentEvent::UploadFailed {
                    frame_id: outcome.frame_id,
                    error: error.to_string(),
                });
                Completion::Failed { error }
            }
        }
    }
}
