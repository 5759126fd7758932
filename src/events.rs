use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by the agent pipeline.
///
/// Components publish to an explicit broadcast channel; observers (status
/// display, tests) subscribe. Nothing in the pipeline polls anyone else's
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    /// A frame was published to the shared observation slot
    FramePublished {
        frame_id: u64,
        pending_upload: bool,
        timestamp: SystemTime,
    },
    /// Motion score crossed the configured threshold
    MotionDetected {
        frame_id: u64,
        score: f64,
        timestamp: SystemTime,
    },
    /// The scheduler entered `Uploading` with a frame snapshot
    UploadStarted { frame_id: u64 },
    /// An upload attempt completed successfully
    UploadSucceeded {
        frame_id: u64,
        server_duration_seconds: u64,
    },
    /// An upload attempt failed; the pending flag is still cleared
    UploadFailed { frame_id: u64, error: String },
    /// The scheduler period was replaced by a server-advertised value
    IntervalChanged { seconds: u64 },
    /// The scheduler shut itself off because the destination is invalid
    SchedulerDisabled { reason: String },
    /// The capture session stopped
    SessionStopped { reason: String },
}

impl AgentEvent {
    /// Event type as a string for filtering and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::FramePublished { .. } => "frame_published",
            AgentEvent::MotionDetected { .. } => "motion_detected",
            AgentEvent::UploadStarted { .. } => "upload_started",
            AgentEvent::UploadSucceeded { .. } => "upload_succeeded",
            AgentEvent::UploadFailed { .. } => "upload_failed",
            AgentEvent::IntervalChanged { .. } => "interval_changed",
            AgentEvent::SchedulerDisabled { .. } => "scheduler_disabled",
            AgentEvent::SessionStopped { .. } => "session_stopped",
        }
    }

    /// User-visible status text for this event, if it carries any.
    ///
    /// A successful upload yields an empty string: the status line is
    /// cleared once the evidence is saved.
    pub fn status_line(&self) -> Option<String> {
        match self {
            AgentEvent::MotionDetected { .. } => Some("motion detected".to_string()),
            AgentEvent::UploadStarted { .. } => Some("saving evidence...".to_string()),
            AgentEvent::UploadSucceeded { .. } => Some(String::new()),
            AgentEvent::UploadFailed { error, .. } => Some(error.clone()),
            AgentEvent::IntervalChanged { seconds } => {
                Some(format!("upload cadence changed to {}s", seconds))
            }
            AgentEvent::SchedulerDisabled { reason } => Some(reason.clone()),
            AgentEvent::SessionStopped { reason } => Some(reason.clone()),
            AgentEvent::FramePublished { .. } => None,
        }
    }
}

/// Broadcast event bus for pipeline coordination and status reporting
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: AgentEvent) {
        debug!("Publishing event: {}", event.event_type());
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(AgentEvent::MotionDetected {
            frame_id: 3,
            score: 0.01,
            timestamp: SystemTime::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "motion_detected");
        assert_eq!(event.status_line().as_deref(), Some("motion detected"));
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(AgentEvent::UploadStarted { frame_id: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_status_lines() {
        let changed = AgentEvent::IntervalChanged { seconds: 30 };
        assert_eq!(
            changed.status_line().as_deref(),
            Some("upload cadence changed to 30s")
        );

        let succeeded = AgentEvent::UploadSucceeded {
            frame_id: 1,
            server_duration_seconds: 30,
        };
        assert_eq!(succeeded.status_line().as_deref(), Some(""));

        let published = AgentEvent::FramePublished {
            frame_id: 1,
            pending_upload: false,
            timestamp: SystemTime::now(),
        };
        assert!(published.status_line().is_none());
    }
}
