use crate::error::UploadError;
use crate::events::{AgentEvent, EventBus};
use crate::frame::Frame;
use crate::observation::Observation;
use crate::upload::client::ServerConfig;
use crate::upload::scheduler::{Completion, SchedulerState, UploadOutcome, UploadScheduler};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

fn frame(id: u64) -> Frame {
    Frame::new(id, SystemTime::now(), vec![0u8; 8 * 8 * 3], 8, 8)
}

fn scheduler(destination: &str) -> (UploadScheduler, broadcast::Receiver<AgentEvent>) {
    let events = Arc::new(EventBus::new(32));
    let rx = events.subscribe();
    let scheduler = UploadScheduler::new(Duration::from_secs(15), destination.to_string(), events);
    (scheduler, rx)
}

fn drain(rx: &mut broadcast::Receiver<AgentEvent>) -> Vec<&'static str> {
    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type());
    }
    types
}

#[test]
fn tick_with_nothing_pending_stays_idle() {
    let (mut scheduler, mut rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();
    observation.publish_initial(frame(1));

    assert!(scheduler.on_tick(&observation).is_none());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn tick_with_pending_frame_enters_uploading_once() {
    let (mut scheduler, mut rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();
    observation.publish_motion(frame(2));

    let pending = scheduler.on_tick(&observation).expect("upload should start");
    assert_eq!(pending.frame.id, 2);
    assert_eq!(scheduler.state(), SchedulerState::Uploading);

    // Single-flight: while one attempt is outstanding no second one starts,
    // even though the pending flag is still set
    assert!(observation.pending_upload());
    assert!(scheduler.on_tick(&observation).is_none());

    assert_eq!(drain(&mut rx), vec!["upload_started"]);
}

#[test]
fn invalid_destination_disables_without_consuming_pending() {
    let (mut scheduler, mut rx) = scheduler("not a url");
    let mut observation = Observation::new();
    observation.publish_motion(frame(3));

    assert!(scheduler.on_tick(&observation).is_none());
    assert_eq!(scheduler.state(), SchedulerState::Disabled);
    // Pending evidence survives for the session that fixes the address
    assert!(observation.pending_upload());
    assert_eq!(drain(&mut rx), vec!["scheduler_disabled"]);

    // Disabled is terminal for the session: later ticks do nothing
    assert!(scheduler.on_tick(&observation).is_none());
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn success_with_new_duration_updates_interval_once() {
    let (mut scheduler, mut rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();
    observation.publish_motion(frame(4));
    scheduler.on_tick(&observation).unwrap();

    let completion = scheduler.on_complete(
        UploadOutcome {
            frame_id: 4,
            result: Ok(ServerConfig {
                duration_seconds: 30,
            }),
        },
        &mut observation,
    );

    assert_eq!(
        completion,
        Completion::Succeeded {
            interval_changed: Some(Duration::from_secs(30))
        }
    );
    assert_eq!(scheduler.interval(), Duration::from_secs(30));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!observation.pending_upload());
    assert_eq!(drain(&mut rx), vec!["upload_started", "upload_succeeded", "interval_changed"]);
}

#[test]
fn repeated_identical_duration_causes_no_churn() {
    let (mut scheduler, mut rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();

    for id in [5, 6] {
        observation.publish_motion(frame(id));
        scheduler.on_tick(&observation).unwrap();
        let completion = scheduler.on_complete(
            UploadOutcome {
                frame_id: id,
                result: Ok(ServerConfig {
                    duration_seconds: 15,
                }),
            },
            &mut observation,
        );
        assert_eq!(
            completion,
            Completion::Succeeded {
                interval_changed: None
            }
        );
    }

    assert_eq!(scheduler.interval(), Duration::from_secs(15));
    let types = drain(&mut rx);
    assert!(!types.contains(&"interval_changed"), "events: {:?}", types);
}

#[test]
fn zero_duration_from_server_keeps_current_interval() {
    let (mut scheduler, _rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();
    observation.publish_motion(frame(7));
    scheduler.on_tick(&observation).unwrap();

    let completion = scheduler.on_complete(
        UploadOutcome {
            frame_id: 7,
            result: Ok(ServerConfig {
                duration_seconds: 0,
            }),
        },
        &mut observation,
    );

    assert_eq!(
        completion,
        Completion::Succeeded {
            interval_changed: None
        }
    );
    assert_eq!(scheduler.interval(), Duration::from_secs(15));
}

#[test]
fn failure_clears_pending_and_returns_to_idle() {
    let (mut scheduler, mut rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();
    observation.publish_motion(frame(8));
    scheduler.on_tick(&observation).unwrap();

    let error = UploadError::transfer("connection refused");
    let completion = scheduler.on_complete(
        UploadOutcome {
            frame_id: 8,
            result: Err(error.clone()),
        },
        &mut observation,
    );

    // No retry of the same frame: pending is cleared on failure too
    assert_eq!(completion, Completion::Failed { error });
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!observation.pending_upload());
    assert_eq!(drain(&mut rx), vec!["upload_started", "upload_failed"]);
}

#[test]
fn end_to_end_capture_to_cadence_update() {
    let (mut scheduler, mut rx) = scheduler("http://collector.example.com");
    let mut observation = Observation::new();

    // Frame 1 arrives: published for display, not pending
    observation.publish_initial(frame(1));
    assert!(scheduler.on_tick(&observation).is_none());

    // Frame 2 arrives with a motion score above threshold
    observation.publish_motion(frame(2));

    // Timer fires: scheduler enters Uploading with a snapshot
    let pending = scheduler.on_tick(&observation).unwrap();
    assert_eq!(pending.frame.id, 2);
    assert_eq!(scheduler.state(), SchedulerState::Uploading);

    // The acquisition side keeps overwriting the observation mid-flight;
    // the in-flight snapshot is unaffected
    observation.publish_motion(frame(3));
    assert_eq!(pending.frame.id, 2);

    // Upload succeeds, server advertises 30s (previous was 15s)
    let completion = scheduler.on_complete(
        UploadOutcome {
            frame_id: pending.frame.id,
            result: Ok(ServerConfig {
                duration_seconds: 30,
            }),
        },
        &mut observation,
    );

    assert_eq!(
        completion,
        Completion::Succeeded {
            interval_changed: Some(Duration::from_secs(30))
        }
    );
    assert_eq!(scheduler.interval(), Duration::from_secs(30));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!observation.pending_upload());

    let types = drain(&mut rx);
    assert_eq!(
        types,
        vec!["upload_started", "upload_succeeded", "interval_changed"]
    );
}
