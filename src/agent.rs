use crate::classifier::MotionClassifier;
use crate::config::CamwatchConfig;
use crate::error::{CamwatchError, Result, UploadError};
use crate::events::{AgentEvent, EventBus};
use crate::frame::Frame;
use crate::observation::Observation;
use crate::source::FrameSource;
use crate::upload::{Completion, ImageUploader, SchedulerState, UploadOutcome, UploadScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Message from the classification stage to the agent loop.
///
/// Classification runs on the acquisition side of the channel, so CPU-bound
/// differencing never stalls the loop that owns the scheduler; the loop only
/// applies ready-made results. This is the single-writer handoff: nothing
/// touches Observation except the loop itself.
pub enum ClassifierUpdate {
    Classified {
        frame: Frame,
        score: f64,
        first_frame: bool,
    },
    /// Classification failed; fatal to the session
    Fault { details: String },
}

/// Run the classifier on a blocking thread, consuming raw frames and
/// producing classification updates until the frame channel closes.
pub fn spawn_classifier_stage(
    mut classifier: MotionClassifier,
    mut raw_rx: mpsc::Receiver<Frame>,
    update_tx: mpsc::Sender<ClassifierUpdate>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        // A fresh session must never see a stale reference frame
        classifier.reset();

        while let Some(frame) = raw_rx.blocking_recv() {
            let update = match classifier.classify(&frame) {
                Ok(result) => ClassifierUpdate::Classified {
                    frame: result.annotated,
                    score: result.score,
                    first_frame: result.first_frame,
                },
                Err(e) => ClassifierUpdate::Fault {
                    details: e.to_string(),
                },
            };

            let fault = matches!(update, ClassifierUpdate::Fault { .. });
            if update_tx.blocking_send(update).is_err() || fault {
                break;
            }
        }
        debug!("Classifier stage exited");
    })
}

/// The agent: owns the observation slot, the upload scheduler and the timer,
/// and coordinates them over a single cooperative loop.
pub struct Agent {
    config: CamwatchConfig,
    config_path: Option<PathBuf>,
    events: Arc<EventBus>,
    uploader: Arc<dyn ImageUploader>,
    observation: Observation,
    scheduler: UploadScheduler,
}

impl Agent {
    pub fn new(
        config: CamwatchConfig,
        config_path: Option<PathBuf>,
        uploader: Arc<dyn ImageUploader>,
        events: Arc<EventBus>,
    ) -> Self {
        let scheduler = UploadScheduler::new(
            config.agent.upload_interval(),
            config.agent.site_url.clone(),
            Arc::clone(&events),
        );
        Self {
            config,
            config_path,
            events,
            uploader,
            observation: Observation::new(),
            scheduler,
        }
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    pub fn scheduler(&self) -> &UploadScheduler {
        &self.scheduler
    }

    /// Apply the motion policy to one classified frame.
    ///
    /// The first frame of a session is always published so the viewer has
    /// something to show, without marking it pending. Frames at or above the
    /// threshold become pending upload evidence; frames below it have already
    /// refreshed the classifier's reference state and touch nothing here.
    pub fn apply_classification(&mut self, frame: Frame, score: f64, first_frame: bool) {
        let frame_id = frame.id;
        let timestamp = frame.timestamp;

        if first_frame {
            self.observation.publish_initial(frame);
            self.events.publish(AgentEvent::FramePublished {
                frame_id,
                pending_upload: false,
                timestamp,
            });
        } else if score >= self.config.agent.motion_threshold {
            info!("Motion detected: score {:.5} on frame {}", score, frame_id);
            self.events.publish(AgentEvent::MotionDetected {
                frame_id,
                score,
                timestamp,
            });
            self.observation.publish_motion(frame);
            self.events.publish(AgentEvent::FramePublished {
                frame_id,
                pending_upload: true,
                timestamp,
            });
        } else {
            trace!("Frame {} below threshold (score {:.5})", frame_id, score);
        }
    }

    /// Run one capture session until shutdown or a fatal fault.
    pub async fn run(
        &mut self,
        source: &mut dyn FrameSource,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.observation.reset();
        self.scheduler = UploadScheduler::new(
            self.config.agent.upload_interval(),
            self.config.agent.site_url.clone(),
            Arc::clone(&self.events),
        );

        let capacity = self.config.agent.frame_channel_capacity;
        let (raw_tx, raw_rx) = mpsc::channel(capacity);
        let (update_tx, mut update_rx) = mpsc::channel(capacity);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<UploadOutcome>(1);

        let classifier = MotionClassifier::new(
            self.config.agent.difference_threshold,
            self.config.agent.min_blob_width,
            self.config.agent.min_blob_height,
        );
        let stage = spawn_classifier_stage(classifier, raw_rx, update_tx);

        source.start(raw_tx)?;
        info!(
            "Capture session started, upload cadence {}s, destination {}",
            self.scheduler.interval().as_secs(),
            self.scheduler.destination()
        );

        let mut timer = interval_at(
            Instant::now() + self.scheduler.interval(),
            self.scheduler.interval(),
        );
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                update = update_rx.recv() => {
                    match update {
                        Some(ClassifierUpdate::Classified { frame, score, first_frame }) => {
                            self.apply_classification(frame, score, first_frame);
                        }
                        Some(ClassifierUpdate::Fault { details }) => {
                            error!("Classifier fault, stopping session: {}", details);
                            break Err(CamwatchError::classifier(details));
                        }
                        None => {
                            break Err(CamwatchError::component(
                                "agent",
                                "frame pipeline closed unexpectedly",
                            ));
                        }
                    }
                }

                // The timer is only polled while idle, so a second upload can
                // never start while one is outstanding
                _ = timer.tick(), if self.scheduler.is_idle() => {
                    if let Some(pending) = self.scheduler.on_tick(&self.observation) {
                        let uploader = Arc::clone(&self.uploader);
                        let quality = self.config.agent.jpeg_quality;
                        let outcome_tx = outcome_tx.clone();

                        tokio::spawn(async move {
                            let frame_id = pending.frame.id;
                            let result = match pending.frame.encode_jpeg(quality) {
                                Ok(jpeg) => {
                                    uploader.upload(&jpeg, &pending.destination).await
                                }
                                Err(e) => Err(UploadError::transfer(format!(
                                    "payload encoding failed: {}",
                                    e
                                ))),
                            };
                            let _ = outcome_tx.send(UploadOutcome { frame_id, result }).await;
                        });
                    }
                }

                Some(outcome) = outcome_rx.recv() => {
                    match self.scheduler.on_complete(outcome, &mut self.observation) {
                        Completion::Succeeded { interval_changed: Some(new_interval) } => {
                            self.persist_interval(new_interval.as_secs());
                            timer = interval_at(Instant::now() + new_interval, new_interval);
                            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }
                        // The next tick comes a full period after completion,
                        // not after the start of the attempt
                        Completion::Succeeded { interval_changed: None } => timer.reset(),
                        Completion::Failed { .. } => timer.reset(),
                    }
                }

                _ = shutdown.changed() => {
                    info!("Shutdown requested, stopping capture session");
                    break Ok(());
                }
            }
        };

        source.stop();
        // Unblocks a classifier stage stuck on a full update channel
        drop(update_rx);
        let _ = stage.await;

        // An upload already in flight runs to completion; the session has
        // moved on, so only its status is surfaced
        if self.scheduler.state() == SchedulerState::Uploading {
            drop(outcome_tx);
            let events = Arc::clone(&self.events);
            tokio::spawn(async move {
                if let Some(outcome) = outcome_rx.recv().await {
                    match outcome.result {
                        Ok(server_config) => events.publish(AgentEvent::UploadSucceeded {
                            frame_id: outcome.frame_id,
                            server_duration_seconds: server_config.duration_seconds,
                        }),
                        Err(e) => {
                            warn!("Late upload of frame {} failed: {}", outcome.frame_id, e);
                            events.publish(AgentEvent::UploadFailed {
                                frame_id: outcome.frame_id,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            });
        }

        let reason = match &result {
            Ok(()) => "capture stopped".to_string(),
            Err(e) => e.to_string(),
        };
        self.events.publish(AgentEvent::SessionStopped { reason });

        result
    }

    /// Persist a server-advertised cadence change (and the confirmed
    /// destination) through the explicit config save call.
    fn persist_interval(&mut self, seconds: u64) {
        self.config.agent.upload_interval_seconds = seconds;
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to_file(path) {
                warn!("Failed to persist configuration: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SyntheticFrameSource;
    use crate::upload::ServerConfig;
    use async_trait::async_trait;
    use reqwest::Url;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    struct MockUploader {
        response: ServerConfig,
        calls: AtomicUsize,
    }

    impl MockUploader {
        fn new(duration_seconds: u64) -> Self {
            Self {
                response: ServerConfig { duration_seconds },
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageUploader for MockUploader {
        async fn upload(
            &self,
            _jpeg: &[u8],
            _destination: &Url,
        ) -> std::result::Result<ServerConfig, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response)
        }
    }

    fn test_agent(uploader: Arc<dyn ImageUploader>) -> (Agent, Arc<EventBus>) {
        let mut config = CamwatchConfig::default();
        config.agent.upload_interval_seconds = 1;
        let events = Arc::new(EventBus::new(64));
        let agent = Agent::new(config, None, uploader, Arc::clone(&events));
        (agent, events)
    }

    fn frame(id: u64) -> Frame {
        Frame::new(id, SystemTime::now(), vec![0u8; 8 * 8 * 3], 8, 8)
    }

    #[tokio::test]
    async fn test_first_frame_published_not_pending_regardless_of_score() {
        let (mut agent, _events) = test_agent(Arc::new(MockUploader::new(15)));

        agent.apply_classification(frame(1), 0.9, true);

        assert_eq!(agent.observation().latest().unwrap().id, 1);
        assert!(!agent.observation().pending_upload());
    }

    #[tokio::test]
    async fn test_threshold_policy() {
        let (mut agent, events) = test_agent(Arc::new(MockUploader::new(15)));
        let mut rx = events.subscribe();

        agent.apply_classification(frame(1), 0.0, true);

        // At threshold: pending set, motion reported
        agent.apply_classification(frame(2), 0.005, false);
        assert!(agent.observation().pending_upload());
        assert_eq!(agent.observation().latest().unwrap().id, 2);

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert!(types.contains(&"motion_detected"));
    }

    #[tokio::test]
    async fn test_subthreshold_frame_leaves_observation_untouched() {
        let (mut agent, _events) = test_agent(Arc::new(MockUploader::new(15)));

        agent.apply_classification(frame(1), 0.0, true);
        agent.apply_classification(frame(2), 0.004, false);

        // The published frame is still the first one and nothing is pending
        assert_eq!(agent.observation().latest().unwrap().id, 1);
        assert!(!agent.observation().pending_upload());
    }

    #[tokio::test]
    async fn test_classifier_stage_reports_faults() {
        let classifier = MotionClassifier::new(15, 10, 10);
        let (raw_tx, raw_rx) = mpsc::channel(4);
        let (update_tx, mut update_rx) = mpsc::channel(4);
        let stage = spawn_classifier_stage(classifier, raw_rx, update_tx);

        // Truncated raster: classification must fault, not panic
        let bad = Frame::new(1, SystemTime::now(), vec![0u8; 5], 64, 64);
        raw_tx.send(bad).await.unwrap();

        match update_rx.recv().await.unwrap() {
            ClassifierUpdate::Fault { details } => {
                assert!(details.contains("expected"), "details: {}", details);
            }
            _ => panic!("expected a classifier fault"),
        }

        drop(raw_tx);
        stage.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_uploads_and_adopts_server_cadence() {
        let uploader = Arc::new(MockUploader::new(2));
        let (mut agent, events) =
            test_agent(Arc::clone(&uploader) as Arc<dyn ImageUploader>);
        let mut rx = events.subscribe();

        let mut source = SyntheticFrameSource::new(64, 48, 20);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run = tokio::spawn(async move {
            let result = agent.run(&mut source, shutdown_rx).await;
            (agent, result)
        });

        // One 1s cadence period plus margin for the first upload round trip
        tokio::time::sleep(Duration::from_millis(1800)).await;
        shutdown_tx.send(true).unwrap();

        let (agent, result) = run.await.unwrap();
        result.unwrap();

        assert!(uploader.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(agent.scheduler().interval(), Duration::from_secs(2));
        assert!(!agent.observation().pending_upload());

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert!(types.contains(&"motion_detected"), "events: {:?}", types);
        assert!(types.contains(&"upload_started"), "events: {:?}", types);
        assert!(types.contains(&"upload_succeeded"), "events: {:?}", types);
        assert!(types.contains(&"interval_changed"), "events: {:?}", types);
        assert!(types.contains(&"session_stopped"), "events: {:?}", types);

        // Single-flight: every started upload completed before the next began
        let mut outstanding = 0;
        for event_type in &types {
            match *event_type {
                "upload_started" => {
                    outstanding += 1;
                    assert_eq!(outstanding, 1);
                }
                "upload_succeeded" | "upload_failed" => outstanding -= 1,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_destination_disables_scheduler_without_network() {
        let uploader = Arc::new(MockUploader::new(15));
        let mut config = CamwatchConfig::default();
        config.agent.upload_interval_seconds = 1;
        config.agent.site_url = "not a url".to_string();
        let events = Arc::new(EventBus::new(64));
        let mut rx = events.subscribe();
        let mut agent = Agent::new(
            config,
            None,
            Arc::clone(&uploader) as Arc<dyn ImageUploader>,
            Arc::clone(&events),
        );

        let mut source = SyntheticFrameSource::new(64, 48, 20);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run = tokio::spawn(async move {
            let result = agent.run(&mut source, shutdown_rx).await;
            (agent, result)
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown_tx.send(true).unwrap();

        let (agent, result) = run.await.unwrap();
        result.unwrap();

        // No network attempt was made and the evidence is still pending
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(agent.scheduler().state(), SchedulerState::Disabled);
        assert!(agent.observation().pending_upload());

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert!(types.contains(&"scheduler_disabled"), "events: {:?}", types);
        assert!(!types.contains(&"upload_started"), "events: {:?}", types);
    }
}
