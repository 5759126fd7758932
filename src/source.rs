use crate::error::{CamwatchError, Result};
use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Contract for an asynchronous frame producer.
///
/// `start` hands the source a channel sender; the source delivers frames from
/// its own acquisition thread, zero or more times, until `stop`. Delivery
/// must never block the acquisition thread: implementations use `try_send`
/// and drop the frame when the consumer lags. The downstream observation
/// slot is newest-wins anyway, so a dropped frame costs nothing.
pub trait FrameSource: Send {
    fn start(&mut self, tx: mpsc::Sender<Frame>) -> Result<()>;
    fn stop(&mut self);
}

/// Deterministic generated frame source for tests and demo runs.
///
/// Produces a flat gray background with a bright square that moves a few
/// pixels per frame, which reliably trips a frame-difference classifier.
/// Real camera integration is an external collaborator and lives outside
/// this crate.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    fps: u32,
    square_size: u32,
    running: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            square_size: 40,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    fn render(width: u32, height: u32, square_size: u32, offset: u32) -> Vec<u8> {
        let mut data = vec![96u8; width as usize * height as usize * 3];
        let size = square_size.min(width).min(height);
        let max_x = width.saturating_sub(size);
        let max_y = height.saturating_sub(size);
        let x0 = if max_x == 0 { 0 } else { (offset * 7) % max_x };
        let y0 = if max_y == 0 { 0 } else { (offset * 5) % max_y };

        for y in y0..y0 + size {
            for x in x0..x0 + size {
                let idx = ((y * width + x) * 3) as usize;
                data[idx] = 240;
                data[idx + 1] = 240;
                data[idx + 2] = 240;
            }
        }
        data
    }
}

impl FrameSource for SyntheticFrameSource {
    fn start(&mut self, tx: mpsc::Sender<Frame>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CamwatchError::component(
                "frame_source",
                "source already started",
            ));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let (width, height, square_size) = (self.width, self.height, self.square_size);
        let frame_period = Duration::from_micros(1_000_000 / self.fps as u64);

        info!(
            "Starting synthetic frame source ({}x{} @ {} fps)",
            width, height, self.fps
        );

        let handle = std::thread::spawn(move || {
            let mut frame_id: u64 = 0;
            while running.load(Ordering::SeqCst) {
                let data = Self::render(width, height, square_size, frame_id as u32);
                let frame = Frame::new(frame_id, SystemTime::now(), data, width, height);

                match tx.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Frame channel full, dropping frame {}", frame_id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("Frame channel closed, stopping acquisition");
                        break;
                    }
                }

                frame_id += 1;
                std::thread::sleep(frame_period);
            }
            debug!("Synthetic acquisition thread exited after {} frames", frame_id);
        });

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Synthetic acquisition thread panicked");
            }
        }
        info!("Synthetic frame source stopped");
    }
}

impl Drop for SyntheticFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
