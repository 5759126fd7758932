use crate::frame::Frame;

/// The single most-recent published frame plus its pending-upload flag.
///
/// This is a slot, not a queue: a new frame always replaces the previous one,
/// so a stale frame is never uploaded once superseded while the scheduler is
/// idle. A frame already claimed by an in-flight upload is unaffected because
/// the upload holds its own `Arc` snapshot.
///
/// Ownership discipline: the classifier policy is the only setter of the
/// pending flag, the upload scheduler is the only clearer. Both run on the
/// agent loop, so no locking is needed.
#[derive(Debug, Default)]
pub struct Observation {
    frame: Option<Frame>,
    pending_upload: bool,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the first frame of a session so the viewer has something to
    /// show; does not mark it as upload evidence.
    pub fn publish_initial(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    /// Publish a frame that crossed the motion threshold and flag it for
    /// upload.
    pub fn publish_motion(&mut self, frame: Frame) {
        self.frame = Some(frame);
        self.pending_upload = true;
    }

    /// Snapshot the current frame for an upload attempt, if one is pending.
    ///
    /// The pending flag is not consumed here; it is cleared when the attempt
    /// completes, success or failure.
    pub fn claim_snapshot(&self) -> Option<Frame> {
        if self.pending_upload {
            self.frame.clone()
        } else {
            None
        }
    }

    pub fn clear_pending(&mut self) {
        self.pending_upload = false;
    }

    pub fn pending_upload(&self) -> bool {
        self.pending_upload
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Drop all session state; used when capture restarts.
    pub fn reset(&mut self) {
        self.frame = None;
        self.pending_upload = false;
    }
}
