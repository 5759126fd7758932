use crate::error::{CamwatchError, Result};
use crate::frame::Frame;
use image::{GrayImage, Luma, Rgb};
use imageproc::contrast::threshold;
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::morphology::{dilate, erode};
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Result of classifying one frame
pub struct Classification {
    /// Fraction of frame area covered by accepted motion blobs, in [0, 1]
    pub score: f64,
    /// Input frame with accepted motion regions outlined in red
    pub annotated: Frame,
    /// True when this was the first frame of the session
    pub first_frame: bool,
}

/// Stateful per-source motion detector.
///
/// Differencing runs against the previous frame, not a long-lived background
/// model: the reference frame is replaced on every call, so the detector
/// responds to instantaneous change only. `reset` must be called whenever
/// capture (re)starts so a stale reference never leaks across sessions.
pub struct MotionClassifier {
    difference_threshold: u8,
    min_blob_width: u32,
    min_blob_height: u32,
    reference: Option<GrayImage>,
}

#[derive(Debug)]
struct Blob {
    pixels: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl MotionClassifier {
    pub fn new(difference_threshold: u32, min_blob_width: u32, min_blob_height: u32) -> Self {
        Self {
            difference_threshold: difference_threshold.min(255) as u8,
            min_blob_width,
            min_blob_height,
            reference: None,
        }
    }

    /// Classify a frame: motion score plus annotated frame.
    ///
    /// Every frame, above or below any threshold, refreshes the internal
    /// reference state. Threshold policy is the caller's concern.
    pub fn classify(&mut self, frame: &Frame) -> Result<Classification> {
        if !frame.validate_size() {
            return Err(CamwatchError::classifier(format!(
                "frame {} has {} bytes, expected {} for {}x{} RGB24",
                frame.id,
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height
            )));
        }

        let gray = rgb24_to_gray(frame);

        let reference = match self.reference.replace(gray) {
            Some(reference) => reference,
            None => {
                debug!("First frame of session ({}), storing reference", frame.id);
                return Ok(Classification {
                    score: 0.0,
                    annotated: frame.clone(),
                    first_frame: true,
                });
            }
        };

        let current = self.reference.as_ref().unwrap();
        if reference.dimensions() != current.dimensions() {
            return Err(CamwatchError::classifier(format!(
                "frame dimensions changed mid-session: {:?} -> {:?}",
                reference.dimensions(),
                current.dimensions()
            )));
        }

        // Difference mask with noise suppression
        let diff = absolute_difference(&reference, current);
        let binary = threshold(&diff, self.difference_threshold);
        let cleaned = dilate(&erode(&binary, Norm::LInf, 1), Norm::LInf, 1);

        let components = connected_components(&cleaned, Connectivity::Eight, Luma([0u8]));

        let mut blobs: HashMap<u32, Blob> = HashMap::new();
        for (x, y, pixel) in components.enumerate_pixels() {
            let id = pixel[0];
            if id == 0 {
                continue;
            }
            let blob = blobs.entry(id).or_insert(Blob {
                pixels: 0,
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            });
            blob.pixels += 1;
            blob.min_x = blob.min_x.min(x);
            blob.min_y = blob.min_y.min(y);
            blob.max_x = blob.max_x.max(x);
            blob.max_y = blob.max_y.max(y);
        }

        // Blobs below the minimum size are noise, not motion
        let accepted: Vec<&Blob> = blobs
            .values()
            .filter(|b| {
                b.max_x - b.min_x + 1 >= self.min_blob_width
                    && b.max_y - b.min_y + 1 >= self.min_blob_height
            })
            .collect();

        let accepted_pixels: u64 = accepted.iter().map(|b| b.pixels).sum();
        let area = frame.width as u64 * frame.height as u64;
        let score = accepted_pixels as f64 / area as f64;

        trace!(
            "Frame {}: {} blobs, {} accepted, score {:.5}",
            frame.id,
            blobs.len(),
            accepted.len(),
            score
        );

        let annotated = if accepted.is_empty() {
            frame.clone()
        } else {
            annotate(frame, &accepted)?
        };

        Ok(Classification {
            score,
            annotated,
            first_frame: false,
        })
    }

    /// Drop the reference frame; the next frame starts a fresh session.
    pub fn reset(&mut self) {
        self.reference = None;
        debug!("Motion classifier reset");
    }
}

fn rgb24_to_gray(frame: &Frame) -> GrayImage {
    let mut gray = GrayImage::new(frame.width, frame.height);
    for (i, pixel) in gray.pixels_mut().enumerate() {
        let base = i * 3;
        let value = 0.299 * frame.data[base] as f32
            + 0.587 * frame.data[base + 1] as f32
            + 0.114 * frame.data[base + 2] as f32;
        *pixel = Luma([value as u8]);
    }
    gray
}

fn absolute_difference(reference: &GrayImage, current: &GrayImage) -> GrayImage {
    let (width, height) = reference.dimensions();
    let mut diff = GrayImage::new(width, height);
    for (x, y, ref_pixel) in reference.enumerate_pixels() {
        let curr_pixel = current.get_pixel(x, y);
        let delta = (ref_pixel[0] as i16 - curr_pixel[0] as i16).unsigned_abs() as u8;
        diff.put_pixel(x, y, Luma([delta]));
    }
    diff
}

/// Outline accepted motion regions in red on a copy of the input frame
fn annotate(frame: &Frame, accepted: &[&Blob]) -> Result<Frame> {
    let mut image = frame.to_rgb_image().ok_or_else(|| {
        CamwatchError::classifier(format!("frame {} raster is not valid RGB24", frame.id))
    })?;

    for blob in accepted {
        let rect = Rect::at(blob.min_x as i32, blob.min_y as i32).of_size(
            blob.max_x - blob.min_x + 1,
            blob.max_y - blob.min_y + 1,
        );
        draw_hollow_rect_mut(&mut image, rect, Rgb([255, 0, 0]));
    }

    Ok(Frame::from_rgb_image(frame.id, frame.timestamp, image))
}
