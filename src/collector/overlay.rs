use crate::config::CollectorConfig;
use crate::error::{CamwatchError, Result};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::Rgb;
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use tracing::{debug, warn};

/// Prepare an uploaded image for storage.
///
/// The payload is decoded (any format `image` recognizes), stamped with the
/// server receive time, and re-encoded as JPEG at the collector's configured
/// quality. A missing or unreadable font skips the stamp but never rejects
/// the upload; an undecodable payload does.
pub fn prepare_stored_jpeg(
    payload: &[u8],
    received_at: DateTime<Utc>,
    config: &CollectorConfig,
) -> Result<Vec<u8>> {
    let mut img = image::load_from_memory(payload)
        .map_err(|e| {
            CamwatchError::component("collector", format!("undecodable image payload: {}", e))
        })?
        .to_rgb8();

    if config.timestamp_overlay {
        match load_font(&config.timestamp_font_path) {
            Some(font) => {
                let text = received_at.format("%Y-%m-%d %H:%M:%S (UTC)").to_string();
                stamp(&mut img, &font, config.timestamp_font_size, &text);
                debug!("Stamped stored image: {}", text);
            }
            None => {
                warn!(
                    "Timestamp font '{}' unavailable, storing without overlay",
                    config.timestamp_font_path
                );
            }
        }
    }

    let (width, height) = img.dimensions();
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, config.jpeg_quality)
        .encode(&img, width, height, image::ColorType::Rgb8)
        .map_err(|e| {
            CamwatchError::component("collector", format!("failed to encode stored JPEG: {}", e))
        })?;

    Ok(output)
}

fn load_font(path: &str) -> Option<Font<'static>> {
    let data = std::fs::read(path).ok()?;
    Font::try_from_vec(data)
}

/// White text on a darkened band near the top-left corner
fn stamp(img: &mut image::RgbImage, font: &Font<'_>, font_size: f32, text: &str) {
    let scale = Scale::uniform(font_size);
    let (text_width, text_height) = text_size(scale, font, text);

    let x: u32 = 5;
    let y: u32 = 5;

    for dy in 0..(text_height as u32 + 10) {
        for dx in 0..(text_width as u32 + 10) {
            let px = x.saturating_sub(5) + dx;
            let py = y.saturating_sub(5) + dy;
            if px < img.width() && py < img.height() {
                let pixel = img.get_pixel(px, py);
                img.put_pixel(px, py, Rgb([pixel[0] / 3, pixel[1] / 3, pixel[2] / 3]));
            }
        }
    }

    draw_text_mut(
        img,
        Rgb([255, 255, 255]),
        x as i32,
        y as i32,
        scale,
        font,
        text,
    );
}
