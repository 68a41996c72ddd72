//! Screen capture

use std::io::Cursor;
use std::time::Instant;

use image::{DynamicImage, ImageOutputFormat, RgbImage};
use tracing::debug;

use crate::error::{BotError, Result};
use crate::types::UiRegion;

/// Source of RGB frames. `None` captures the full visible display.
pub trait Sampler: Send + Sync {
    fn capture(&self, region: Option<&UiRegion>) -> Result<RgbImage>;
}

/// Capture a screen region (or the primary display) and return an RGB frame
pub fn capture_region(region: Option<&UiRegion>) -> Result<RgbImage> {
    #[cfg(target_os = "windows")]
    {
        use screenshots::Screen;

        let screens = Screen::all().map_err(|e| BotError::Capture(e.to_string()))?;
        let screen = screens
            .first()
            .ok_or_else(|| BotError::Capture("No screens found".to_string()))?;

        let rgba = match region {
            Some(r) => screen.capture_area(r.x as i32, r.y as i32, r.width, r.height),
            None => screen.capture(),
        }
        .map_err(|e| BotError::Capture(e.to_string()))?;

        let (width, height) = (rgba.width(), rgba.height());
        let raw = rgba.into_raw();
        let rgb: Vec<u8> = raw
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| BotError::Capture("capture buffer size mismatch".to_string()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let _ = region;
        Err(BotError::Capture(
            "Screen capture only supported on Windows".to_string(),
        ))
    }
}

/// Native display capture backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenCapture;

impl ScreenCapture {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for ScreenCapture {
    fn capture(&self, region: Option<&UiRegion>) -> Result<RgbImage> {
        let start = Instant::now();
        let frame = capture_region(region)?;
        debug!(
            region = region.map(|r| r.name.as_str()).unwrap_or("full"),
            width = frame.width(),
            height = frame.height(),
            capture_ms = start.elapsed().as_millis() as u64,
            "captured frame"
        );
        Ok(frame)
    }
}

/// PNG-encode a frame for the inference request.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| BotError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
