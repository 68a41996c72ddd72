//! Fast pixel-based measurement of UI bars and target panels

use image::{imageops, RgbImage};
use imageproc::edges::canny;
use rayon::prelude::*;

use crate::types::{clamp_percent, ColorRange, Hsv, UiRegion};

/// Canny hysteresis thresholds used for the target panel.
pub const EDGE_LOW_THRESHOLD: f32 = 50.0;
pub const EDGE_HIGH_THRESHOLD: f32 = 150.0;

/// Convert one RGB pixel to 8-bit HSV (H halved into 0..=180).
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let s = if max == 0.0 { 0.0 } else { 255.0 * diff / max };

    let mut h = if diff == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / diff
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    Hsv {
        h: (h / 2.0).round().min(180.0) as u8,
        s: s.round() as u8,
        v: max as u8,
    }
}

/// Percentage of `region` whose pixels fall inside `range`.
///
/// The denominator is the nominal region area, so a region hanging off the
/// edge of the frame counts the missing part as unmatched. A zero-area region
/// yields 0.
pub fn bar_percentage(image: &RgbImage, range: &ColorRange, region: &UiRegion) -> f32 {
    let total = region.area();
    if total == 0 {
        return 0.0;
    }

    let crop = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    let matched = crop
        .as_raw()
        .par_chunks_exact(3)
        .filter(|px| range.contains(rgb_to_hsv(px[0], px[1], px[2])))
        .count();

    clamp_percent((matched as f64 / total as f64 * 100.0) as f32)
}

/// Number of edge pixels Canny finds in `image`.
pub fn count_edges(image: &RgbImage) -> usize {
    if image.width() == 0 || image.height() == 0 {
        return 0;
    }
    let gray = imageops::grayscale(image);
    let edges = canny(&gray, EDGE_LOW_THRESHOLD, EDGE_HIGH_THRESHOLD);
    edges.as_raw().par_iter().filter(|&&v| v > 0).count()
}
