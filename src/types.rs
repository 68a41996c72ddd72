//! Common types for perception results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

/// Display resolution the default UI layout was measured at.
pub const REFERENCE_RESOLUTION: Resolution = Resolution {
    width: 1920,
    height: 1080,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse `WIDTHxHEIGHT`, e.g. `2560x1440`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (w, h) = raw
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| BotError::Config(format!("resolution must be WIDTHxHEIGHT: {raw}")))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|e| BotError::Config(format!("invalid resolution width {w}: {e}")))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|e| BotError::Config(format!("invalid resolution height {h}: {e}")))?;
        if width == 0 || height == 0 {
            return Err(BotError::Config(format!("resolution must be non-zero: {raw}")));
        }
        Ok(Self { width, height })
    }
}

/// A named rectangle of the screen sampled for one piece of UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiRegion {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl UiRegion {
    pub fn new(name: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Zero width or height. Such a region can never be sampled.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Linear rescale on each axis, truncating toward zero.
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Self {
        Self {
            name: self.name.clone(),
            x: (f64::from(self.x) * scale_x) as u32,
            y: (f64::from(self.y) * scale_y) as u32,
            width: (f64::from(self.width) * scale_x) as u32,
            height: (f64::from(self.height) * scale_y) as u32,
        }
    }
}

/// Hue/saturation/value on the 8-bit scale: H in 0..=180, S and V in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

/// Inclusive HSV bounds. Lower is componentwise <= upper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub name: String,
    pub lower: Hsv,
    pub upper: Hsv,
}

impl ColorRange {
    pub fn new(name: impl Into<String>, lower: Hsv, upper: Hsv) -> Result<Self> {
        let name = name.into();
        if lower.h > upper.h || lower.s > upper.s || lower.v > upper.v {
            return Err(BotError::InvalidInput(format!(
                "color range {name}: lower bound exceeds upper bound"
            )));
        }
        Ok(Self { name, lower, upper })
    }

    pub fn contains(&self, px: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&px.h)
            && (self.lower.s..=self.upper.s).contains(&px.s)
            && (self.lower.v..=self.upper.v).contains(&px.v)
    }
}

/// Stats read from the screen in one monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub health: f32,
    pub endurance: f32,
    pub experience: f32,
    pub enemy_targeted: bool,
    pub in_combat: bool,
    pub timestamp: DateTime<Utc>,
}

impl StatsSnapshot {
    /// Percentages are clamped to `[0, 100]`.
    pub fn new(
        health: f32,
        endurance: f32,
        experience: f32,
        enemy_targeted: bool,
        in_combat: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            health: clamp_percent(health),
            endurance: clamp_percent(endurance),
            experience: clamp_percent(experience),
            enemy_targeted,
            in_combat,
            timestamp,
        }
    }
}

pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
