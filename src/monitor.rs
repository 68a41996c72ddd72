//! Game state monitoring over fixed UI regions.
//!
//! All regions are stored twice: the reference layout measured at
//! [`REFERENCE_RESOLUTION`] and the active layout derived from it. Calibration
//! always rescales from the reference, so repeated calibration never
//! compounds.

use std::time::Duration;

use chrono::Utc;
use image::RgbImage;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::capture::Sampler;
use crate::detection::{bar_percentage, count_edges};
use crate::error::{BotError, Result};
use crate::types::{
    clamp_percent, ColorRange, Hsv, Resolution, StatsSnapshot, UiRegion, REFERENCE_RESOLUTION,
};

/// Endurance drop (percentage points) between two samples that signals combat.
pub const COMBAT_ENDURANCE_DROP: f32 = 5.0;
/// Edge pixels above which the target panel is considered rendered.
pub const TARGET_EDGE_THRESHOLD: usize = 100;
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLayout {
    pub health_bar: UiRegion,
    pub endurance_bar: UiRegion,
    pub experience_bar: UiRegion,
    pub chat_area: UiRegion,
    pub target_info: UiRegion,
}

impl Default for UiLayout {
    fn default() -> Self {
        Self {
            health_bar: UiRegion::new("health_bar", 50, 50, 200, 20),
            endurance_bar: UiRegion::new("endurance_bar", 50, 80, 200, 20),
            experience_bar: UiRegion::new("experience_bar", 50, 110, 300, 15),
            chat_area: UiRegion::new("chat_area", 10, 400, 500, 200),
            target_info: UiRegion::new("target_info", 600, 50, 200, 100),
        }
    }
}

impl UiLayout {
    pub fn regions(&self) -> [&UiRegion; 5] {
        [
            &self.health_bar,
            &self.endurance_bar,
            &self.experience_bar,
            &self.chat_area,
            &self.target_info,
        ]
    }

    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Self {
        Self {
            health_bar: self.health_bar.scaled(scale_x, scale_y),
            endurance_bar: self.endurance_bar.scaled(scale_x, scale_y),
            experience_bar: self.experience_bar.scaled(scale_x, scale_y),
            chat_area: self.chat_area.scaled(scale_x, scale_y),
            target_info: self.target_info.scaled(scale_x, scale_y),
        }
    }
}

/// HSV ranges for the bars. Health is read against two ranges because the
/// bar recolors as it depletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    pub health_red: ColorRange,
    pub health_green: ColorRange,
    pub endurance_blue: ColorRange,
    pub experience_yellow: ColorRange,
}

impl Default for ColorPalette {
    fn default() -> Self {
        let range = |name: &str, lower: Hsv, upper: Hsv| ColorRange {
            name: name.to_string(),
            lower,
            upper,
        };
        Self {
            health_red: range("health_red", Hsv::new(0, 120, 70), Hsv::new(10, 255, 255)),
            health_green: range("health_green", Hsv::new(40, 120, 70), Hsv::new(80, 255, 255)),
            endurance_blue: range(
                "endurance_blue",
                Hsv::new(100, 120, 70),
                Hsv::new(130, 255, 255),
            ),
            experience_yellow: range(
                "experience_yellow",
                Hsv::new(20, 120, 70),
                Hsv::new(30, 255, 255),
            ),
        }
    }
}

/// Anything that can report current health. Attack chains use this as their
/// cancellation check.
pub trait HealthProbe {
    fn health_percent(&self) -> Result<f32>;
}

/// One monitoring cycle: the stats plus the frame they were read from.
#[derive(Debug, Clone)]
pub struct Observation {
    pub stats: StatsSnapshot,
    pub frame: RgbImage,
}

pub struct GameStateMonitor<S> {
    sampler: S,
    reference_layout: UiLayout,
    layout: UiLayout,
    palette: ColorPalette,
    combat_drop_threshold: f32,
    poll_interval: Duration,
    last_endurance: Option<f32>,
}

impl<S: Sampler> GameStateMonitor<S> {
    pub fn new(sampler: S) -> Self {
        Self::with_layout(sampler, UiLayout::default(), ColorPalette::default())
    }

    pub fn with_layout(sampler: S, layout: UiLayout, palette: ColorPalette) -> Self {
        Self {
            sampler,
            reference_layout: layout.clone(),
            layout,
            palette,
            combat_drop_threshold: COMBAT_ENDURANCE_DROP,
            poll_interval: HEALTH_POLL_INTERVAL,
            last_endurance: None,
        }
    }

    pub fn with_combat_threshold(mut self, points: f32) -> Self {
        self.combat_drop_threshold = points;
        self
    }

    pub fn layout(&self) -> &UiLayout {
        &self.layout
    }

    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    fn full_frame(&self) -> Result<RgbImage> {
        self.sampler.capture(None)
    }

    pub fn health_from(&self, frame: &RgbImage) -> f32 {
        let region = &self.layout.health_bar;
        let green = bar_percentage(frame, &self.palette.health_green, region);
        let red = bar_percentage(frame, &self.palette.health_red, region);
        green.max(red)
    }

    pub fn endurance_from(&self, frame: &RgbImage) -> f32 {
        bar_percentage(frame, &self.palette.endurance_blue, &self.layout.endurance_bar)
    }

    pub fn experience_from(&self, frame: &RgbImage) -> f32 {
        bar_percentage(
            frame,
            &self.palette.experience_yellow,
            &self.layout.experience_bar,
        )
    }

    pub fn health_percent(&self) -> Result<f32> {
        let frame = self.full_frame()?;
        Ok(self.health_from(&frame))
    }

    pub fn endurance_percent(&self) -> Result<f32> {
        let frame = self.full_frame()?;
        Ok(self.endurance_from(&frame))
    }

    pub fn experience_percent(&self) -> Result<f32> {
        let frame = self.full_frame()?;
        Ok(self.experience_from(&frame))
    }

    /// Health, endurance and experience from a single capture. The combat
    /// and target flags are left false; see [`Self::observe`].
    pub fn stats(&self) -> Result<StatsSnapshot> {
        let frame = self.full_frame()?;
        Ok(StatsSnapshot::new(
            self.health_from(&frame),
            self.endurance_from(&frame),
            self.experience_from(&frame),
            false,
            false,
            Utc::now(),
        ))
    }

    /// True when the target panel shows enough edges to be a rendered
    /// target (name text, icons, bars).
    pub fn enemy_targeted(&self) -> Result<bool> {
        let panel = self.sampler.capture(Some(&self.layout.target_info))?;
        Ok(self.panel_shows_target(&panel))
    }

    /// Same check as [`Self::enemy_targeted`] on an already captured frame.
    pub fn targeted_from(&self, frame: &RgbImage) -> bool {
        let r = &self.layout.target_info;
        let panel = image::imageops::crop_imm(frame, r.x, r.y, r.width, r.height).to_image();
        self.panel_shows_target(&panel)
    }

    fn panel_shows_target(&self, panel: &RgbImage) -> bool {
        let edges = count_edges(panel);
        debug!(edges, threshold = TARGET_EDGE_THRESHOLD, "target panel edges");
        edges > TARGET_EDGE_THRESHOLD
    }

    pub fn in_combat(&mut self) -> Result<bool> {
        let endurance = self.endurance_percent()?;
        Ok(self.note_endurance(endurance))
    }

    /// Compare against the baseline. The first sample only seeds it, and a
    /// sample that reads as a drop leaves it untouched, so a sustained drain
    /// keeps reporting combat.
    fn note_endurance(&mut self, endurance: f32) -> bool {
        let endurance = clamp_percent(endurance);
        let dropped = self
            .last_endurance
            .map(|last| last - endurance > self.combat_drop_threshold)
            .unwrap_or(false);
        if !dropped {
            self.last_endurance = Some(endurance);
        }
        dropped
    }

    /// Full per-cycle reading from a single capture. The combat heuristic is
    /// fed from the same endurance value.
    pub fn observe(&mut self) -> Result<Observation> {
        let frame = self.full_frame()?;
        let health = self.health_from(&frame);
        let endurance = self.endurance_from(&frame);
        let experience = self.experience_from(&frame);
        let enemy_targeted = self.targeted_from(&frame);
        let in_combat = self.note_endurance(endurance);

        let stats = StatsSnapshot::new(
            health,
            endurance,
            experience,
            enemy_targeted,
            in_combat,
            Utc::now(),
        );
        Ok(Observation { stats, frame })
    }

    /// Poll health until it reaches `target` or `timeout` elapses.
    pub async fn wait_for_health_recovery(&self, target: f32, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            let health = self.health_percent()?;
            if health >= target {
                info!(health, target, "health recovered");
                return Ok(true);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        info!(target, timeout_secs = timeout.as_secs_f32(), "health recovery timed out");
        Ok(false)
    }

    /// Rescale every region from the reference layout to `resolution`.
    pub fn calibrate(&mut self, resolution: Resolution) -> Result<()> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(BotError::InvalidInput(format!(
                "cannot calibrate to {}x{}",
                resolution.width, resolution.height
            )));
        }
        let scale_x = f64::from(resolution.width) / f64::from(REFERENCE_RESOLUTION.width);
        let scale_y = f64::from(resolution.height) / f64::from(REFERENCE_RESOLUTION.height);
        let layout = self.reference_layout.scaled(scale_x, scale_y);
        if let Some(collapsed) = layout.regions().into_iter().find(|r| r.is_empty()) {
            return Err(BotError::InvalidInput(format!(
                "region {} collapses to {}x{} at {}x{}",
                collapsed.name,
                collapsed.width,
                collapsed.height,
                resolution.width,
                resolution.height
            )));
        }
        self.layout = layout;
        info!(
            width = resolution.width,
            height = resolution.height,
            scale_x,
            scale_y,
            "calibrated UI regions"
        );
        Ok(())
    }
}

impl<S: Sampler> HealthProbe for GameStateMonitor<S> {
    fn health_percent(&self) -> Result<f32> {
        GameStateMonitor::health_percent(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
    const YELLOW: Rgb<u8> = Rgb([255, 200, 0]);

    /// Returns queued frames in order, then keeps repeating the last one.
    struct ScriptedSampler {
        frames: Mutex<VecDeque<RgbImage>>,
        last: Mutex<Option<RgbImage>>,
    }

    impl ScriptedSampler {
        fn new(frames: Vec<RgbImage>) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
                last: Mutex::new(None),
            }
        }
    }

    impl Sampler for ScriptedSampler {
        fn capture(&self, region: Option<&UiRegion>) -> Result<RgbImage> {
            let mut frames = self.frames.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = frames.pop_front() {
                *last = Some(next);
            }
            let frame = last
                .clone()
                .ok_or_else(|| BotError::Capture("no frames".into()))?;
            Ok(match region {
                Some(r) => {
                    image::imageops::crop_imm(&frame, r.x, r.y, r.width, r.height).to_image()
                }
                None => frame,
            })
        }
    }

    struct FailingSampler;

    impl Sampler for FailingSampler {
        fn capture(&self, _region: Option<&UiRegion>) -> Result<RgbImage> {
            Err(BotError::Capture("display lost".into()))
        }
    }

    fn paint(frame: &mut RgbImage, region: &UiRegion, percent: u32, color: Rgb<u8>) {
        let filled = region.width * percent / 100;
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + filled {
                frame.put_pixel(x, y, color);
            }
        }
    }

    fn frame(health: (u32, Rgb<u8>), endurance: u32, experience: u32) -> RgbImage {
        let layout = UiLayout::default();
        let mut img = RgbImage::new(1920, 1080);
        paint(&mut img, &layout.health_bar, health.0, health.1);
        paint(&mut img, &layout.endurance_bar, endurance, BLUE);
        paint(&mut img, &layout.experience_bar, experience, YELLOW);
        img
    }

    #[test]
    fn test_health_takes_max_of_colors() {
        let monitor = GameStateMonitor::new(ScriptedSampler::new(vec![frame((75, GREEN), 0, 0)]));
        assert!((monitor.health_percent().unwrap() - 75.0).abs() < 0.01);

        let monitor = GameStateMonitor::new(ScriptedSampler::new(vec![frame((60, RED), 0, 0)]));
        assert!((monitor.health_percent().unwrap() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_stats_bundle() {
        let monitor = GameStateMonitor::new(ScriptedSampler::new(vec![frame((50, GREEN), 40, 30)]));
        let stats = monitor.stats().unwrap();
        assert!((stats.health - 50.0).abs() < 0.01);
        assert!((stats.endurance - 40.0).abs() < 0.01);
        assert!((stats.experience - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_in_combat_seeds_then_detects_drop() {
        let sampler = ScriptedSampler::new(vec![
            frame((100, GREEN), 80, 0),
            frame((100, GREEN), 70, 0),
            frame((100, GREEN), 69, 0),
        ]);
        let mut monitor = GameStateMonitor::new(sampler);
        assert!(!monitor.in_combat().unwrap());
        assert!(monitor.in_combat().unwrap());
        assert!(monitor.in_combat().unwrap());
    }

    #[test]
    fn test_in_combat_holds_through_sustained_drain() {
        let sampler = ScriptedSampler::new(
            [80, 70, 69, 68, 90, 88]
                .into_iter()
                .map(|e| frame((100, GREEN), e, 0))
                .collect(),
        );
        let mut monitor = GameStateMonitor::new(sampler);
        let seen: Vec<bool> = (0..6).map(|_| monitor.in_combat().unwrap()).collect();
        // 90 is a rise, so it becomes the new baseline and 88 is no drop.
        assert_eq!(seen, vec![false, true, true, true, false, false]);
    }

    #[test]
    fn test_in_combat_small_drop_is_not_combat() {
        let sampler = ScriptedSampler::new(vec![frame((100, GREEN), 80, 0), frame((100, GREEN), 79, 0)]);
        let mut monitor = GameStateMonitor::new(sampler);
        assert!(!monitor.in_combat().unwrap());
        assert!(!monitor.in_combat().unwrap());
    }

    #[test]
    fn test_combat_baseline_is_per_instance() {
        let mut a = GameStateMonitor::new(ScriptedSampler::new(vec![frame((100, GREEN), 80, 0)]));
        let mut b = GameStateMonitor::new(ScriptedSampler::new(vec![frame((100, GREEN), 10, 0)]));
        assert!(!a.in_combat().unwrap());
        assert!(!b.in_combat().unwrap());
    }

    #[test]
    fn test_enemy_targeted_from_panel_edges() {
        let layout = UiLayout::default();
        let mut busy = RgbImage::new(1920, 1080);
        let t = &layout.target_info;
        for y in t.y..t.y + t.height {
            for x in t.x..t.x + t.width {
                if ((x - t.x) / 10 + (y - t.y) / 10) % 2 == 0 {
                    busy.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        let monitor = GameStateMonitor::new(ScriptedSampler::new(vec![busy.clone()]));
        assert!(monitor.enemy_targeted().unwrap());
        assert!(monitor.targeted_from(&busy));

        let monitor = GameStateMonitor::new(ScriptedSampler::new(vec![RgbImage::new(1920, 1080)]));
        assert!(!monitor.enemy_targeted().unwrap());
    }

    #[test]
    fn test_observe_reads_one_frame() {
        let sampler = ScriptedSampler::new(vec![frame((25, RED), 90, 10)]);
        let mut monitor = GameStateMonitor::new(sampler);
        let obs = monitor.observe().unwrap();
        assert!((obs.stats.health - 25.0).abs() < 0.01);
        assert!(!obs.stats.in_combat);
        assert!(!obs.stats.enemy_targeted);
        assert_eq!(obs.frame.dimensions(), (1920, 1080));
    }

    #[test]
    fn test_capture_error_propagates() {
        let mut monitor = GameStateMonitor::new(FailingSampler);
        assert!(matches!(monitor.health_percent(), Err(BotError::Capture(_))));
        assert!(matches!(monitor.observe(), Err(BotError::Capture(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_health_recovery_succeeds() {
        let sampler = ScriptedSampler::new(vec![
            frame((40, RED), 0, 0),
            frame((60, GREEN), 0, 0),
            frame((85, GREEN), 0, 0),
        ]);
        let monitor = GameStateMonitor::new(sampler);
        let recovered = monitor
            .wait_for_health_recovery(80.0, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(recovered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_health_recovery_times_out() {
        let monitor = GameStateMonitor::new(ScriptedSampler::new(vec![frame((50, GREEN), 0, 0)]));
        let start = Instant::now();
        let recovered = monitor
            .wait_for_health_recovery(80.0, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!recovered);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_calibrate_half_resolution() {
        let mut monitor = GameStateMonitor::new(FailingSampler);
        monitor.calibrate(Resolution::new(960, 540)).unwrap();
        let health = &monitor.layout().health_bar;
        assert_eq!((health.x, health.y, health.width, health.height), (25, 25, 100, 10));
        let exp = &monitor.layout().experience_bar;
        assert_eq!((exp.x, exp.y, exp.width, exp.height), (25, 55, 150, 7));
    }

    #[test]
    fn test_calibrate_is_idempotent() {
        let mut once = GameStateMonitor::new(FailingSampler);
        once.calibrate(Resolution::new(960, 540)).unwrap();

        let mut twice = GameStateMonitor::new(FailingSampler);
        twice.calibrate(Resolution::new(960, 540)).unwrap();
        twice.calibrate(Resolution::new(960, 540)).unwrap();
        assert_eq!(once.layout(), twice.layout());

        twice.calibrate(REFERENCE_RESOLUTION).unwrap();
        assert_eq!(twice.layout(), &UiLayout::default());
    }

    #[test]
    fn test_calibrate_rejects_collapsed_regions() {
        let mut monitor = GameStateMonitor::new(FailingSampler);
        monitor.calibrate(Resolution::new(960, 540)).unwrap();
        let before = monitor.layout().clone();

        let err = monitor.calibrate(Resolution::new(10, 10)).unwrap_err();
        assert!(matches!(err, BotError::InvalidInput(ref m) if m.contains("health_bar")));
        assert_eq!(monitor.layout(), &before);
    }
}
