//! Character movement as timed key holds.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::{BotError, Result};
use crate::input::{InputDevice, Key};

/// Turn rate assumed for the turn keys.
pub const TURN_DEGREES_PER_SECOND: f32 = 180.0;
/// Circle-strafe granularity.
pub const CIRCLE_STEPS_PER_SECOND: f32 = 10.0;
/// Distance at which a waypoint counts as reached.
pub const WAYPOINT_ARRIVAL_DISTANCE: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    pub forward: Key,
    pub backward: Key,
    pub strafe_left: Key,
    pub strafe_right: Key,
    pub turn_left: Key,
    pub turn_right: Key,
    pub jump: Key,
    pub sprint: Key,
    pub fly: Key,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: Key::Char('w'),
            backward: Key::Char('s'),
            strafe_left: Key::Char('a'),
            strafe_right: Key::Char('d'),
            turn_left: Key::Char('q'),
            turn_right: Key::Char('e'),
            jump: Key::Space,
            sprint: Key::Char('r'),
            fly: Key::Char('f'),
        }
    }
}

impl KeyBindings {
    fn all(&self) -> [Key; 9] {
        [
            self.forward,
            self.backward,
            self.strafe_left,
            self.strafe_right,
            self.turn_left,
            self.turn_right,
            self.jump,
            self.sprint,
            self.fly,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Clockwise,
    CounterClockwise,
}

pub struct MovementController {
    input: Arc<dyn InputDevice>,
    keys: KeyBindings,
}

/// Negative, NaN and unrepresentable durations collapse to zero.
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::ZERO)
}

impl MovementController {
    pub fn new(input: Arc<dyn InputDevice>) -> Self {
        Self::with_bindings(input, KeyBindings::default())
    }

    pub fn with_bindings(input: Arc<dyn InputDevice>, keys: KeyBindings) -> Self {
        Self { input, keys }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.keys
    }

    /// Hold `key` for `seconds`.
    async fn hold(&self, key: Key, seconds: f32) -> Result<()> {
        self.input.key_down(key)?;
        sleep(secs(seconds)).await;
        self.input.key_up(key)
    }

    pub async fn move_forward(&self, seconds: f32) -> Result<()> {
        self.hold(self.keys.forward, seconds).await
    }

    pub async fn move_backward(&self, seconds: f32) -> Result<()> {
        self.hold(self.keys.backward, seconds).await
    }

    pub async fn strafe_left(&self, seconds: f32) -> Result<()> {
        self.hold(self.keys.strafe_left, seconds).await
    }

    pub async fn strafe_right(&self, seconds: f32) -> Result<()> {
        self.hold(self.keys.strafe_right, seconds).await
    }

    pub async fn turn_left(&self, degrees: f32) -> Result<()> {
        self.hold(self.keys.turn_left, degrees / TURN_DEGREES_PER_SECOND)
            .await
    }

    pub async fn turn_right(&self, degrees: f32) -> Result<()> {
        self.hold(self.keys.turn_right, degrees / TURN_DEGREES_PER_SECOND)
            .await
    }

    pub fn jump(&self) -> Result<()> {
        self.input.key_press(self.keys.jump)
    }

    pub fn toggle_sprint(&self) -> Result<()> {
        self.input.key_press(self.keys.sprint)
    }

    pub fn toggle_fly(&self) -> Result<()> {
        self.input.key_press(self.keys.fly)
    }

    /// Orbit a target: each step nudges forward, strafes outward and turns
    /// a slice of 360 degrees, then pauses.
    pub async fn circle_strafe(&self, seconds: f32, direction: TurnDirection) -> Result<()> {
        if seconds <= 0.0 {
            return Err(BotError::InvalidInput(format!(
                "circle strafe duration must be positive, got {seconds}"
            )));
        }
        let steps = ((seconds * CIRCLE_STEPS_PER_SECOND) as u32).max(1);
        let step = seconds / steps as f32;
        let turn = 360.0 / steps as f32;

        for _ in 0..steps {
            self.move_forward(step * 0.3).await?;
            match direction {
                TurnDirection::Clockwise => {
                    self.strafe_right(step * 0.4).await?;
                    self.turn_right(turn).await?;
                }
                TurnDirection::CounterClockwise => {
                    self.strafe_left(step * 0.4).await?;
                    self.turn_left(turn).await?;
                }
            }
            sleep(secs(step * 0.3)).await;
        }
        Ok(())
    }

    /// Back away while swinging left and right to keep the target in view.
    pub async fn kite(&self) -> Result<()> {
        self.move_backward(2.0).await?;
        self.turn_left(15.0).await?;
        self.move_backward(1.0).await?;
        self.turn_right(30.0).await?;
        self.move_backward(1.0).await?;
        self.turn_left(15.0).await
    }

    pub async fn retreat(&self) -> Result<()> {
        self.move_backward(3.0).await?;
        self.turn_left(180.0).await?;
        self.move_forward(5.0).await
    }

    /// Release every bound key.
    pub fn release_all(&self) -> Result<()> {
        for key in self.keys.all() {
            self.input.key_up(key)?;
        }
        Ok(())
    }

    /// Release every movement key and stand still briefly.
    pub async fn rest(&self) -> Result<()> {
        self.release_all()?;
        sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    /// Walk a square: four legs, each followed by a right angle turn.
    pub async fn patrol(&self) -> Result<()> {
        for _ in 0..4 {
            self.move_forward(2.0).await?;
            self.turn_right(90.0).await?;
        }
        Ok(())
    }

    /// One step toward `target`. Returns true once within arrival distance.
    pub async fn navigate_to_waypoint(&self, target: (f32, f32), current: (f32, f32)) -> Result<bool> {
        let dx = target.0 - current.0;
        let dy = target.1 - current.1;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < WAYPOINT_ARRIVAL_DISTANCE {
            return Ok(true);
        }

        let angle = dy.atan2(dx).to_degrees();
        if angle > 10.0 {
            self.turn_right(angle.min(45.0)).await?;
        } else if angle < -10.0 {
            self.turn_left(angle.abs().min(45.0)).await?;
        }

        self.move_forward((distance / 20.0).min(2.0)).await?;
        Ok(false)
    }
}
