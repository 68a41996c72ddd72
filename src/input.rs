//! Keyboard input primitives.
//!
//! Timed holds are modelled as down + sleep + up by the controllers; devices
//! only expose the three edge events.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Space,
    Tab,
    Escape,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Space => write!(f, "space"),
            Key::Tab => write!(f, "tab"),
            Key::Escape => write!(f, "esc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEvent {
    Down(Key),
    Up(Key),
    Press(Key),
}

/// A device that can inject key events. Only one execution drives it at a
/// time; implementations use interior mutability so controllers can share
/// a handle.
pub trait InputDevice: Send + Sync {
    fn key_down(&self, key: Key) -> Result<()>;
    fn key_up(&self, key: Key) -> Result<()>;
    fn key_press(&self, key: Key) -> Result<()>;
}

/// Logs and records events instead of injecting them.
#[derive(Debug, Default)]
pub struct DryRunInput {
    events: Mutex<Vec<KeyEvent>>,
}

impl DryRunInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, event: KeyEvent) -> Result<()> {
        debug!(?event, "dry-run key event");
        self.events
            .lock()
            .map_err(|e| BotError::Input(format!("event log poisoned: {e}")))?
            .push(event);
        Ok(())
    }
}

impl InputDevice for DryRunInput {
    fn key_down(&self, key: Key) -> Result<()> {
        self.record(KeyEvent::Down(key))
    }

    fn key_up(&self, key: Key) -> Result<()> {
        self.record(KeyEvent::Up(key))
    }

    fn key_press(&self, key: Key) -> Result<()> {
        self.record(KeyEvent::Press(key))
    }
}

/// OS keyboard injection.
#[cfg(target_os = "windows")]
pub struct EnigoInput {
    enigo: Mutex<enigo::Enigo>,
}

#[cfg(target_os = "windows")]
impl EnigoInput {
    pub fn new() -> Result<Self> {
        let enigo = enigo::Enigo::new(&enigo::Settings::default())
            .map_err(|e| BotError::Input(e.to_string()))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    fn send(&self, key: Key, direction: enigo::Direction) -> Result<()> {
        use enigo::Keyboard;

        let mapped = match key {
            Key::Char(c) => enigo::Key::Unicode(c),
            Key::Space => enigo::Key::Space,
            Key::Tab => enigo::Key::Tab,
            Key::Escape => enigo::Key::Escape,
        };
        let mut enigo = self
            .enigo
            .lock()
            .map_err(|e| BotError::Input(format!("input device poisoned: {e}")))?;
        enigo
            .key(mapped, direction)
            .map_err(|e| BotError::Input(e.to_string()))
    }
}

#[cfg(target_os = "windows")]
impl InputDevice for EnigoInput {
    fn key_down(&self, key: Key) -> Result<()> {
        self.send(key, enigo::Direction::Press)
    }

    fn key_up(&self, key: Key) -> Result<()> {
        self.send(key, enigo::Direction::Release)
    }

    fn key_press(&self, key: Key) -> Result<()> {
        self.send(key, enigo::Direction::Click)
    }
}

/// Open the native keyboard device for this platform.
pub fn native_input() -> Result<std::sync::Arc<dyn InputDevice>> {
    #[cfg(target_os = "windows")]
    {
        Ok(std::sync::Arc::new(EnigoInput::new()?))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Err(BotError::Input(
            "Keyboard injection only supported on Windows; use --dry-run".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_records_in_order() {
        let dev = DryRunInput::new();
        dev.key_down(Key::Char('w')).unwrap();
        dev.key_up(Key::Char('w')).unwrap();
        dev.key_press(Key::Tab).unwrap();
        assert_eq!(
            dev.events(),
            vec![
                KeyEvent::Down(Key::Char('w')),
                KeyEvent::Up(Key::Char('w')),
                KeyEvent::Press(Key::Tab),
            ]
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(Key::Char('1').to_string(), "1");
        assert_eq!(Key::Escape.to_string(), "esc");
    }
}
