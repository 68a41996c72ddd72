//! COH Core - Screen-aware gameplay agent for City of Heroes
//!
//! Handles the full decision cycle:
//! - Screen capture and HSV bar detection
//! - Scenario classification and model-backed decisions
//! - Keyboard movement and attack chains
//! - Session logging

pub mod attacks;
pub mod capture;
pub mod config;
pub mod detection;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod inference;
pub mod input;
pub mod monitor;
pub mod movement;
pub mod pipeline;
pub mod scenario;
pub mod session;
pub mod session_log;
pub mod types;

pub use capture::{Sampler, ScreenCapture};
pub use config::BotConfig;
pub use dispatcher::ActionDispatcher;
pub use engine::DecisionEngine;
pub use error::{BotError, Result};
pub use inference::{InferenceClient, NovaClient};
pub use input::{DryRunInput, InputDevice};
pub use monitor::{GameStateMonitor, HealthProbe};
pub use scenario::{Action, Decision, Scenario};
pub use session::{GameplayBot, SessionSummary, StopReason};
pub use session_log::SessionLog;
pub use types::{Resolution, StatsSnapshot};
