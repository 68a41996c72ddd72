//! Scenario classification and the per-scenario action vocabularies.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::types::StatsSnapshot;

pub const RECOVERY_HEALTH_BELOW: f32 = 30.0;
pub const RECOVERY_ENDURANCE_BELOW: f32 = 20.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scenario {
    Recovery,
    Combat,
    Exploration,
}

impl Scenario {
    /// First match wins: recovery, then combat, then exploration.
    pub fn classify(stats: &StatsSnapshot) -> Self {
        if stats.health < RECOVERY_HEALTH_BELOW || stats.endurance < RECOVERY_ENDURANCE_BELOW {
            Self::Recovery
        } else if stats.in_combat || stats.enemy_targeted {
            Self::Combat
        } else {
            Self::Exploration
        }
    }

    pub fn allowed_actions(self) -> &'static [Action] {
        use Action::*;
        match self {
            Self::Combat => &[
                Attack,
                PowerCombo,
                AoeCombo,
                Retreat,
                Rest,
                MoveForward,
                CircleStrafe,
            ],
            Self::Exploration => &[MoveForward, TurnLeft, TurnRight, Patrol, Rest, SearchEnemies],
            Self::Recovery => &[Rest, Retreat, FindCover, Wait],
        }
    }

    pub fn allows(self, action: Action) -> bool {
        self.allowed_actions().contains(&action)
    }
}

/// Every action any scenario can choose.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Attack,
    PowerCombo,
    AoeCombo,
    Retreat,
    Rest,
    MoveForward,
    CircleStrafe,
    TurnLeft,
    TurnRight,
    Patrol,
    SearchEnemies,
    FindCover,
    Wait,
}

impl Action {
    /// Safe default used whenever a decision cannot be trusted. Allowed in
    /// every scenario.
    pub const SAFE_DEFAULT: Action = Action::Rest;

    pub fn parse(name: &str) -> Option<Self> {
        Action::from_str(name.trim()).ok()
    }

    pub fn all() -> impl Iterator<Item = Action> {
        Action::iter()
    }
}

/// A validated decision for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    pub scenario: Scenario,
    pub snapshot: StatsSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Build a decision from the model's raw action name. Names outside the
    /// scenario's vocabulary become [`Action::SAFE_DEFAULT`] with a
    /// diagnostic reason.
    pub fn from_reply(
        scenario: Scenario,
        raw_action: &str,
        reason: impl Into<String>,
        snapshot: StatsSnapshot,
    ) -> Self {
        let reason = reason.into();
        match Action::parse(raw_action) {
            Some(action) if scenario.allows(action) => Self {
                action,
                reason,
                scenario,
                snapshot,
                timestamp: Utc::now(),
            },
            Some(action) => Self::fallback(
                scenario,
                snapshot,
                format!("action '{action}' not allowed in {scenario}: {reason}"),
            ),
            None => Self::fallback(
                scenario,
                snapshot,
                format!("unknown action '{raw_action}': {reason}"),
            ),
        }
    }

    pub fn fallback(scenario: Scenario, snapshot: StatsSnapshot, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = "fallback to safe default".to_string();
        }
        Self {
            action: Action::SAFE_DEFAULT,
            reason,
            scenario,
            snapshot,
            timestamp: Utc::now(),
        }
    }
}
