//! Maps decided actions onto input routines.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::attacks::{AttackController, ChainOutcome};
use crate::error::Result;
use crate::input::InputDevice;
use crate::monitor::HealthProbe;
use crate::movement::{MovementController, TurnDirection};
use crate::scenario::{Action, Decision};

/// Owns the input device for the session. `execute` takes `&mut self`, so
/// two executions can never be in flight at once.
pub struct ActionDispatcher {
    movement: MovementController,
    attacks: AttackController,
    interrupt_on_low_health: bool,
}

impl ActionDispatcher {
    pub fn new(input: Arc<dyn InputDevice>) -> Self {
        Self {
            movement: MovementController::new(input.clone()),
            attacks: AttackController::new(input),
            interrupt_on_low_health: true,
        }
    }

    pub fn with_chain_interrupt(mut self, enabled: bool) -> Self {
        self.interrupt_on_low_health = enabled;
        self
    }

    pub fn movement(&self) -> &MovementController {
        &self.movement
    }

    pub fn attacks(&self) -> &AttackController {
        &self.attacks
    }

    pub fn attacks_mut(&mut self) -> &mut AttackController {
        &mut self.attacks
    }

    async fn chain(&self, name: &str, probe: &dyn HealthProbe) -> Result<()> {
        let probe = self.interrupt_on_low_health.then_some(probe);
        if let ChainOutcome::Interrupted { step, health } =
            self.attacks.execute_chain(name, probe).await?
        {
            info!(chain = name, step, health, "attack chain interrupted");
        }
        Ok(())
    }

    async fn run(&mut self, action: Action, probe: &dyn HealthProbe) -> Result<()> {
        match action {
            Action::Attack => self.chain("basic_combo", probe).await,
            Action::PowerCombo => self.chain("power_combo", probe).await,
            Action::AoeCombo => self.chain("aoe_combo", probe).await,
            Action::Retreat => self.movement.move_backward(2.0).await,
            Action::Rest => {
                sleep(Duration::from_secs(3)).await;
                Ok(())
            }
            Action::MoveForward => self.movement.move_forward(1.5).await,
            Action::CircleStrafe => {
                self.movement
                    .circle_strafe(2.0, TurnDirection::Clockwise)
                    .await
            }
            Action::TurnLeft => self.movement.turn_left(45.0).await,
            Action::TurnRight => self.movement.turn_right(45.0).await,
            Action::Patrol => self.movement.patrol().await,
            Action::SearchEnemies => self.attacks.target_nearest().await,
            Action::FindCover => self.movement.move_backward(3.0).await,
            Action::Wait => {
                sleep(Duration::from_secs(2)).await;
                Ok(())
            }
        }
    }

    /// Perform the decision's action. False if the routine failed.
    pub async fn execute(&mut self, decision: &Decision, probe: &dyn HealthProbe) -> bool {
        self.execute_action(decision.action, probe).await
    }

    pub async fn execute_action(&mut self, action: Action, probe: &dyn HealthProbe) -> bool {
        match self.run(action, probe).await {
            Ok(()) => true,
            Err(e) => {
                warn!(action = %action, error = %e, "Action execution error");
                false
            }
        }
    }

    /// Execute by name. Unknown names are reported and produce no input.
    pub async fn execute_named(&mut self, name: &str, probe: &dyn HealthProbe) -> bool {
        match Action::parse(name) {
            Some(action) => self.execute_action(action, probe).await,
            None => {
                warn!(action = name, "Unknown action");
                false
            }
        }
    }
}
