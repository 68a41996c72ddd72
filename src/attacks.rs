//! Hotkey abilities and timed attack chains.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{BotError, Result};
use crate::input::{InputDevice, Key};
use crate::monitor::HealthProbe;

/// Health below which an interruptible chain stops early.
pub const CRITICAL_HEALTH: f32 = 20.0;
/// Animation wait for a slot with no configured timing.
pub const DEFAULT_ABILITY_TIMING: f32 = 1.5;
/// Health below which continuous attack mode stops.
pub const CONTINUOUS_STOP_HEALTH: f32 = 15.0;
/// Pause between the two buffs of [`AttackController::buff_rotation`].
const BUFF_GAP: Duration = Duration::from_secs(1);

/// Seconds as a sleep duration. Negative, NaN, infinite and oversized
/// values are invalid input.
fn wait_duration(seconds: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(seconds)
        .map_err(|e| BotError::InvalidInput(format!("invalid wait of {seconds}s: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    pub slot: u8,
    /// Seconds to wait after the press.
    pub wait: f32,
}

impl ChainStep {
    pub const fn new(slot: u8, wait: f32) -> Self {
        Self { slot, wait }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackChain {
    pub name: String,
    pub steps: Vec<ChainStep>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainOutcome {
    Completed,
    /// Stopped before `step` because health read `health`.
    Interrupted { step: usize, health: f32 },
}

fn default_chains() -> Vec<AttackChain> {
    let chain = |name: &str, steps: &[(u8, f32)]| AttackChain {
        name: name.to_string(),
        steps: steps.iter().map(|&(s, w)| ChainStep::new(s, w)).collect(),
    };
    vec![
        chain("basic_combo", &[(1, 1.2), (2, 1.5), (3, 2.0)]),
        chain("power_combo", &[(4, 2.0), (5, 2.5), (6, 3.0)]),
        chain("aoe_combo", &[(7, 2.5), (8, 3.0), (9, 1.0)]),
        chain("quick_strike", &[(1, 0.8), (2, 0.8)]),
        chain("heavy_attack", &[(6, 3.5)]),
        chain("defensive", &[(5, 2.0), (3, 1.5)]),
        chain("ranged_combo", &[(2, 1.0), (4, 1.5), (7, 2.0)]),
        chain("melee_combo", &[(1, 1.2), (3, 1.8), (5, 2.2)]),
    ]
}

pub struct AttackController {
    input: Arc<dyn InputDevice>,
    hotkeys: BTreeMap<u8, Key>,
    chains: BTreeMap<String, AttackChain>,
    timings: BTreeMap<u8, f32>,
    target_key: Key,
    cancel_key: Key,
}

impl AttackController {
    pub fn new(input: Arc<dyn InputDevice>) -> Self {
        let hotkeys = (1..=9u8)
            .map(|slot| (slot, Key::Char(char::from(b'0' + slot))))
            .collect();
        let timings = [
            (1, 1.2),
            (2, 1.0),
            (3, 1.8),
            (4, 1.5),
            (5, 2.2),
            (6, 3.5),
            (7, 2.5),
            (8, 3.0),
            (9, 1.0),
        ]
        .into_iter()
        .collect();
        let chains = default_chains()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        Self {
            input,
            hotkeys,
            chains,
            timings,
            target_key: Key::Tab,
            cancel_key: Key::Escape,
        }
    }

    fn key_for(&self, slot: u8) -> Result<Key> {
        self.hotkeys
            .get(&slot)
            .copied()
            .ok_or_else(|| BotError::InvalidInput(format!("Invalid ability number: {slot}")))
    }

    pub fn timing(&self, slot: u8) -> f32 {
        self.timings
            .get(&slot)
            .copied()
            .unwrap_or(DEFAULT_ABILITY_TIMING)
    }

    pub fn chain(&self, name: &str) -> Option<&AttackChain> {
        self.chains.get(name)
    }

    pub fn available_chains(&self) -> Vec<&str> {
        self.chains.keys().map(String::as_str).collect()
    }

    /// Press the hotkey for `slot`, then optionally wait out its animation.
    pub async fn use_ability(&self, slot: u8, wait_for_animation: bool) -> Result<()> {
        let key = self.key_for(slot)?;
        self.input.key_press(key)?;
        if wait_for_animation {
            sleep(wait_duration(self.timing(slot))?).await;
        }
        Ok(())
    }

    async fn run_steps(&self, steps: &[ChainStep], probe: Option<&dyn HealthProbe>) -> Result<ChainOutcome> {
        for (i, step) in steps.iter().enumerate() {
            if let Some(probe) = probe {
                match probe.health_percent() {
                    Ok(health) if health < CRITICAL_HEALTH => {
                        info!(step = i, health, "Low health detected, interrupting attack chain");
                        return Ok(ChainOutcome::Interrupted { step: i, health });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "health check failed, continuing chain"),
                }
            }
            self.use_ability(step.slot, false).await?;
            sleep(wait_duration(step.wait)?).await;
        }
        Ok(ChainOutcome::Completed)
    }

    /// Run a registered chain. With a probe, health is checked before every
    /// step and the rest of the chain is abandoned below [`CRITICAL_HEALTH`].
    pub async fn execute_chain(&self, name: &str, probe: Option<&dyn HealthProbe>) -> Result<ChainOutcome> {
        let chain = self
            .chains
            .get(name)
            .ok_or_else(|| BotError::InvalidInput(format!("Unknown attack chain: {name}")))?;
        self.run_steps(&chain.steps, probe).await
    }

    pub async fn custom_sequence(&self, steps: &[ChainStep]) -> Result<()> {
        self.validate(steps)?;
        self.run_steps(steps, None).await.map(|_| ())
    }

    pub async fn rapid_fire(&self, slot: u8, count: u32, interval: f32) -> Result<()> {
        self.key_for(slot)?;
        let pause = wait_duration(interval)?;
        for _ in 0..count {
            self.use_ability(slot, false).await?;
            sleep(pause).await;
        }
        Ok(())
    }

    /// Cycle through `slots`, waiting each ability's animation.
    pub async fn rotation(&self, slots: &[u8], cycles: u32) -> Result<()> {
        for slot in slots {
            self.key_for(*slot)?;
        }
        for _ in 0..cycles {
            for slot in slots {
                self.use_ability(*slot, true).await?;
            }
        }
        Ok(())
    }

    /// Pick a chain by how many enemies are engaged.
    pub async fn smart_attack(&self, enemy_count: u32, probe: Option<&dyn HealthProbe>) -> Result<ChainOutcome> {
        let name = match enemy_count {
            0 | 1 => "basic_combo",
            2 | 3 => "ranged_combo",
            _ => "aoe_combo",
        };
        self.execute_chain(name, probe).await
    }

    pub async fn target_nearest(&self) -> Result<()> {
        self.input.key_press(self.target_key)?;
        sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    pub async fn target_and_attack(&self, chain: &str, probe: Option<&dyn HealthProbe>) -> Result<ChainOutcome> {
        if !self.chains.contains_key(chain) {
            return Err(BotError::InvalidInput(format!("Unknown attack chain: {chain}")));
        }
        self.target_nearest().await?;
        self.execute_chain(chain, probe).await
    }

    /// Cancel the current animation.
    pub async fn interrupt_current(&self) -> Result<()> {
        self.input.key_press(self.cancel_key)?;
        sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    /// Repeat `name` until `duration` has passed, pausing between runs.
    /// With a probe, stops early once health reads below
    /// [`CONTINUOUS_STOP_HEALTH`]. Returns the number of completed runs.
    pub async fn continuous_attack_mode(
        &self,
        name: &str,
        duration: Duration,
        pause_between: Duration,
        probe: Option<&dyn HealthProbe>,
    ) -> Result<u32> {
        if !self.chains.contains_key(name) {
            return Err(BotError::InvalidInput(format!("Unknown attack chain: {name}")));
        }
        let start = Instant::now();
        let mut runs = 0;
        while start.elapsed() < duration {
            self.execute_chain(name, None).await?;
            runs += 1;
            sleep(pause_between).await;

            if let Some(probe) = probe {
                match probe.health_percent() {
                    Ok(health) if health < CONTINUOUS_STOP_HEALTH => {
                        info!(chain = name, runs, health, "Critical health, stopping continuous attacks");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "health check failed, continuing attacks"),
                }
            }
        }
        Ok(runs)
    }

    /// Use `primary` when `condition` holds, `backup` otherwise. A failing
    /// condition or a failed primary press also falls through to `backup`.
    /// Returns the slot that was used.
    pub async fn conditional_attack<F>(&self, primary: u8, backup: u8, condition: F) -> Result<u8>
    where
        F: FnOnce() -> Result<bool>,
    {
        let use_primary = match condition() {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "attack condition failed, using backup");
                false
            }
        };
        if use_primary {
            match self.use_ability(primary, true).await {
                Ok(()) => return Ok(primary),
                Err(e) => warn!(slot = primary, error = %e, "primary ability failed, using backup"),
            }
        }
        self.use_ability(backup, true).await?;
        Ok(backup)
    }

    /// Utility slots 9 then 8.
    pub async fn buff_rotation(&self) -> Result<()> {
        self.use_ability(9, true).await?;
        sleep(BUFF_GAP).await;
        self.use_ability(8, true).await
    }

    /// Highest damage chain.
    pub async fn burst_combo(&self) -> Result<ChainOutcome> {
        self.execute_chain("power_combo", None).await
    }

    pub async fn aoe_clear(&self) -> Result<ChainOutcome> {
        self.execute_chain("aoe_combo", None).await
    }

    /// Basic chain, abandoned at critical health.
    pub async fn safe_attack(&self, probe: &dyn HealthProbe) -> Result<ChainOutcome> {
        self.execute_chain("basic_combo", Some(probe)).await
    }

    pub async fn emergency_attack(&self) -> Result<ChainOutcome> {
        self.execute_chain("quick_strike", None).await
    }

    fn validate(&self, steps: &[ChainStep]) -> Result<()> {
        for step in steps {
            self.key_for(step.slot)?;
            wait_duration(step.wait)?;
        }
        Ok(())
    }

    /// Register (or replace) a chain. Every slot must have a hotkey.
    pub fn add_chain(&mut self, name: impl Into<String>, steps: Vec<ChainStep>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BotError::InvalidInput("chain name must not be empty".to_string()));
        }
        self.validate(&steps)?;
        self.chains.insert(name.clone(), AttackChain { name, steps });
        Ok(())
    }

    pub fn modify_ability_timing(&mut self, slot: u8, seconds: f32) -> Result<()> {
        self.key_for(slot)?;
        wait_duration(seconds)?;
        self.timings.insert(slot, seconds);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{DryRunInput, KeyEvent};
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct HealthSequence(Mutex<Vec<f32>>);

    impl HealthSequence {
        fn new(mut values: Vec<f32>) -> Self {
            values.reverse();
            Self(Mutex::new(values))
        }
    }

    impl HealthProbe for HealthSequence {
        fn health_percent(&self) -> Result<f32> {
            let mut v = self.0.lock().unwrap();
            Ok(if v.len() > 1 { v.pop().unwrap() } else { v[0] })
        }
    }

    fn controller() -> (Arc<DryRunInput>, AttackController) {
        let dev = Arc::new(DryRunInput::new());
        let ctl = AttackController::new(dev.clone());
        (dev, ctl)
    }

    fn presses(dev: &DryRunInput) -> Vec<Key> {
        dev.events()
            .into_iter()
            .filter_map(|e| match e {
                KeyEvent::Press(k) => Some(k),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_presses_in_order_with_waits() {
        let (dev, ctl) = controller();
        let start = Instant::now();
        let outcome = ctl.execute_chain("basic_combo", None).await.unwrap();
        assert_eq!(outcome, ChainOutcome::Completed);
        assert_eq!(presses(&dev), vec![Key::Char('1'), Key::Char('2'), Key::Char('3')]);
        assert!(start.elapsed() >= Duration::from_millis(4700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_interrupts_on_low_health() {
        let (dev, ctl) = controller();
        let probe = HealthSequence::new(vec![90.0, 15.0]);
        let outcome = ctl.execute_chain("power_combo", Some(&probe)).await.unwrap();
        assert_eq!(outcome, ChainOutcome::Interrupted { step: 1, health: 15.0 });
        assert_eq!(presses(&dev), vec![Key::Char('4')]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_chain_and_slot() {
        let (dev, ctl) = controller();
        assert!(matches!(
            ctl.execute_chain("nope", None).await,
            Err(BotError::InvalidInput(_))
        ));
        assert!(matches!(ctl.use_ability(0, false).await, Err(BotError::InvalidInput(_))));
        assert!(matches!(ctl.use_ability(10, false).await, Err(BotError::InvalidInput(_))));
        assert!(dev.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_chain_at_runtime() {
        let (dev, mut ctl) = controller();
        ctl.add_chain("opener", vec![ChainStep::new(9, 0.5), ChainStep::new(1, 0.5)])
            .unwrap();
        assert!(ctl.available_chains().contains(&"opener"));
        ctl.execute_chain("opener", None).await.unwrap();
        assert_eq!(presses(&dev), vec![Key::Char('9'), Key::Char('1')]);

        let err = ctl.add_chain("broken", vec![ChainStep::new(12, 1.0)]);
        assert!(matches!(err, Err(BotError::InvalidInput(_))));
        assert!(ctl.chain("broken").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_use_ability_waits_for_configured_timing() {
        let (_dev, mut ctl) = controller();
        ctl.modify_ability_timing(6, 0.25).unwrap();
        let start = Instant::now();
        ctl.use_ability(6, true).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250) && elapsed < Duration::from_millis(260));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_fire_and_target() {
        let (dev, ctl) = controller();
        ctl.rapid_fire(2, 3, 0.5).await.unwrap();
        ctl.target_and_attack("quick_strike", None).await.unwrap();
        assert_eq!(
            presses(&dev),
            vec![
                Key::Char('2'),
                Key::Char('2'),
                Key::Char('2'),
                Key::Tab,
                Key::Char('1'),
                Key::Char('2'),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_waits_are_rejected() {
        let (dev, mut ctl) = controller();

        let err = ctl.add_chain("slow", vec![ChainStep::new(1, 1e30)]);
        assert!(matches!(err, Err(BotError::InvalidInput(_))));
        assert!(ctl.chain("slow").is_none());
        assert!(ctl.add_chain("nan", vec![ChainStep::new(1, f32::NAN)]).is_err());
        assert!(ctl.add_chain("neg", vec![ChainStep::new(1, -0.5)]).is_err());

        assert!(matches!(
            ctl.modify_ability_timing(6, 1e30),
            Err(BotError::InvalidInput(_))
        ));
        assert_eq!(ctl.timing(6), 3.5);
        ctl.use_ability(6, true).await.unwrap();

        assert!(ctl.rapid_fire(2, 3, 1e30).await.is_err());
        assert!(ctl.custom_sequence(&[ChainStep::new(1, f32::INFINITY)]).await.is_err());
        assert_eq!(presses(&dev), vec![Key::Char('6')]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_mode_runs_for_duration() {
        let (dev, ctl) = controller();
        let runs = ctl
            .continuous_attack_mode(
                "quick_strike",
                Duration::from_secs(5),
                Duration::from_millis(500),
                None,
            )
            .await
            .unwrap();
        // Each run is 1.6 s of chain plus the 0.5 s pause.
        assert_eq!(runs, 3);
        assert_eq!(presses(&dev).len(), 6);

        assert!(matches!(
            ctl.continuous_attack_mode("nope", Duration::from_secs(1), Duration::ZERO, None)
                .await,
            Err(BotError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_mode_stops_at_critical_health() {
        let (dev, ctl) = controller();
        let health = HealthSequence::new(vec![90.0, 14.0]);
        let runs = ctl
            .continuous_attack_mode(
                "quick_strike",
                Duration::from_secs(30),
                Duration::from_millis(500),
                Some(&health),
            )
            .await
            .unwrap();
        assert_eq!(runs, 2);
        assert_eq!(presses(&dev).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditional_attack_picks_slot() {
        let (dev, ctl) = controller();
        assert_eq!(ctl.conditional_attack(4, 1, || Ok(true)).await.unwrap(), 4);
        assert_eq!(ctl.conditional_attack(4, 1, || Ok(false)).await.unwrap(), 1);
        let fallback = ctl
            .conditional_attack(4, 2, || Err(BotError::Capture("display lost".into())))
            .await
            .unwrap();
        assert_eq!(fallback, 2);
        // Primary without a hotkey falls through to the backup.
        assert_eq!(ctl.conditional_attack(12, 3, || Ok(true)).await.unwrap(), 3);
        assert_eq!(
            presses(&dev),
            vec![Key::Char('4'), Key::Char('1'), Key::Char('2'), Key::Char('3')]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_buff_rotation_order_and_timing() {
        let (dev, ctl) = controller();
        let start = Instant::now();
        ctl.buff_rotation().await.unwrap();
        let elapsed = start.elapsed();
        // Slot 9 animation, the gap, then slot 8 animation.
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5100));
        assert_eq!(presses(&dev), vec![Key::Char('9'), Key::Char('8')]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_named_presets() {
        let (dev, ctl) = controller();
        ctl.burst_combo().await.unwrap();
        ctl.aoe_clear().await.unwrap();
        ctl.emergency_attack().await.unwrap();
        let digits: String = presses(&dev).iter().map(ToString::to_string).collect();
        assert_eq!(digits, "45678912");

        let (dev, ctl) = controller();
        let outcome = ctl.safe_attack(&HealthSequence::new(vec![10.0])).await.unwrap();
        assert_eq!(outcome, ChainOutcome::Interrupted { step: 0, health: 10.0 });
        assert!(dev.events().is_empty());
    }

    #[test]
    fn test_default_chains_registered() {
        let (_dev, ctl) = controller();
        assert_eq!(ctl.available_chains().len(), 8);
        assert_eq!(ctl.chain("heavy_attack").unwrap().steps, vec![ChainStep::new(6, 3.5)]);
    }
}
