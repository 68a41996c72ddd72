//! The gameplay session: a fixed-interval loop of
//! perceive → decide → execute → log.
//!
//! Routine failures never end a session. Inference problems already degrade
//! to `rest` inside the engine and failed input routines are logged as
//! unsuccessful entries. Only capture or log-write failures stop the loop.
//! Every exit path goes through [`GameplayBot::finalize`].
//!
//! Shutdown is watched during a cycle as well as between cycles. A cycle cut
//! short this way is dropped at its next await point and never logged, so a
//! key hold may stop half way. `finalize` then releases every movement key.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::capture::Sampler;
use crate::dispatcher::ActionDispatcher;
use crate::engine::DecisionEngine;
use crate::error::Result;
use crate::monitor::GameStateMonitor;
use crate::pipeline::{CycleStage, CycleTimer, StageMetrics};
use crate::scenario::Decision;
use crate::session_log::{LogEntry, SessionLog};
use crate::types::StatsSnapshot;

/// Actions shown in the status panel.
const STATUS_HISTORY: usize = 3;
const BAR_CELLS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown signal received.
    Interrupted,
    /// Configured cycle limit reached.
    CycleLimit,
    /// Unrecoverable error.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sequence_number: u64,
    pub decision: Decision,
    pub execution_success: bool,
    pub stages: Vec<StageMetrics>,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub cycles: u64,
    pub successful: usize,
    pub log_path: PathBuf,
    pub stop: StopReason,
    pub elapsed: Duration,
}

pub struct GameplayBot<S> {
    monitor: GameStateMonitor<S>,
    engine: DecisionEngine,
    dispatcher: ActionDispatcher,
    log: SessionLog,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl<S: Sampler> GameplayBot<S> {
    pub fn new(
        monitor: GameStateMonitor<S>,
        engine: DecisionEngine,
        dispatcher: ActionDispatcher,
        log: SessionLog,
        interval: Duration,
    ) -> Self {
        Self {
            monitor,
            engine,
            dispatcher,
            log,
            interval,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    pub fn monitor(&self) -> &GameStateMonitor<S> {
        &self.monitor
    }

    /// One full cycle. Errors here are the unrecoverable kind.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut timer = CycleTimer::new();

        let started = std::time::Instant::now();
        let observation = self.monitor.observe()?;
        timer.finish(CycleStage::Perception, started);

        let started = std::time::Instant::now();
        let decision = self
            .engine
            .decide(&observation.stats, Some(&observation.frame))
            .await;
        timer.finish(CycleStage::Inference, started);

        let started = std::time::Instant::now();
        let execution_success = self.dispatcher.execute(&decision, &self.monitor).await;
        timer.finish(CycleStage::Execution, started);

        let started = std::time::Instant::now();
        let sequence_number = self
            .log
            .record(decision.clone(), execution_success)?
            .sequence_number;
        timer.finish(CycleStage::Logging, started);

        info!(
            "\n{}",
            render_status(
                &observation.stats,
                &decision,
                execution_success,
                self.log.recent(STATUS_HISTORY),
            )
        );

        Ok(CycleReport {
            sequence_number,
            decision,
            execution_success,
            stages: timer.stages().to_vec(),
        })
    }

    /// Run until `shutdown` resolves, the cycle limit is hit, or a cycle
    /// fails. Each cycle starts `interval` after the previous one started,
    /// or immediately if the previous cycle overran.
    pub async fn run<F>(mut self, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let session_start = Instant::now();
        let mut cycles: u64 = 0;

        info!(
            backend = self.engine.client_name(),
            interval_ms = self.interval.as_millis() as u64,
            max_cycles = ?self.max_cycles,
            log = %self.log.path().display(),
            "gameplay session started"
        );

        let stop = loop {
            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break StopReason::CycleLimit;
            }

            let cycle_start = Instant::now();
            let outcome = tokio::select! {
                _ = &mut shutdown => None,
                result = self.run_cycle() => Some(result),
            };
            match outcome {
                None => break StopReason::Interrupted,
                Some(Err(e)) => {
                    error!(error = %e, cycle = cycles + 1, "session stopped by unrecoverable error");
                    break StopReason::Failed(e.to_string());
                }
                Some(Ok(_)) => cycles += 1,
            }

            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break StopReason::CycleLimit;
            }

            let remaining = self.interval.saturating_sub(cycle_start.elapsed());
            let interrupted = tokio::select! {
                _ = &mut shutdown => true,
                _ = sleep(remaining) => false,
            };
            if interrupted {
                break StopReason::Interrupted;
            }
        };

        self.finalize(stop, cycles, session_start.elapsed())
    }

    /// Release held keys, make sure the log is on disk, and report.
    fn finalize(&self, stop: StopReason, cycles: u64, elapsed: Duration) -> SessionSummary {
        if let Err(e) = self.dispatcher.movement().release_all() {
            warn!(error = %e, "failed to release keys on shutdown");
        }
        if let Err(e) = self.log.flush() {
            warn!(error = %e, "failed to flush session log");
        }

        let summary = SessionSummary {
            cycles,
            successful: self.log.successes(),
            log_path: self.log.path().to_path_buf(),
            stop,
            elapsed,
        };
        info!(
            stop = ?summary.stop,
            total_actions = self.log.len(),
            successful = summary.successful,
            elapsed_s = summary.elapsed.as_secs_f32(),
            log = %summary.log_path.display(),
            "gameplay session ended"
        );
        summary
    }
}

/// Ten-cell bar, one cell per full ten percent.
pub fn render_bar(percent: f32) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 10.0) as usize).min(BAR_CELLS);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Multi-line status panel for one cycle.
pub fn render_status(
    stats: &StatsSnapshot,
    decision: &Decision,
    success: bool,
    recent: &[LogEntry],
) -> String {
    let marker = if success { "✓" } else { "✗" };
    let history = recent
        .iter()
        .map(|e| e.decision.action.as_ref())
        .collect::<Vec<&str>>()
        .join(", ");
    format!(
        "Health:     [{}] {:.1}%\n\
         Endurance:  [{}] {:.1}%\n\
         Experience: {:.1}%\n\
         Combat: {} | Target: {}\n\
         Action: {} ({}) {marker} {}\n\
         Recent: {history}",
        render_bar(stats.health),
        stats.health,
        render_bar(stats.endurance),
        stats.endurance,
        stats.experience,
        yes_no(stats.in_combat),
        yes_no(stats.enemy_targeted),
        decision.action,
        decision.scenario,
        decision.reason,
    )
}
