//! Per-cycle stage timing.
//!
//! Each decision cycle runs four stages in order. Budgets are soft: an
//! overrun is reported, never enforced.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use tracing::{debug, warn};

/// Timing budgets in milliseconds
pub const PERCEPTION_MS: u64 = 500;
pub const INFERENCE_MS: u64 = 10_000;
pub const EXECUTION_MS: u64 = 6_000;
pub const LOGGING_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CycleStage {
    Perception,
    Inference,
    Execution,
    Logging,
}

impl CycleStage {
    pub fn budget(self) -> Duration {
        let ms = match self {
            CycleStage::Perception => PERCEPTION_MS,
            CycleStage::Inference => INFERENCE_MS,
            CycleStage::Execution => EXECUTION_MS,
            CycleStage::Logging => LOGGING_MS,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetrics {
    pub stage: CycleStage,
    pub latency_ms: u64,
    pub budget_ms: u64,
    pub over_budget: bool,
}

/// Compare a stage latency to its budget
pub fn check_stage_timing(stage: CycleStage, latency: Duration) -> StageMetrics {
    let latency_ms = latency.as_millis() as u64;
    let budget_ms = stage.budget().as_millis() as u64;
    StageMetrics {
        stage,
        latency_ms,
        budget_ms,
        over_budget: latency_ms > budget_ms,
    }
}

/// Collects stage timings for one cycle.
#[derive(Debug, Default)]
pub struct CycleTimer {
    stages: Vec<StageMetrics>,
}

impl CycleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage that started at `started` and just finished.
    pub fn finish(&mut self, stage: CycleStage, started: Instant) -> &StageMetrics {
        self.record(stage, started.elapsed())
    }

    pub fn record(&mut self, stage: CycleStage, latency: Duration) -> &StageMetrics {
        let metrics = check_stage_timing(stage, latency);
        if metrics.over_budget {
            warn!(
                stage = %stage,
                latency_ms = metrics.latency_ms,
                budget_ms = metrics.budget_ms,
                "stage over budget"
            );
        } else {
            debug!(stage = %stage, latency_ms = metrics.latency_ms, "stage done");
        }
        self.stages.push(metrics);
        &self.stages[self.stages.len() - 1]
    }

    pub fn stages(&self) -> &[StageMetrics] {
        &self.stages
    }

    pub fn total(&self) -> Duration {
        Duration::from_millis(self.stages.iter().map(|s| s.latency_ms).sum())
    }

    pub fn overruns(&self) -> impl Iterator<Item = &StageMetrics> {
        self.stages.iter().filter(|s| s.over_budget)
    }
}
