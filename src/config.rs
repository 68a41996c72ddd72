//! Configuration for the gameplay agent.
//!
//! Loaded from environment variables (after `.env`). The credential for the
//! inference endpoint is required; everything else has a default.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BotError, Result};
use crate::inference::DEFAULT_INFERENCE_TIMEOUT;
use crate::types::Resolution;

/// Environment variables that must be present and non-blank.
pub const REQUIRED_CREDENTIALS: &[&str] = &["AWS_BEARER_TOKEN_BEDROCK"];

/// Where and how to reach the model.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub region: String,
    pub model_id: String,
    /// Bedrock API key.
    pub api_key: String,
    /// Overrides `https://bedrock-runtime.{region}.amazonaws.com`.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub inference: InferenceConfig,
    /// Time between the starts of two decision cycles.
    pub decision_interval: Duration,
    pub log_dir: PathBuf,
    /// Calibrate UI regions to this resolution at startup.
    pub resolution: Option<Resolution>,
    pub chain_interrupt_on_low_health: bool,
}

impl BotConfig {
    /// Load configuration from the process environment.
    ///
    /// Required variables:
    /// - `AWS_BEARER_TOKEN_BEDROCK` -- Bedrock API key
    ///
    /// Optional variables:
    /// - `AWS_DEFAULT_REGION` -- inference region (default `us-east-1`)
    /// - `NOVA_MODEL_ID` -- model identifier (default `amazon.nova-micro-v1:0`)
    /// - `BEDROCK_ENDPOINT` -- endpoint base URL override
    /// - `INFERENCE_TIMEOUT_SECS` -- per-call deadline (default 30)
    /// - `DECISION_INTERVAL` -- seconds between cycles (default 5)
    /// - `COH_LOG_DIR` -- session log directory (default `logs`)
    /// - `SCREEN_RESOLUTION` -- `WIDTHxHEIGHT` to calibrate regions for
    /// - `CHAIN_INTERRUPT_ON_LOW_HEALTH` -- abort chains at critical health (default `true`)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_CREDENTIALS
            .iter()
            .copied()
            .filter(|&name| var(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(BotError::Config(format!(
                "Missing environment variables: {}",
                missing.join(", ")
            )));
        }
        let api_key = var("AWS_BEARER_TOKEN_BEDROCK").unwrap_or_default();

        let timeout_secs: u64 = parse_or(
            var("INFERENCE_TIMEOUT_SECS"),
            "INFERENCE_TIMEOUT_SECS",
            DEFAULT_INFERENCE_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(BotError::Config("INFERENCE_TIMEOUT_SECS must be positive".to_owned()));
        }

        let interval_secs: f64 = parse_or(var("DECISION_INTERVAL"), "DECISION_INTERVAL", 5.0)?;
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(BotError::Config(format!(
                "DECISION_INTERVAL must be positive, got {interval_secs}"
            )));
        }

        let resolution = var("SCREEN_RESOLUTION")
            .map(|raw| Resolution::parse(&raw))
            .transpose()?;

        let chain_interrupt_on_low_health = parse_or(
            var("CHAIN_INTERRUPT_ON_LOW_HEALTH"),
            "CHAIN_INTERRUPT_ON_LOW_HEALTH",
            true,
        )?;

        Ok(Self {
            inference: InferenceConfig {
                region: var("AWS_DEFAULT_REGION").unwrap_or_else(|| "us-east-1".to_owned()),
                model_id: var("NOVA_MODEL_ID").unwrap_or_else(|| "amazon.nova-micro-v1:0".to_owned()),
                api_key,
                endpoint: var("BEDROCK_ENDPOINT"),
                timeout: Duration::from_secs(timeout_secs),
            },
            decision_interval: Duration::from_secs_f64(interval_secs),
            log_dir: var("COH_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            resolution,
            chain_interrupt_on_low_health,
        })
    }
}

fn parse_or<T>(raw: Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| BotError::Config(format!("invalid {name}: {e}"))),
        None => Ok(default),
    }
}
