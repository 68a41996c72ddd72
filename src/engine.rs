//! Decision engine: classify the snapshot, prompt the model, validate the
//! reply.
//!
//! [`DecisionEngine::decide`] never fails. Call failures and unusable replies
//! both become a `rest` decision carrying the diagnostic as its reason.

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::capture::encode_png;
use crate::error::{BotError, Result};
use crate::inference::{InferenceClient, InferenceParams, InferenceRequest};
use crate::scenario::{Decision, Scenario};
use crate::types::StatsSnapshot;

const REPLY_CONTRACT: &str = "Respond with ONLY a JSON object: {\"action\": \"action_name\", \"reason\": \"brief explanation\"}";

/// Shape the model is asked to reply with.
#[derive(Debug, Deserialize)]
struct RawReply {
    action: String,
    #[serde(default)]
    reason: String,
}

fn action_menu(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::Combat => {
            "- attack: Use basic attack combo\n\
             - power_combo: Use high-damage combo (costs more endurance)\n\
             - aoe_combo: Use area attack for multiple enemies\n\
             - retreat: Move away from danger\n\
             - rest: Recover endurance\n\
             - move_forward: Advance toward enemies\n\
             - circle_strafe: Tactical positioning"
        }
        Scenario::Exploration => {
            "- move_forward: Continue exploring forward\n\
             - turn_left: Turn and explore left\n\
             - turn_right: Turn and explore right\n\
             - patrol: Execute patrol pattern\n\
             - rest: Recover health/endurance\n\
             - search_enemies: Look for targets"
        }
        Scenario::Recovery => {
            "- rest: Stay and recover\n\
             - retreat: Move to safer location\n\
             - find_cover: Seek protection\n\
             - wait: Wait for natural recovery"
        }
    }
}

fn headline(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::Combat => {
            "Analyze this City of Heroes game state and decide the best combat action:"
        }
        Scenario::Exploration => {
            "Analyze this City of Heroes exploration state and decide movement:"
        }
        Scenario::Recovery => "Character needs recovery in City of Heroes:",
    }
}

/// Render the scenario prompt with the snapshot embedded as JSON.
pub fn render_prompt(scenario: Scenario, stats: &StatsSnapshot) -> String {
    let game_state = serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{}\n\nGame State: {game_state}\n\nAvailable Actions:\n{}\n\n{REPLY_CONTRACT}\n",
        headline(scenario),
        action_menu(scenario),
    )
}

/// Pull a `{action, reason}` object out of the reply text. Accepts bare
/// JSON, a fenced code block, or an object surrounded by prose.
fn parse_reply(raw: &str) -> Result<RawReply> {
    let trimmed = raw.trim();

    if let Ok(reply) = serde_json::from_str::<RawReply>(trimmed) {
        return Ok(reply);
    }

    if let Some(inner) = extract_json_from_codeblock(trimmed) {
        if let Ok(reply) = serde_json::from_str::<RawReply>(inner) {
            return Ok(reply);
        }
    }

    if let Some(inner) = extract_braced(trimmed) {
        if let Ok(reply) = serde_json::from_str::<RawReply>(inner) {
            return Ok(reply);
        }
    }

    Err(BotError::Inference(format!(
        "Failed to parse AI response: {trimmed}"
    )))
}

fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn extract_braced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub struct DecisionEngine {
    client: Box<dyn InferenceClient>,
    params: InferenceParams,
    attach_screenshot: bool,
}

impl DecisionEngine {
    pub fn new(client: Box<dyn InferenceClient>) -> Self {
        Self {
            client,
            params: InferenceParams::default(),
            attach_screenshot: true,
        }
    }

    pub fn with_params(mut self, params: InferenceParams) -> Self {
        self.params = params;
        self
    }

    pub fn without_screenshot(mut self) -> Self {
        self.attach_screenshot = false;
        self
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Decide the next action for `stats`. Always returns a usable decision.
    pub async fn decide(&self, stats: &StatsSnapshot, screenshot: Option<&RgbImage>) -> Decision {
        let scenario = Scenario::classify(stats);
        let prompt = render_prompt(scenario, stats);

        let image_png = match screenshot.filter(|_| self.attach_screenshot) {
            Some(frame) => match encode_png(frame) {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!(error = %e, "Screenshot error, sending prompt without image");
                    None
                }
            },
            None => None,
        };

        let request = InferenceRequest {
            prompt,
            image_png,
            params: self.params,
        };

        let raw = match self.client.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(backend = self.client.name(), error = %e, "inference call failed, resting");
                return Decision::fallback(scenario, stats.clone(), format!("API error: {e}"));
            }
        };
        debug!(scenario = %scenario, raw = raw.as_str(), "model reply");

        match parse_reply(&raw) {
            Ok(reply) => Decision::from_reply(scenario, &reply.action, reply.reason, stats.clone()),
            Err(e) => {
                warn!(error = %e, "unusable model reply, resting");
                Decision::fallback(scenario, stats.clone(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Action;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    /// Replies with a fixed result and records the prompts it saw.
    struct CannedClient {
        reply: std::result::Result<String, String>,
        seen: Arc<Mutex<Vec<InferenceRequest>>>,
    }

    impl CannedClient {
        fn ok(reply: &str) -> (Self, Arc<Mutex<Vec<InferenceRequest>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    reply: Ok(reply.to_owned()),
                    seen: seen.clone(),
                },
                seen,
            )
        }

        fn failing(msg: &str) -> Self {
            Self {
                reply: Err(msg.to_owned()),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl InferenceClient for CannedClient {
        async fn complete(&self, request: InferenceRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request);
            self.reply.clone().map_err(BotError::Inference)
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn stats(health: f32, endurance: f32, in_combat: bool) -> StatsSnapshot {
        StatsSnapshot::new(health, endurance, 42.0, false, in_combat, Utc::now())
    }

    #[test]
    fn test_parse_plain_fenced_and_wrapped() {
        let r = parse_reply(r#"{"action": "attack", "reason": "enemy close"}"#).unwrap();
        assert_eq!(r.action, "attack");

        let r = parse_reply("```json\n{\"action\": \"patrol\", \"reason\": \"quiet\"}\n```").unwrap();
        assert_eq!(r.action, "patrol");

        let r = parse_reply("Sure! {\"action\": \"rest\"} Good luck.").unwrap();
        assert_eq!(r.action, "rest");
        assert_eq!(r.reason, "");

        assert!(parse_reply("I think you should attack").is_err());
    }

    #[test]
    fn test_prompt_embeds_stats_and_vocabulary() {
        let p = render_prompt(Scenario::Recovery, &stats(10.0, 50.0, false));
        assert!(p.contains("\"health\": 10.0"));
        assert!(p.contains("find_cover"));
        assert!(!p.contains("power_combo"));
        assert!(p.contains("ONLY a JSON object"));
    }

    #[tokio::test]
    async fn test_decide_valid_reply() {
        let (client, seen) = CannedClient::ok(r#"{"action": "power_combo", "reason": "boss"}"#);
        let engine = DecisionEngine::new(Box::new(client));
        let frame = RgbImage::new(8, 8);
        let d = engine.decide(&stats(90.0, 90.0, true), Some(&frame)).await;
        assert_eq!(d.scenario, Scenario::Combat);
        assert_eq!(d.action, Action::PowerCombo);
        assert_eq!(d.reason, "boss");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].image_png.is_some());
        assert!(seen[0].prompt.contains("combat action"));
    }

    #[tokio::test]
    async fn test_decide_without_screenshot_option() {
        let (client, seen) = CannedClient::ok(r#"{"action": "patrol", "reason": "x"}"#);
        let engine = DecisionEngine::new(Box::new(client)).without_screenshot();
        let frame = RgbImage::new(8, 8);
        engine.decide(&stats(90.0, 90.0, false), Some(&frame)).await;
        assert!(seen.lock().unwrap()[0].image_png.is_none());
    }

    #[tokio::test]
    async fn test_decide_non_json_reply_falls_back_to_rest() {
        let (client, _) = CannedClient::ok("attack now!!");
        let engine = DecisionEngine::new(Box::new(client));
        let d = engine.decide(&stats(90.0, 90.0, false), None).await;
        assert_eq!(d.action, Action::Rest);
        assert_eq!(d.scenario, Scenario::Exploration);
        assert!(d.reason.contains("Failed to parse"));
    }

    #[tokio::test]
    async fn test_decide_call_failure_falls_back_to_rest() {
        let engine = DecisionEngine::new(Box::new(CannedClient::failing("403 Forbidden")));
        let d = engine.decide(&stats(90.0, 90.0, true), None).await;
        assert_eq!(d.action, Action::Rest);
        assert!(d.reason.starts_with("API error"));
        assert!(d.reason.contains("403"));
    }

    #[tokio::test]
    async fn test_decide_out_of_scenario_action_falls_back() {
        let (client, _) = CannedClient::ok(r#"{"action": "aoe_combo", "reason": "why not"}"#);
        let engine = DecisionEngine::new(Box::new(client));
        let d = engine.decide(&stats(15.0, 90.0, true), None).await;
        assert_eq!(d.scenario, Scenario::Recovery);
        assert_eq!(d.action, Action::Rest);
        assert!(!d.reason.is_empty());
    }
}
