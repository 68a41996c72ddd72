//! Remote model boundary.
//!
//! The engine only sees [`InferenceClient`]: a prompt (plus optional PNG
//! screenshot) in, the model's reply text out. [`NovaClient`] speaks the
//! Bedrock `InvokeModel` wire format for Amazon Nova models.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tracing::debug;

use crate::config::InferenceConfig;
use crate::error::{BotError, Result};

/// Default request deadline for the inference call.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Sampling parameters sent with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.3,
            top_p: 0.9,
            top_k: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub prompt: String,
    /// PNG bytes, sent inline.
    pub image_png: Option<Vec<u8>>,
    pub params: InferenceParams,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: InferenceRequest) -> Result<String>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Amazon Nova through the Bedrock runtime `InvokeModel` endpoint,
/// authenticated with a Bedrock API key (bearer token).
pub struct NovaClient {
    client: reqwest::Client,
    invoke_url: String,
    api_key: String,
}

impl NovaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BotError::Config(format!("failed to build HTTP client: {e}")))?;
        let base = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", config.region));
        Ok(Self {
            client,
            invoke_url: format!("{}/model/{}/invoke", base.trim_end_matches('/'), config.model_id),
            api_key: config.api_key.clone(),
        })
    }

    pub fn invoke_url(&self) -> &str {
        &self.invoke_url
    }
}

/// Build the Nova `messages` request body.
pub fn nova_request_body(request: &InferenceRequest) -> serde_json::Value {
    let mut content = vec![json!({ "text": request.prompt })];
    if let Some(png) = &request.image_png {
        content.push(json!({
            "image": {
                "format": "png",
                "source": { "bytes": STANDARD.encode(png) }
            }
        }));
    }

    json!({
        "messages": [
            { "role": "user", "content": content }
        ],
        "inferenceConfig": {
            "max_new_tokens": request.params.max_tokens,
            "temperature": request.params.temperature,
            "top_p": request.params.top_p,
            "top_k": request.params.top_k
        }
    })
}

/// Extract the reply text from a Nova response.
fn extract_nova_text(json: &serde_json::Value) -> Result<String> {
    json.get("output")
        .and_then(|o| o.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            BotError::Inference("Nova response missing output.message.content[0].text".to_owned())
        })
}

#[async_trait]
impl InferenceClient for NovaClient {
    async fn complete(&self, request: InferenceRequest) -> Result<String> {
        let body = nova_request_body(&request);
        debug!(
            url = %self.invoke_url,
            prompt_len = request.prompt.len(),
            image_bytes = request.image_png.as_ref().map(Vec::len).unwrap_or(0),
            "invoking model"
        );

        let response = self
            .client
            .post(&self.invoke_url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Inference(format!("Nova request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(BotError::Inference(format!(
                "Nova returned {status}: {error_body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BotError::Inference(format!("Nova response parse failed: {e}")))?;

        extract_nova_text(&json)
    }

    fn name(&self) -> &str {
        "bedrock-nova"
    }
}
