//! OpenAI-compatible chat-completions client
//! Works against OpenAI, OpenRouter, vLLM and Ollama's /v1 endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use super::{GenerationParams, LanguageModel, LlmError, ModelRole, OutputShape};
use crate::config::LlmConfig;

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

/// External API provider speaking the chat-completions protocol
pub struct ExternalModel {
    config: LlmConfig,
    client: Client,
}

impl ExternalModel {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        tracing::info!(
            base_url = %config.base_url,
            chat = %config.models.chat,
            grader = %config.models.grader,
            rewriter = %config.models.rewriter,
            connect_timeout_secs = config.connect_timeout_secs,
            "Creating ExternalModel"
        );

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Configured model for `role`. An empty name disables that role.
    fn model_for(&self, role: ModelRole) -> Result<&str, LlmError> {
        let model = match role {
            ModelRole::Chat => &self.config.models.chat,
            ModelRole::Grader => &self.config.models.grader,
            ModelRole::Rewriter => &self.config.models.rewriter,
        };
        if model.trim().is_empty() {
            tracing::error!(role = ?role, "No model configured for role");
            return Err(LlmError::Disabled);
        }
        Ok(model)
    }

    async fn send(&self, request: JsonValue) -> Result<String, LlmError> {
        let endpoint = self.endpoint();
        let mut builder = self.client.post(&endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!(endpoint = %endpoint, "Request timed out (connect or response timeout)");
                LlmError::Timeout {
                    timeout_secs: self.config.request_timeout_secs,
                }
            } else {
                tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
                LlmError::Connection {
                    message: format!("Request to {} failed: {}", endpoint, e),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| LlmError::Connection {
            message: format!("Failed to read response body from {}: {}", endpoint, e),
        })?;

        if !status.is_success() {
            tracing::error!(endpoint = %endpoint, status = %status, "API returned error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        parse_completion(&body, &endpoint)
    }
}

/// Build a chat-completions request body.
fn chat_request(
    model: &str,
    system_prompt: &str,
    user_prompt: &str,
    params: &GenerationParams,
    max_tokens: usize,
) -> JsonValue {
    let mut request = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": user_prompt}
        ],
        "max_tokens": params.max_tokens.unwrap_or(max_tokens),
        "temperature": params.temperature,
        "stream": false
    });
    if let Some(obj) = request.as_object_mut() {
        for (key, value) in &params.extra {
            obj.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    request
}

/// Extract the first choice's text, rejecting HTML error pages and empty
/// choice lists.
fn parse_completion(body: &str, endpoint: &str) -> Result<String, LlmError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(LlmError::parse(format!(
            "Endpoint {} returned HTML instead of JSON: {}",
            endpoint, preview
        )));
    }

    let response: OpenAIResponse = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        LlmError::parse(format!(
            "Failed to parse JSON from {}: {}. Response body: {}",
            endpoint, e, preview
        ))
    })?;

    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| LlmError::parse("No choices returned from API"))
}

#[async_trait]
impl LanguageModel for ExternalModel {
    async fn generate(
        &self,
        role: ModelRole,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let model = self.model_for(role)?;
        tracing::debug!(
            model = %model,
            role = ?role,
            temperature = params.temperature,
            prompt_len = system_prompt.len() + user_prompt.len(),
            "Sending chat completion"
        );
        let request = chat_request(model, system_prompt, user_prompt, params, self.config.max_tokens);
        self.send(request).await
    }

    async fn grade_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        shape: &OutputShape,
    ) -> Result<String, LlmError> {
        let model = self.model_for(ModelRole::Grader)?;
        let mut request = chat_request(
            model,
            system_prompt,
            user_prompt,
            &GenerationParams::with_temperature(0.0),
            self.config.max_tokens,
        );
        request["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": shape.name,
                "schema": shape.schema,
                "strict": true
            }
        });
        self.send(request).await
    }

    fn name(&self) -> &str {
        "external"
    }
}
