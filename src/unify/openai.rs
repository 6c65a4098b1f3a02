//! OpenAI-compatible unifier.
//!
//! Sends every version of a file in one chat-completions request in JSON
//! mode and expects a `{"mergedText", "rationale"}` object back.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Unification, Unifier, UnifyError};
use crate::config::UnifyConfig;
use crate::types::VersionExcerpt;

const SYSTEM_PROMPT: &str = "You merge divergent copies of the same source file from several \
packages of a monorepo into one version that preserves the behaviour every copy relies on. \
Reply with a JSON object with two string fields: \"mergedText\" (the complete merged file) and \
\"rationale\" (a short explanation of the choices made).";

/// Chat-completions client used as a [`Unifier`].
#[derive(Clone)]
pub struct OpenAiUnifier {
    api_key: String,
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OpenAiUnifier {
    /// Create a unifier with explicit settings.
    pub fn new(api_key: String, model: &str, base_url: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from configuration; `None` when no API key is set.
    pub fn from_config(config: &UnifyConfig) -> Option<Self> {
        config
            .api_key
            .clone()
            .map(|key| Self::new(key, &config.model, &config.base_url))
    }

    /// Model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_api(&self, system_prompt: &str, user_prompt: &str) -> Result<String, UnifyError> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UnifyError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UnifyError::Request(format!("status {}: {}", status, body)));
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| UnifyError::InvalidReply(e.to_string()))?;
        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UnifyError::InvalidReply("no choices returned".to_string()))
    }
}

/// User prompt listing every version under its component name.
pub fn user_prompt(path: &str, versions: &[VersionExcerpt]) -> String {
    let mut prompt = format!("File: {}\n", path);
    for version in versions {
        prompt.push_str(&format!(
            "\n--- version from {} ---\n{}\n",
            version.component, version.content
        ));
    }
    prompt
}

/// Parse the model's JSON reply.
pub fn parse_reply(content: &str) -> Result<Unification, UnifyError> {
    let reply: Unification =
        serde_json::from_str(content.trim()).map_err(|e| UnifyError::InvalidReply(e.to_string()))?;
    Ok(reply)
}

#[async_trait]
impl Unifier for OpenAiUnifier {
    async fn unify(&self, path: &str, versions: &[VersionExcerpt]) -> Result<Unification, UnifyError> {
        tracing::debug!(path = %path, versions = versions.len(), model = %self.model, "Requesting unification");
        let content = self.call_api(SYSTEM_PROMPT, &user_prompt(path, versions)).await?;
        parse_reply(&content)
    }
}
