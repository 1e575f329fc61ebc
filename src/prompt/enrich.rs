use std::time::Duration;

use anyhow::{anyhow, Context};
use serde_json::json;
use tokio::time::timeout;

use crate::{
    email::{Category, Email, DEFAULT_REPLY},
    error::AppResult,
    server_config::AiConfig,
    HttpClient,
};

use super::{
    categorize_user_prompt, first_answer, reply_user_prompt, ChatApiResponseOrError,
    CATEGORIZE_SYSTEM_PROMPT, CATEGORIZE_TEMPERATURE, REPLY_SYSTEM_PROMPT, REPLY_TEMPERATURE,
};

/// Client for the two enrichment calls against the text-completion
/// collaborator. Both calls are best-effort: any error or timeout falls back
/// to the default category / placeholder reply instead of propagating, so a
/// flaky or slow model never stalls the pipeline.
#[derive(Clone)]
pub struct EnrichmentClient {
    http_client: HttpClient,
    endpoint: String,
    api_key: String,
    model: String,
    call_timeout: Duration,
}

impl EnrichmentClient {
    pub fn new(http_client: HttpClient, config: &AiConfig) -> Self {
        EnrichmentClient {
            http_client,
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            call_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Single deterministic request constrained to the fixed category set.
    pub async fn categorize(&self, email: &Email) -> Category {
        let user_prompt = categorize_user_prompt(email);
        let prompt =
            self.send_chat_prompt(CATEGORIZE_SYSTEM_PROMPT, &user_prompt, CATEGORIZE_TEMPERATURE);
        match timeout(self.call_timeout, prompt).await {
            Ok(Ok(answer)) => Category::parse_lenient(&answer),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "AI categorization failed, using fallback");
                Category::Other
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.call_timeout, "AI categorization timed out");
                Category::Other
            }
        }
    }

    /// Single higher-variance request for a suggested reply.
    pub async fn suggest_reply(&self, email: &Email) -> String {
        let user_prompt = reply_user_prompt(email);
        let prompt = self.send_chat_prompt(REPLY_SYSTEM_PROMPT, &user_prompt, REPLY_TEMPERATURE);
        match timeout(self.call_timeout, prompt).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "AI reply suggestion failed, using fallback");
                DEFAULT_REPLY.to_string()
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.call_timeout, "AI reply suggestion timed out");
                DEFAULT_REPLY.to_string()
            }
        }
    }

    async fn send_chat_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> AppResult<String> {
        let resp = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "temperature": temperature,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt }
                ]
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(anyhow::Error::from)?
            .json::<serde_json::Value>()
            .await?;

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(resp.clone())
            .context(format!("Could not parse chat response: {}", resp))?;

        match parsed {
            ChatApiResponseOrError::Error(error) => {
                Err(anyhow!("Chat API error: {}", error.message).into())
            }
            ChatApiResponseOrError::Response(response) => first_answer(&response)
                .ok_or_else(|| anyhow!("No choices in chat response").into()),
        }
    }
}
