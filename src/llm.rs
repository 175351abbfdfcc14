//! Chat completion client for an OpenAI-compatible `chat/completions`
//! endpoint, with cost-tiered model selection: the small model handles
//! query refinement, the large one answers questions. Retry behavior
//! matches the embedding client.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::settings::AiSettings;

const MAX_RETRIES: u32 = 5;
const TIMEOUT_SECS: u64 = 60;

/// Which of the two configured chat models to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTier {
    Small,
    Large,
}

pub struct ChatClient {
    http: reqwest::Client,
    ai: AiSettings,
}

impl ChatClient {
    pub fn new(ai: &AiSettings) -> Result<Self> {
        if !ai.enabled {
            bail!("AI connector is disabled");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            ai: ai.clone(),
        })
    }

    fn model(&self, tier: ChatTier) -> &str {
        match tier {
            ChatTier::Small => &self.ai.chat_model_small,
            ChatTier::Large => &self.ai.chat_model_large,
        }
    }

    /// One system+user exchange; returns the assistant's text.
    pub async fn complete(&self, tier: ChatTier, system: &str, user: &str) -> Result<String> {
        let url = self.ai.endpoint("chat/completions");
        let body = serde_json::json!({
            "model": self.model(tier),
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": self.ai.max_tokens,
            "temperature": self.ai.temperature,
        });

        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.ai.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("chat API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("chat API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
    }

    /// Rewrite a user question into a self-contained search query using
    /// the small model and the configured refinement prompt.
    pub async fn refine_query(&self, query: &str) -> Result<String> {
        let refined = self
            .complete(ChatTier::Small, &self.ai.refine_system_prompt, query)
            .await?;
        let refined = refined.trim();
        if refined.is_empty() {
            bail!("refinement returned an empty query");
        }
        Ok(refined.to_string())
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("invalid chat response: missing choices[0].message.content"))
}
