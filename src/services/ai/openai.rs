use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{chat_messages, LlmProvider, Message};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Any `/chat/completions` endpoint speaking the OpenAI wire format
/// (OpenAI itself, Groq).
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    label: &'static str,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            label: "OpenAI",
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn groq(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            label: "Groq",
            ..Self::new(GROQ_BASE_URL.to_string(), api_key, model, timeout)
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, messages),
            "temperature": 0.2,
        });

        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to call {} API", self.label))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {} response", self.label))?;

        if !status.is_success() {
            anyhow::bail!("{} API error ({}): {}", self.label, status, data);
        }

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing content in {} response", self.label))
    }
}
