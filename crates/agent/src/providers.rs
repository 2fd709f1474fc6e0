//! Concrete reqwest-backed LLM clients for the configured provider kinds.
//! Each client makes exactly one HTTP call per completion; retry, fallback
//! and cooldown policy belong to the pool.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use palco_core::config::{ProviderKind, ProviderSpec};

use crate::llm::LlmClient;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Builds the right client for a provider spec.
pub fn build_client(spec: &ProviderSpec, temperature: f32, max_tokens: u32) -> Box<dyn LlmClient> {
    let http = reqwest::Client::new();
    match spec.kind {
        ProviderKind::OpenAi => Box::new(OpenAiClient {
            http,
            api_key: spec.api_key.clone(),
            base_url: spec.base_url.clone().unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
            model: spec.model.clone(),
            temperature,
            max_tokens,
        }),
        ProviderKind::Anthropic => Box::new(AnthropicClient {
            http,
            api_key: spec.api_key.clone(),
            base_url: spec
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE_URL.to_string()),
            model: spec.model.clone(),
            temperature,
            max_tokens,
        }),
        ProviderKind::Ollama => Box::new(OllamaClient {
            http,
            base_url: spec.base_url.clone().unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: spec.model.clone(),
            temperature,
        }),
    }
}

struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key =
            self.api_key.as_ref().ok_or_else(|| anyhow!("openai api key not configured"))?;

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&json!({
                "model": self.model,
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            bail!("openai returned {status}: {body}");
        }

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("openai response had no message content"))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key =
            self.api_key.as_ref().ok_or_else(|| anyhow!("anthropic api key not configured"))?;

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            bail!("anthropic returned {status}: {body}");
        }

        body["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("anthropic response had no text content"))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": {"temperature": self.temperature},
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            bail!("ollama returned {status}: {body}");
        }

        body["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("ollama response had no text"))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
