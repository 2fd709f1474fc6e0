use anyhow::Result;
use async_trait::async_trait;

/// One external LLM backend. Implementations issue a single completion
/// call with no internal retry: the provider pool owns fallback and
/// cooldown policy.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
    fn name(&self) -> &str;
}
