//! LLM-backed intent analysis. The pool owns provider fallback; this layer
//! owns parsing and the post-processing defaults, and it never fails: both
//! pool exhaustion and malformed output collapse to the documented safe
//! result.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use palco_core::domain::analysis::AnalysisResult;
use palco_core::flows::ports::{AnalysisRequest, MessageAnalyzer};
use palco_core::venue::VenueProfile;

use crate::parse::{salvage_json_object, strip_code_fences};
use crate::pool::ProviderPool;
use crate::prompts::analysis_prompt;

pub struct IntentAnalyzer {
    pool: Arc<ProviderPool>,
    venue: VenueProfile,
}

impl IntentAnalyzer {
    pub fn new(pool: Arc<ProviderPool>, venue: VenueProfile) -> Self {
        Self { pool, venue }
    }
}

fn parse_analysis(raw: &str) -> Option<AnalysisResult> {
    let cleaned = strip_code_fences(raw);
    if let Ok(result) = serde_json::from_str::<AnalysisResult>(cleaned) {
        return Some(result);
    }
    salvage_json_object(cleaned)
        .and_then(|candidate| serde_json::from_str::<AnalysisResult>(candidate).ok())
}

#[async_trait]
impl MessageAnalyzer for IntentAnalyzer {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> AnalysisResult {
        let prompt = analysis_prompt(&request, &self.venue);

        let Some(raw) = self.pool.complete(&prompt).await else {
            return AnalysisResult::provider_exhausted();
        };

        match parse_analysis(&raw) {
            Some(result) => result.finalize(request.message),
            None => {
                warn!(raw = %raw.chars().take(200).collect::<String>(),
                      "analysis response was not parseable");
                AnalysisResult::default().finalize(request.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use palco_core::config::{ProviderKind, ProviderSpec};
    use palco_core::domain::analysis::Intent;
    use palco_core::domain::conversation::CollectedFields;
    use palco_core::flows::ports::{AnalysisRequest, MessageAnalyzer};
    use palco_core::venue::VenueProfile;

    use crate::llm::LlmClient;
    use crate::pool::ProviderPool;

    use super::IntentAnalyzer;

    struct CannedClient {
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(error) => bail!("{error}"),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn analyzer_with(reply: Result<&'static str, &'static str>) -> IntentAnalyzer {
        let spec = ProviderSpec {
            kind: ProviderKind::Ollama,
            model: "test".to_string(),
            api_key: None,
            base_url: Some("http://localhost".to_string()),
            rate_limit_per_minute: 10,
            timeout_secs: 2,
        };
        let pool = ProviderPool::with_clients(vec![(spec, Box::new(CannedClient { reply }) as _)]);
        IntentAnalyzer::new(Arc::new(pool), VenueProfile::default())
    }

    fn request<'a>(message: &'a str, collected: &'a CollectedFields) -> AnalysisRequest<'a> {
        AnalysisRequest { message, history: &[], collected, has_existing_profile: false }
    }

    #[tokio::test]
    async fn fenced_json_classification_is_parsed_and_finalized() {
        let analyzer = analyzer_with(Ok(r#"```json
{"intent": "greeting", "sentiment": "positive", "entities": {}}
```"#));

        let collected = CollectedFields::default();
        let result = analyzer.analyze(request("oi, bom dia!", &collected)).await;

        assert_eq!(result.intent, Intent::Greeting);
        // Confidence was unset; the greeting default backfills it.
        assert_eq!(result.confidence, 0.9);
        assert!(result.summary.as_deref().unwrap_or_default().starts_with("greeting:"));
    }

    #[tokio::test]
    async fn prose_wrapped_json_is_salvaged() {
        let analyzer = analyzer_with(Ok(
            r#"Claro! Segue a análise: {"intent": "schedule_inquiry", "confidence": 0.85}"#,
        ));

        let collected = CollectedFields::default();
        let result = analyzer.analyze(request("tem data livre?", &collected)).await;
        assert_eq!(result.intent, Intent::ScheduleInquiry);
        assert!((result.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn unparseable_output_degrades_to_unknown_with_human_flag() {
        let analyzer = analyzer_with(Ok("desculpe, não consigo responder em JSON"));

        let collected = CollectedFields::default();
        let result = analyzer.analyze(request("mensagem qualquer", &collected)).await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.needs_human);
    }

    #[tokio::test]
    async fn provider_exhaustion_returns_the_safe_default() {
        let analyzer = analyzer_with(Err("HTTP 429: quota exceeded"));

        let collected = CollectedFields::default();
        let result = analyzer.analyze(request("oi", &collected)).await;
        assert_eq!(result.intent, Intent::Unknown);
        assert!(result.needs_human);
        assert_eq!(result.confidence, 0.0);
    }
}
