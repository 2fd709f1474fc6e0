//! LLM-facing layer of the Palco intake agent: the provider pool with
//! health-aware fallback, the intent analyzer and the data extractor. The
//! flow engine consumes these through the ports defined in `palco-core`.
//!
//! # Safety principle
//!
//! The LLM is strictly a translator. It never decides what gets persisted
//! or which stage comes next; those are deterministic decisions made by the
//! flow engine. Every operation here degrades to a documented safe default
//! instead of surfacing an error.

pub mod analyzer;
pub mod extractor;
pub mod llm;
mod parse;
pub mod pool;
pub mod prompts;
pub mod providers;

pub use analyzer::IntentAnalyzer;
pub use extractor::DataExtractor;
pub use llm::LlmClient;
pub use pool::{ProviderHealth, ProviderPool, ProviderStatus};
