//! Ordered provider fallback with per-provider health, sliding rate
//! windows and failure-classified cooldowns. All LLM-backed operations go
//! through [`ProviderPool::complete`], which never surfaces an error:
//! exhaustion returns `None` and the caller falls back to its documented
//! safe default.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use palco_core::config::{LlmConfig, ProviderSpec};

use crate::llm::LlmClient;
use crate::providers::build_client;

/// Sliding window for the per-minute rate limit.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Error substrings that mark a quota/rate-limit failure.
const QUOTA_MARKERS: &[&str] =
    &["429", "quota", "rate limit", "exceeded", "billing", "resourceexhausted"];

/// Consecutive failures after which a provider is disabled until its
/// cooldown expires.
const FAILURE_DISABLE_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub struct ProviderHealth {
    request_timestamps: VecDeque<Instant>,
    rate_limit_per_minute: u32,
    is_available: bool,
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

impl ProviderHealth {
    pub fn new(rate_limit_per_minute: u32) -> Self {
        Self {
            request_timestamps: VecDeque::new(),
            rate_limit_per_minute,
            is_available: true,
            consecutive_failures: 0,
            cooldown_until: None,
        }
    }

    /// A provider can be called unless it is cooling down or has spent its
    /// rate window. An expired cooldown re-enables the provider and clears
    /// the failure streak.
    pub fn can_call(&mut self, now: Instant) -> bool {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return false;
            }
            self.cooldown_until = None;
            self.consecutive_failures = 0;
            self.is_available = true;
        }

        while let Some(oldest) = self.request_timestamps.front() {
            if now.duration_since(*oldest) < RATE_WINDOW {
                break;
            }
            self.request_timestamps.pop_front();
        }

        if self.request_timestamps.len() >= self.rate_limit_per_minute as usize {
            return false;
        }

        self.is_available
    }

    pub fn record_success(&mut self, now: Instant) {
        self.request_timestamps.push_back(now);
        self.consecutive_failures = 0;
        self.is_available = true;
        self.cooldown_until = None;
    }

    /// Quota failures earn a long cooldown that grows with the streak;
    /// everything else backs off exponentially from 30 s. Three failures in
    /// a row disable the provider until the cooldown passes.
    pub fn record_failure(&mut self, now: Instant, error: &str) {
        self.consecutive_failures += 1;

        let lowered = error.to_lowercase();
        let is_quota = QUOTA_MARKERS.iter().any(|marker| lowered.contains(marker));
        let cooldown_secs = if is_quota {
            (300 + u64::from(self.consecutive_failures) * 60).min(1800)
        } else {
            let doublings = self.consecutive_failures.saturating_sub(1).min(8);
            (30u64 << doublings).min(300)
        };
        self.cooldown_until = Some(now + Duration::from_secs(cooldown_secs));

        if self.consecutive_failures >= FAILURE_DISABLE_THRESHOLD {
            self.is_available = false;
        }
    }

    fn snapshot(&self, now: Instant) -> (bool, usize, u32, u64) {
        let recent = self
            .request_timestamps
            .iter()
            .filter(|at| now.duration_since(**at) < RATE_WINDOW)
            .count();
        let cooldown_remaining = self
            .cooldown_until
            .and_then(|until| until.checked_duration_since(now))
            .map(|left| left.as_secs())
            .unwrap_or(0);
        (self.is_available, recent, self.consecutive_failures, cooldown_remaining)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub model: String,
    pub available: bool,
    pub recent_requests: usize,
    pub consecutive_failures: u32,
    pub cooldown_remaining_secs: u64,
}

struct PooledProvider {
    spec: ProviderSpec,
    client: Box<dyn LlmClient>,
    health: Mutex<ProviderHealth>,
}

pub struct ProviderPool {
    providers: Vec<PooledProvider>,
}

impl ProviderPool {
    /// Builds the pool from config, primary first.
    pub fn from_config(config: &LlmConfig) -> Self {
        let pairs = config
            .ordered_providers()
            .into_iter()
            .map(|spec| {
                let client = build_client(&spec, config.temperature, config.max_tokens);
                (spec, client)
            })
            .collect();
        Self::with_clients(pairs)
    }

    /// Direct construction, used by tests to inject scripted clients.
    pub fn with_clients(pairs: Vec<(ProviderSpec, Box<dyn LlmClient>)>) -> Self {
        let providers = pairs
            .into_iter()
            .map(|(spec, client)| PooledProvider {
                health: Mutex::new(ProviderHealth::new(spec.rate_limit_per_minute)),
                spec,
                client,
            })
            .collect();
        Self { providers }
    }

    /// Walks providers in priority order, skipping unhealthy ones, with a
    /// per-call timeout. Returns the first successful completion, or
    /// `None` once the pool is exhausted.
    pub async fn complete(&self, prompt: &str) -> Option<String> {
        for provider in &self.providers {
            let allowed = provider
                .health
                .lock()
                .map(|mut health| health.can_call(Instant::now()))
                .unwrap_or(false);
            if !allowed {
                continue;
            }

            let timeout = Duration::from_secs(provider.spec.timeout_secs);
            let outcome = tokio::time::timeout(timeout, provider.client.complete(prompt)).await;

            match outcome {
                Ok(Ok(text)) => {
                    if let Ok(mut health) = provider.health.lock() {
                        health.record_success(Instant::now());
                    }
                    info!(provider = provider.client.name(), "llm call succeeded");
                    return Some(text);
                }
                Ok(Err(error)) => {
                    warn!(provider = provider.client.name(), %error, "llm call failed");
                    if let Ok(mut health) = provider.health.lock() {
                        health.record_failure(Instant::now(), &error.to_string());
                    }
                }
                Err(_) => {
                    warn!(provider = provider.client.name(), "llm call timed out");
                    if let Ok(mut health) = provider.health.lock() {
                        health.record_failure(Instant::now(), "timeout");
                    }
                }
            }
        }

        warn!("all llm providers exhausted");
        None
    }

    /// First provider that would currently accept a call, if any.
    pub fn first_available(&self) -> Option<String> {
        let now = Instant::now();
        self.providers
            .iter()
            .find(|provider| {
                provider.health.lock().map(|mut health| health.can_call(now)).unwrap_or(false)
            })
            .map(|provider| provider.client.name().to_string())
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        let now = Instant::now();
        self.providers
            .iter()
            .map(|provider| {
                let (available, recent_requests, consecutive_failures, cooldown_remaining_secs) =
                    provider
                        .health
                        .lock()
                        .map(|health| health.snapshot(now))
                        .unwrap_or((false, 0, 0, 0));
                ProviderStatus {
                    name: provider.spec.kind.as_str().to_string(),
                    model: provider.spec.model.clone(),
                    available,
                    recent_requests,
                    consecutive_failures,
                    cooldown_remaining_secs,
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
