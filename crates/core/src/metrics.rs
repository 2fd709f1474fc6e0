//! Process-scoped interaction counters: the data the operator surface
//! reports, nothing more. Constructed once at bootstrap and shared by
//! reference, never a hidden singleton.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub day: String,
    pub interactions: u64,
    pub failures: u64,
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    day: Option<NaiveDate>,
    interactions: u64,
    failures: u64,
}

/// Daily interaction counts with a success rate. Counters roll over when
/// the UTC day changes.
#[derive(Debug, Default)]
pub struct BotMetrics {
    counters: Mutex<Counters>,
}

impl BotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_interaction(&self, success: bool) {
        let today = Utc::now().date_naive();
        if let Ok(mut counters) = self.counters.lock() {
            if counters.day != Some(today) {
                *counters = Counters { day: Some(today), ..Counters::default() };
            }
            counters.interactions += 1;
            if !success {
                counters.failures += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = match self.counters.lock() {
            Ok(counters) => counters,
            Err(_) => return MetricsSnapshot::default(),
        };
        let successes = counters.interactions.saturating_sub(counters.failures);
        MetricsSnapshot {
            day: counters.day.map(|day| day.to_string()).unwrap_or_default(),
            interactions: counters.interactions,
            failures: counters.failures,
            success_rate: if counters.interactions == 0 {
                100.0
            } else {
                (successes as f64 / counters.interactions as f64) * 100.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BotMetrics;

    #[test]
    fn success_rate_reflects_recorded_outcomes() {
        let metrics = BotMetrics::new();
        metrics.record_interaction(true);
        metrics.record_interaction(true);
        metrics.record_interaction(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.interactions, 3);
        assert_eq!(snapshot.failures, 1);
        assert!((snapshot.success_rate - 66.66).abs() < 1.0);
    }

    #[test]
    fn empty_day_reports_full_success() {
        assert_eq!(BotMetrics::new().snapshot().success_rate, 100.0);
    }
}
