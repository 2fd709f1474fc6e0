use palco_core::config::{AppConfig, LoadOptions};
use palco_db::connect_with_settings;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"overall_status\":\"fail\",\"error\":\"{error}\"}}"));
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(DoctorCheck {
                name: "messaging_credentials",
                status: CheckStatus::Pass,
                details: "credential format validated by config contract".to_string(),
            });
            checks.push(check_database_connectivity(&config));
            checks.push(check_llm_providers(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["messaging_credentials", "database_connectivity", "llm_providers"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("runtime build failed: {error}"),
            }
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await?;
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await?;
        pool.close().await;
        Ok::<(), anyhow::Error>(())
    });

    match outcome {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected to `{}`", config.database.url),
        },
        Err(error) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_llm_providers(config: &AppConfig) -> DoctorCheck {
    let with_credentials = config
        .llm
        .providers
        .iter()
        .filter(|spec| spec.api_key.is_some() || spec.base_url.is_some())
        .count();

    if with_credentials == 0 {
        return DoctorCheck {
            name: "llm_providers",
            status: CheckStatus::Fail,
            details: "no provider has credentials or a base url; every call would fall back \
                      to heuristics"
                .to_string(),
        };
    }

    DoctorCheck {
        name: "llm_providers",
        status: CheckStatus::Pass,
        details: format!(
            "{with_credentials} of {} providers configured, primary is `{}`",
            config.llm.providers.len(),
            config.llm.primary.as_str()
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        lines.push(format!("  [{:?}] {} - {}", check.status, check.name, check.details));
    }
    lines.join("\n")
}
