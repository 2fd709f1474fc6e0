use palco_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

/// Prints the effective configuration with secrets redacted.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config: failed to load: {error}"),
    };

    let mut lines = vec![
        "config: effective values (secrets redacted)".to_string(),
        format!("database.url = {}", config.database.url),
        format!("database.max_connections = {}", config.database.max_connections),
        format!("whatsapp.account_sid = {}", redact(config.whatsapp.account_sid.expose_secret())),
        format!("whatsapp.from_number = {}", config.whatsapp.from_number),
        format!("llm.primary = {}", config.llm.primary.as_str()),
    ];

    for spec in config.llm.ordered_providers() {
        lines.push(format!(
            "llm.provider.{} = model={} rate_limit={}rpm timeout={}s api_key={}",
            spec.kind.as_str(),
            spec.model,
            spec.rate_limit_per_minute,
            spec.timeout_secs,
            if spec.api_key.is_some() { "set" } else { "unset" },
        ));
    }

    lines.push(format!(
        "server = {}:{} (deferred_replies={})",
        config.server.bind_address, config.server.port, config.server.deferred_replies
    ));
    lines.push(format!(
        "queue = capacity={} max_retries={} attempt_timeout={}s",
        config.queue.capacity, config.queue.max_retries, config.queue.attempt_timeout_secs
    ));
    lines.push(format!("venue = {} ({})", config.venue.name, config.venue.city));
    lines.push(format!("logging = {} ({:?})", config.logging.level, config.logging.format));

    lines.join("\n")
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", &secret[..4])
    }
}
