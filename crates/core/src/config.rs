use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::venue::VenueProfile;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsappConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub venue: VenueProfile,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsappConfig {
    pub account_sid: SecretString,
    pub auth_token: SecretString,
    pub from_number: String,
    pub send_max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub primary: ProviderKind,
    pub providers: Vec<ProviderSpec>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub rate_limit_per_minute: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Webhook deadline for subjects already in the base (little LLM work).
    pub known_subject_timeout_secs: u64,
    /// Webhook deadline for new subjects, under the platform's own limit.
    pub new_subject_timeout_secs: u64,
    /// When true the webhook answers with the immediate acknowledgment and
    /// the dispatch queue delivers the real reply via the transport.
    pub deferred_replies: bool,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub capacity: usize,
    pub max_retries: u32,
    pub attempt_timeout_secs: u64,
    pub retry_base_delay_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_primary: Option<ProviderKind>,
    pub whatsapp_account_sid: Option<String>,
    pub whatsapp_auth_token: Option<String>,
    pub whatsapp_from_number: Option<String>,
    pub deferred_replies: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://palco.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsappConfig {
                account_sid: String::new().into(),
                auth_token: String::new().into(),
                from_number: "whatsapp:+14155238886".to_string(),
                send_max_retries: 3,
            },
            llm: LlmConfig {
                primary: ProviderKind::Ollama,
                providers: vec![
                    ProviderSpec {
                        kind: ProviderKind::Ollama,
                        model: "llama3.1".to_string(),
                        api_key: None,
                        base_url: Some("http://localhost:11434".to_string()),
                        rate_limit_per_minute: 60,
                        timeout_secs: 15,
                    },
                    ProviderSpec {
                        kind: ProviderKind::OpenAi,
                        model: "gpt-4o-mini".to_string(),
                        api_key: None,
                        base_url: None,
                        rate_limit_per_minute: 100,
                        timeout_secs: 15,
                    },
                    ProviderSpec {
                        kind: ProviderKind::Anthropic,
                        model: "claude-3-haiku-20240307".to_string(),
                        api_key: None,
                        base_url: None,
                        rate_limit_per_minute: 50,
                        timeout_secs: 15,
                    },
                ],
                temperature: 0.3,
                max_tokens: 1000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                known_subject_timeout_secs: 3,
                new_subject_timeout_secs: 13,
                deferred_replies: false,
                graceful_shutdown_secs: 15,
            },
            queue: QueueConfig {
                capacity: 1000,
                max_retries: 2,
                attempt_timeout_secs: 30,
                retry_base_delay_secs: 2,
            },
            venue: VenueProfile::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    /// Providers in fallback order: the primary first, then the remainder
    /// in their declared sequence.
    pub fn ordered_providers(&self) -> Vec<ProviderSpec> {
        let mut ordered: Vec<ProviderSpec> =
            self.providers.iter().filter(|spec| spec.kind == self.primary).cloned().collect();
        ordered
            .extend(self.providers.iter().filter(|spec| spec.kind != self.primary).cloned());
        ordered
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("palco.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(account_sid_value) = whatsapp.account_sid {
                self.whatsapp.account_sid = secret_value(account_sid_value);
            }
            if let Some(auth_token_value) = whatsapp.auth_token {
                self.whatsapp.auth_token = secret_value(auth_token_value);
            }
            if let Some(from_number) = whatsapp.from_number {
                self.whatsapp.from_number = from_number;
            }
            if let Some(send_max_retries) = whatsapp.send_max_retries {
                self.whatsapp.send_max_retries = send_max_retries;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(primary) = llm.primary {
                self.llm.primary = primary;
            }
            if let Some(providers) = llm.providers {
                if !providers.is_empty() {
                    self.llm.providers = providers
                        .into_iter()
                        .map(|spec| ProviderSpec {
                            kind: spec.kind,
                            model: spec.model,
                            api_key: spec.api_key.map(secret_value),
                            base_url: spec.base_url,
                            rate_limit_per_minute: spec.rate_limit_per_minute.unwrap_or(60),
                            timeout_secs: spec.timeout_secs.unwrap_or(15),
                        })
                        .collect();
                }
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(known) = server.known_subject_timeout_secs {
                self.server.known_subject_timeout_secs = known;
            }
            if let Some(new) = server.new_subject_timeout_secs {
                self.server.new_subject_timeout_secs = new;
            }
            if let Some(deferred) = server.deferred_replies {
                self.server.deferred_replies = deferred;
            }
            if let Some(graceful) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful;
            }
        }

        if let Some(queue) = patch.queue {
            if let Some(capacity) = queue.capacity {
                self.queue.capacity = capacity;
            }
            if let Some(max_retries) = queue.max_retries {
                self.queue.max_retries = max_retries;
            }
            if let Some(attempt_timeout_secs) = queue.attempt_timeout_secs {
                self.queue.attempt_timeout_secs = attempt_timeout_secs;
            }
            if let Some(retry_base_delay_secs) = queue.retry_base_delay_secs {
                self.queue.retry_base_delay_secs = retry_base_delay_secs;
            }
        }

        if let Some(venue) = patch.venue {
            if let Some(name) = venue.name {
                self.venue.name = name;
            }
            if let Some(persona_name) = venue.persona_name {
                self.venue.persona_name = persona_name;
            }
            if let Some(city) = venue.city {
                self.venue.city = city;
            }
            if let Some(address) = venue.address {
                self.venue.address = address;
            }
            if let Some(opening_hours) = venue.opening_hours {
                self.venue.opening_hours = opening_hours;
            }
            if let Some(show_nights) = venue.show_nights {
                self.venue.show_nights = show_nights;
            }
            if let Some(blurb) = venue.blurb {
                self.venue.blurb = blurb;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PALCO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PALCO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PALCO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PALCO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PALCO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PALCO_WHATSAPP_ACCOUNT_SID") {
            self.whatsapp.account_sid = secret_value(value);
        }
        if let Some(value) = read_env("PALCO_WHATSAPP_AUTH_TOKEN") {
            self.whatsapp.auth_token = secret_value(value);
        }
        if let Some(value) = read_env("PALCO_WHATSAPP_FROM_NUMBER") {
            self.whatsapp.from_number = value;
        }

        if let Some(value) = read_env("PALCO_LLM_PRIMARY") {
            self.llm.primary = value.parse()?;
        }
        if let Some(value) = read_env("PALCO_LLM_OPENAI_API_KEY") {
            self.set_provider_api_key(ProviderKind::OpenAi, value);
        }
        if let Some(value) = read_env("PALCO_LLM_ANTHROPIC_API_KEY") {
            self.set_provider_api_key(ProviderKind::Anthropic, value);
        }
        if let Some(value) = read_env("PALCO_LLM_OLLAMA_BASE_URL") {
            if let Some(spec) =
                self.llm.providers.iter_mut().find(|spec| spec.kind == ProviderKind::Ollama)
            {
                spec.base_url = Some(value);
            }
        }

        if let Some(value) = read_env("PALCO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PALCO_SERVER_PORT") {
            self.server.port = parse_u16("PALCO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PALCO_SERVER_DEFERRED_REPLIES") {
            self.server.deferred_replies = parse_bool("PALCO_SERVER_DEFERRED_REPLIES", &value)?;
        }

        let log_level = read_env("PALCO_LOGGING_LEVEL").or_else(|| read_env("PALCO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("PALCO_LOGGING_FORMAT").or_else(|| read_env("PALCO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn set_provider_api_key(&mut self, kind: ProviderKind, value: String) {
        if let Some(spec) = self.llm.providers.iter_mut().find(|spec| spec.kind == kind) {
            spec.api_key = Some(secret_value(value));
        }
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_primary) = overrides.llm_primary {
            self.llm.primary = llm_primary;
        }
        if let Some(account_sid) = overrides.whatsapp_account_sid {
            self.whatsapp.account_sid = secret_value(account_sid);
        }
        if let Some(auth_token) = overrides.whatsapp_auth_token {
            self.whatsapp.auth_token = secret_value(auth_token);
        }
        if let Some(from_number) = overrides.whatsapp_from_number {
            self.whatsapp.from_number = from_number;
        }
        if let Some(deferred) = overrides.deferred_replies {
            self.server.deferred_replies = deferred;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_queue(&self.queue)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("palco.toml"), PathBuf::from("config/palco.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsappConfig) -> Result<(), ConfigError> {
    let account_sid = whatsapp.account_sid.expose_secret();
    if account_sid.is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.account_sid is required. Get it from the Twilio console > Account Info"
                .to_string(),
        ));
    }
    if !account_sid.starts_with("AC") {
        return Err(ConfigError::Validation(
            "whatsapp.account_sid must start with `AC`".to_string(),
        ));
    }

    if whatsapp.auth_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.auth_token is required. Get it from the Twilio console > Account Info"
                .to_string(),
        ));
    }

    let from = whatsapp.from_number.trim();
    if !from.starts_with("whatsapp:+") {
        let hint = if from.starts_with('+') {
            " (hint: prefix the number with `whatsapp:`)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "whatsapp.from_number must look like `whatsapp:+14155238886`{hint}"
        )));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.providers.is_empty() {
        return Err(ConfigError::Validation(
            "llm.providers must declare at least one provider".to_string(),
        ));
    }

    if !llm.providers.iter().any(|spec| spec.kind == llm.primary) {
        return Err(ConfigError::Validation(format!(
            "llm.primary `{}` has no matching entry in llm.providers",
            llm.primary.as_str()
        )));
    }

    for spec in &llm.providers {
        if spec.timeout_secs == 0 || spec.timeout_secs > 300 {
            return Err(ConfigError::Validation(format!(
                "llm provider `{}` timeout_secs must be in range 1..=300",
                spec.kind.as_str()
            )));
        }
        if spec.rate_limit_per_minute == 0 {
            return Err(ConfigError::Validation(format!(
                "llm provider `{}` rate_limit_per_minute must be greater than zero",
                spec.kind.as_str()
            )));
        }
        if spec.kind == ProviderKind::Ollama {
            let missing =
                spec.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm provider `ollama` requires base_url".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.known_subject_timeout_secs == 0 || server.new_subject_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "server webhook timeouts must be greater than zero".to_string(),
        ));
    }

    if server.new_subject_timeout_secs < server.known_subject_timeout_secs {
        return Err(ConfigError::Validation(
            "server.new_subject_timeout_secs must be at least the known-subject timeout"
                .to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_queue(queue: &QueueConfig) -> Result<(), ConfigError> {
    if queue.capacity == 0 {
        return Err(ConfigError::Validation(
            "queue.capacity must be greater than zero".to_string(),
        ));
    }
    if queue.attempt_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "queue.attempt_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsappPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    queue: Option<QueuePatch>,
    venue: Option<VenuePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsappPatch {
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    send_max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    primary: Option<ProviderKind>,
    providers: Option<Vec<ProviderSpecPatch>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProviderSpecPatch {
    kind: ProviderKind,
    model: String,
    api_key: Option<String>,
    base_url: Option<String>,
    rate_limit_per_minute: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    known_subject_timeout_secs: Option<u64>,
    new_subject_timeout_secs: Option<u64>,
    deferred_replies: Option<bool>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QueuePatch {
    capacity: Option<usize>,
    max_retries: Option<u32>,
    attempt_timeout_secs: Option<u64>,
    retry_base_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VenuePatch {
    name: Option<String>,
    persona_name: Option<String>,
    city: Option<String>,
    address: Option<String>,
    opening_hours: Option<String>,
    show_nights: Option<String>,
    blurb: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, ProviderKind};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_vars() {
        env::set_var("PALCO_WHATSAPP_ACCOUNT_SID", "ACtest000");
        env::set_var("PALCO_WHATSAPP_AUTH_TOKEN", "token-test");
    }

    const REQUIRED_VARS: &[&str] = &["PALCO_WHATSAPP_ACCOUNT_SID", "PALCO_WHATSAPP_AUTH_TOKEN"];

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TWILIO_SID", "ACfrom-env");
        env::set_var("TEST_TWILIO_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("palco.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
account_sid = "${TEST_TWILIO_SID}"
auth_token = "${TEST_TWILIO_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.whatsapp.account_sid.expose_secret() == "ACfrom-env",
                "account sid should be loaded from environment",
            )?;
            ensure(
                config.whatsapp.auth_token.expose_secret() == "token-from-env",
                "auth token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TWILIO_SID", "TEST_TWILIO_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("PALCO_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("palco.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["PALCO_DATABASE_URL"]);
        result
    }

    #[test]
    fn primary_provider_leads_the_fallback_order() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("PALCO_LLM_PRIMARY", "openai");
        env::set_var("PALCO_LLM_OPENAI_API_KEY", "sk-test");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            let ordered = config.llm.ordered_providers();
            ensure(
                ordered.first().map(|spec| spec.kind) == Some(ProviderKind::OpenAi),
                "primary provider should come first in fallback order",
            )?;
            ensure(ordered.len() == 3, "all providers should remain in the fallback chain")?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["PALCO_LLM_PRIMARY", "PALCO_LLM_OPENAI_API_KEY"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PALCO_WHATSAPP_ACCOUNT_SID", "bad-sid");
        env::set_var("PALCO_WHATSAPP_AUTH_TOKEN", "token-test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("whatsapp.account_sid")
            );
            ensure(has_message, "validation failure should mention whatsapp.account_sid")
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PALCO_WHATSAPP_ACCOUNT_SID", "ACsecret-value");
        env::set_var("PALCO_WHATSAPP_AUTH_TOKEN", "token-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("ACsecret-value"),
                "debug output should not contain the account sid",
            )?;
            ensure(
                !debug.contains("token-secret-value"),
                "debug output should not contain the auth token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        result
    }
}
