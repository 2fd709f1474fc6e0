use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use palco_agent::{DataExtractor, IntentAnalyzer, ProviderPool};
use palco_core::config::{AppConfig, ConfigError, LoadOptions};
use palco_core::flows::ports::ProfileStore;
use palco_core::metrics::BotMetrics;
use palco_core::venue::{default_partner_directory, MockedCalendar};
use palco_core::{FlowEngine, FlowLimits, StateManager};
use palco_db::{connect_with_settings, migrations, DbPool, SqlProfileRepository, SqlStateRepository};
use palco_whatsapp::dispatch::{DispatchQueue, MessagePipeline};
use palco_whatsapp::transport::{MessageTransport, TwilioTransport};
use palco_whatsapp::{parse_command, SlashCommand};

/// Everything the HTTP surface needs, wired once at startup and shared by
/// reference.
pub struct ServerState {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub profiles: Arc<dyn ProfileStore>,
    pub states: Arc<StateManager>,
    pub pipeline: Arc<EnginePipeline>,
    pub provider_pool: Arc<ProviderPool>,
    pub metrics: Arc<BotMetrics>,
    pub queue: Arc<DispatchQueue>,
}

pub struct Application {
    pub state: Arc<ServerState>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let provider_pool = Arc::new(ProviderPool::from_config(&config.llm));
    let profiles: Arc<dyn ProfileStore> = Arc::new(SqlProfileRepository::new(db_pool.clone()));
    let states = Arc::new(StateManager::new(Arc::new(SqlStateRepository::new(db_pool.clone()))));

    let engine = Arc::new(FlowEngine::new(
        Arc::new(IntentAnalyzer::new(provider_pool.clone(), config.venue.clone())),
        Arc::new(DataExtractor::new(provider_pool.clone(), config.venue.persona_name.clone())),
        profiles.clone(),
        Arc::new(MockedCalendar::default()),
        config.venue.clone(),
        default_partner_directory(),
        FlowLimits::default(),
    ));

    let metrics = Arc::new(BotMetrics::new());
    let pipeline =
        Arc::new(EnginePipeline { engine, states: states.clone(), metrics: metrics.clone() });

    let transport: Arc<dyn MessageTransport> =
        Arc::new(TwilioTransport::from_config(&config.whatsapp));
    let queue =
        Arc::new(DispatchQueue::start(config.queue.clone(), pipeline.clone(), transport));

    Ok(Application {
        state: Arc::new(ServerState {
            config,
            db_pool,
            profiles,
            states,
            pipeline,
            provider_pool,
            metrics,
            queue,
        }),
    })
}

/// The full per-message pipeline: slash commands first, then the flow
/// engine, then state write-through. Infallible by design; the `Result` in
/// the queue port only exists so the worker can retry on timeouts.
pub struct EnginePipeline {
    engine: Arc<FlowEngine>,
    states: Arc<StateManager>,
    metrics: Arc<BotMetrics>,
}

impl EnginePipeline {
    pub fn new(engine: Arc<FlowEngine>, states: Arc<StateManager>, metrics: Arc<BotMetrics>) -> Self {
        Self { engine, states, metrics }
    }

    pub async fn respond(&self, subject_id: &str, message: &str) -> String {
        match parse_command(message) {
            Some(SlashCommand::Reset) => {
                self.states.reset(subject_id).await;
                "Conversa reiniciada! Vamos começar seu cadastro do zero. \
                 Qual é o seu nome ou nome da sua banda?"
                    .to_string()
            }
            Some(SlashCommand::Status) => {
                let state = self.states.get(subject_id).await;
                let progress = state.progress();
                format!(
                    "Status do seu cadastro:\n\
                     - Progresso: {percent}%\n\
                     - Etapa atual: {stage}\n\
                     - Tentativas: {attempts}",
                    percent = progress.percent,
                    stage = progress.stage.as_str(),
                    attempts = progress.attempts,
                )
            }
            Some(SlashCommand::Help) => "Posso ajudar com:\n\
                 • Cadastro de artistas\n\
                 • Consulta de agenda\n\
                 • Informações sobre a casa\n\n\
                 Me conta o que você precisa!"
                .to_string(),
            None => {
                let mut state = self.states.get(subject_id).await;
                let reply = self.engine.handle_message(&mut state, message).await;
                let saved = self.states.put(&state).await;
                if let Err(error) = &saved {
                    tracing::warn!(subject = subject_id, %error, "state write-through failed");
                }
                self.metrics.record_interaction(saved.is_ok());
                reply
            }
        }
    }
}

#[async_trait]
impl MessagePipeline for EnginePipeline {
    async fn process(&self, subject_id: &str, message: &str) -> Result<String> {
        Ok(self.respond(subject_id, message).await)
    }
}

#[cfg(test)]
mod tests {
    use palco_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn valid_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                whatsapp_account_sid: Some("ACtest".to_string()),
                whatsapp_auth_token: Some("token-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_messaging_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                whatsapp_account_sid: Some("not-a-sid".to_string()),
                whatsapp_auth_token: Some("token".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("whatsapp.account_sid"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_runtime() {
        let app = bootstrap(valid_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('artist_profile', 'profile_contact', 'conversation_state', 'interaction_log')",
        )
        .fetch_one(&app.state.db_pool)
        .await
        .expect("baseline tables should exist");
        assert_eq!(table_count, 4);

        assert!(!app.state.provider_pool.is_empty());
        assert!(app.state.queue.stats().running);

        app.state.queue.stop().await;
        app.state.db_pool.close().await;
    }
}
