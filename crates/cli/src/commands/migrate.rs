use palco_core::config::{AppConfig, LoadOptions};
use palco_db::{connect_with_settings, migrations};

use super::CommandResult;

/// Applies pending migrations against the configured database.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: 1,
                output: format!("migrate: configuration failed to load: {error}"),
            }
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult {
                exit_code: 1,
                output: format!("migrate: runtime build failed: {error}"),
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
        migrations::run_pending(&pool).await?;
        pool.close().await;
        Ok::<(), anyhow::Error>(())
    });

    match outcome {
        Ok(()) => CommandResult {
            exit_code: 0,
            output: format!("migrate: database `{}` is up to date", config.database.url),
        },
        Err(error) => {
            CommandResult { exit_code: 1, output: format!("migrate: failed: {error}") }
        }
    }
}
