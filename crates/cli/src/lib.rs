pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "palco",
    about = "Palco operator CLI",
    long_about = "Operate Palco runtime readiness, migrations, config inspection, and an \
                  offline conversation simulator.",
    after_help = "Examples:\n  palco doctor --json\n  palco config\n  palco simulate \"oi, somos a Banda X\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, messaging credentials, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Drive the conversation flow locally against in-memory stores (no LLM calls)"
    )]
    Simulate {
        #[arg(help = "Messages to send, in order", required = true)]
        messages: Vec<String>,
        #[arg(long, default_value = "+5511999990000", help = "Subject phone number")]
        subject: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Simulate { messages, subject } => {
            commands::CommandResult { exit_code: 0, output: commands::simulate::run(&subject, &messages) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
