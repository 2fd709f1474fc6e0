//! Slash-style commands recognized before any flow dispatch, plus the
//! stage-aware immediate acknowledgments used by the dispatch queue.

use palco_core::domain::conversation::{CollectedFields, Stage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Reset,
    Status,
    Help,
}

/// Matches the command aliases the original deployment trained users on.
pub fn parse_command(message: &str) -> Option<SlashCommand> {
    match message.trim().to_lowercase().as_str() {
        "/reiniciar" | "/restart" | "reiniciar" => Some(SlashCommand::Reset),
        "/status" | "status" => Some(SlashCommand::Status),
        "/ajuda" | "/help" | "ajuda" => Some(SlashCommand::Help),
        _ => None,
    }
}

/// Context-aware placeholder returned synchronously while the real reply is
/// produced in the background.
pub fn immediate_ack(stage: Stage, message: &str, collected: &CollectedFields) -> String {
    if let Some(command) = parse_command(message) {
        return match command {
            SlashCommand::Reset => "Entendido! Vou reiniciar seu cadastro...".to_string(),
            SlashCommand::Status => {
                "Um momento, vou verificar o status do seu cadastro...".to_string()
            }
            SlashCommand::Help => "Preparando informações de ajuda...".to_string(),
        };
    }

    match stage {
        Stage::Start => {
            let lower = message.to_lowercase();
            if ["oi", "olá", "ola", "bom dia", "boa tarde", "boa noite"]
                .iter()
                .any(|greeting| lower.contains(greeting))
            {
                "Olá! Recebemos sua mensagem. Vamos iniciar seu cadastro de artista...".to_string()
            } else {
                "Recebido! Iniciando o processamento do seu cadastro...".to_string()
            }
        }
        Stage::CollectingName => "Perfeito! Processando o nome informado...".to_string(),
        Stage::CollectingGenre => "Entendi! Processando o estilo musical...".to_string(),
        Stage::CollectingCity => "Obrigada! Verificando a cidade informada...".to_string(),
        Stage::CollectingLinks => "Ótimo! Verificando os links informados...".to_string(),
        Stage::Validating | Stage::Persisting => {
            "Quase pronto! Validando todas as informações...".to_string()
        }
        _ => match collected.filled_count() {
            0 => "Olá! Recebemos sua mensagem. Processando...".to_string(),
            1..=2 => "Continuando seu cadastro. Processando a informação...".to_string(),
            _ => "Recebido! Processando sua mensagem...".to_string(),
        },
    }
}
