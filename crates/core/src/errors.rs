use thiserror::Error;

use crate::domain::profile::ProfileValidationError;
use crate::flows::ports::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    ProfileValidation(#[from] ProfileValidationError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// What the transport layer sees. `user_message` is the only text allowed
/// to reach the end user; raw error strings never do.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Não consegui processar sua mensagem. Pode reformular e tentar de novo?"
            }
            Self::ServiceUnavailable { .. } | Self::Internal { .. } => {
                crate::flows::engine::TECHNICAL_DIFFICULTY_REPLY
            }
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest { message: error.to_string() },
            ApplicationError::Store(error) => {
                Self::ServiceUnavailable { message: error.to_string() }
            }
            ApplicationError::Integration(message) => Self::ServiceUnavailable { message },
            ApplicationError::Configuration(message) => Self::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::flows::ports::StoreError;

    use super::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_errors_map_to_bad_request() {
        let interface = InterfaceError::from(ApplicationError::Domain(
            DomainError::InvariantViolation("missing field".to_string()),
        ));
        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert!(interface.user_message().contains("reformular"));
    }

    #[test]
    fn store_errors_map_to_service_unavailable_with_safe_copy() {
        let interface = InterfaceError::from(ApplicationError::Store(StoreError::Unavailable(
            "connection refused".to_string(),
        )));

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        // The raw error never leaks into user copy.
        assert!(!interface.user_message().contains("connection refused"));
        assert!(interface.user_message().contains("dificuldades técnicas"));
    }

    #[test]
    fn configuration_errors_map_to_internal() {
        let interface =
            InterfaceError::from(ApplicationError::Configuration("bad token".to_string()));
        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }
}
