//! Crate-level error type.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::auth::error::AuthError;
use crate::auth::gate::GateError;

/// Top-level error for callers of the crate and the command line.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

impl Error {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(err) => match err {
                AuthError::AccessDenied | AuthError::ExpiredToken => ErrorCategory::Authentication,
                AuthError::AuthorizationServer { .. } => ErrorCategory::Server,
                AuthError::UnsafeVerificationUri { .. }
                | AuthError::InvalidResponse(_)
                | AuthError::Serialization(_) => ErrorCategory::InvalidResponse,
                AuthError::Network(_) => ErrorCategory::Network,
                AuthError::Storage(_) => ErrorCategory::Storage,
                AuthError::Configuration(_) => ErrorCategory::Configuration,
                AuthError::Io(_) => ErrorCategory::Io,
            },
            Self::Gate(GateError::SetupRequired) => ErrorCategory::Authentication,
            Self::Gate(GateError::ScopeDenied { .. }) => ErrorCategory::Authorization,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network)
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::RunLogin,
            ErrorCategory::Authorization => RecoverySuggestion::RequestScopes,
            ErrorCategory::Network => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Storage | ErrorCategory::Io => RecoverySuggestion::CheckCredentialStore,
            ErrorCategory::Server | ErrorCategory::InvalidResponse => {
                RecoverySuggestion::ContactSupport
            }
        }
    }

    /// Operator-facing hint for [`recovery_suggestion`](Self::recovery_suggestion).
    pub fn recovery_hint(&self) -> &'static str {
        self.recovery_suggestion().hint()
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_and_expired_grants_ask_for_login() {
        for err in [AuthError::AccessDenied, AuthError::ExpiredToken] {
            let err = Error::from(err);
            assert_eq!(err.category(), ErrorCategory::Authentication);
            assert_eq!(err.recovery_suggestion(), RecoverySuggestion::RunLogin);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn scope_denial_suggests_requesting_scopes() {
        let err = Error::from(GateError::ScopeDenied {
            operation: "delete_user".to_string(),
            missing: vec!["delete:users".to_string()],
        });
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert!(err.recovery_hint().contains("--scope"));
        assert!(err.to_string().contains("delete:users"));
    }

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(Error::from(AuthError::Network("connection reset".into())).is_retryable());
        assert!(!Error::from(AuthError::server("invalid_client", None)).is_retryable());
        assert!(!Error::from(AuthError::Configuration("missing domain".into())).is_retryable());
    }

    #[test]
    fn configuration_errors_point_at_environment() {
        let err = Error::from(AuthError::Configuration("DEVICEGRANT_DOMAIN is not set".into()));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.recovery_hint().contains("DEVICEGRANT_DOMAIN"));
    }
}
