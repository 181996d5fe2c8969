//! CLI-specific error formatting for user-facing messages.

use crate::auth::{AuthError, GateError};
use crate::error::Error;

/// Map an [`Error`] to a user-facing help string with actionable guidance.
pub fn format_error_help(err: &Error) -> String {
    match err {
        Error::Gate(GateError::ScopeDenied { operation, missing }) => format!(
            "Missing scopes for {operation}: {}. Run: devicegrant login{}",
            missing.join(", "),
            missing
                .iter()
                .map(|scope| format!(" --scope {scope}"))
                .collect::<String>()
        ),
        Error::Auth(AuthError::AuthorizationServer { .. }) => {
            format!("{err}. {}", err.recovery_hint())
        }
        other => format!("{other}\n{}", other.recovery_hint()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_denial_lists_login_flags() {
        let err = Error::from(GateError::ScopeDenied {
            operation: "token".to_string(),
            missing: vec!["delete:users".to_string(), "read:logs".to_string()],
        });
        let help = format_error_help(&err);
        assert!(help.contains("delete:users, read:logs"));
        assert!(help.contains("devicegrant login --scope delete:users --scope read:logs"));
    }

    #[test]
    fn setup_required_points_at_login() {
        let help = format_error_help(&Error::from(GateError::SetupRequired));
        assert!(help.contains("devicegrant login"));
    }

    #[test]
    fn server_errors_keep_the_server_message() {
        let err = Error::from(AuthError::server(
            "unauthorized_client",
            Some("Grant type not allowed for this client".to_string()),
        ));
        let help = format_error_help(&err);
        assert!(help.contains("unauthorized_client"));
        assert!(help.contains("Grant type not allowed"));
    }

    #[test]
    fn configuration_error_mentions_environment() {
        let err = Error::from(AuthError::Configuration(
            "DEVICEGRANT_CLIENT_ID is not set".to_string(),
        ));
        let help = format_error_help(&err);
        assert!(help.contains("DEVICEGRANT_CLIENT_ID is not set"));
        assert!(help.contains(".env"));
    }
}
