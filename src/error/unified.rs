//! Error classification and recovery.

use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// No usable credential, or the user refused or let the code expire.
    Authentication,
    /// A credential exists but lacks scopes.
    Authorization,
    Network,
    /// The authorization server rejected the request.
    Server,
    InvalidResponse,
    Storage,
    Configuration,
    Io,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RunLogin,
    RequestScopes,
    RetryWithBackoff,
    CheckConfiguration,
    CheckCredentialStore,
    ContactSupport,
}

impl RecoverySuggestion {
    /// One-line operator hint.
    pub fn hint(self) -> &'static str {
        match self {
            Self::RunLogin => "Run: devicegrant login",
            Self::RequestScopes => "Run: devicegrant login --scope <scope> for each missing scope",
            Self::RetryWithBackoff => "Check your network connection and try again",
            Self::CheckConfiguration => {
                "Check DEVICEGRANT_DOMAIN and DEVICEGRANT_CLIENT_ID in your environment or .env"
            }
            Self::CheckCredentialStore => {
                "Check that the OS keychain is unlocked, or set DEVICEGRANT_STORE=file"
            }
            Self::ContactSupport => "Contact the administrator of the authorization server",
        }
    }
}
