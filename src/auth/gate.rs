//! Credential and scope checks in front of privileged operations.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::lifecycle::TokenLifecycleManager;
use super::scope::ScopeAuthorizer;

/// A privileged operation and the scopes it needs. Declared statically.
///
/// # Example
/// ```
/// use devicegrant::auth::Operation;
///
/// const DELETE_USER: Operation = Operation::new("delete_user", &["delete:users"]);
/// assert_eq!(DELETE_USER.required_scopes, &["delete:users"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub required_scopes: &'static [&'static str],
}

impl Operation {
    pub const fn new(name: &'static str, required_scopes: &'static [&'static str]) -> Self {
        Self {
            name,
            required_scopes,
        }
    }
}

/// Credential handed to an operation that passed the gate.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizedCall {
    pub access_token: String,
    pub tenant: String,
}

impl fmt::Debug for AuthorizedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedCall")
            .field("access_token", &"<redacted>")
            .field("tenant", &self.tenant)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("no credential available; run `devicegrant login` first")]
    SetupRequired,

    #[error("operation '{operation}' needs scopes not granted to this credential: {}", missing.join(", "))]
    ScopeDenied {
        operation: String,
        missing: Vec<String>,
    },
}

/// Runs `get_valid_token()` and then the scope check, in that order.
#[derive(Clone)]
pub struct OperationGate {
    lifecycle: Arc<TokenLifecycleManager>,
}

impl OperationGate {
    pub fn new(lifecycle: Arc<TokenLifecycleManager>) -> Self {
        Self { lifecycle }
    }

    pub async fn authorize(&self, operation: &Operation) -> Result<AuthorizedCall, GateError> {
        self.authorize_scopes(operation.name, operation.required_scopes).await
    }

    /// Same as [`authorize`](Self::authorize) for scopes known only at runtime.
    pub async fn authorize_scopes(
        &self,
        operation: &str,
        required: &[&str],
    ) -> Result<AuthorizedCall, GateError> {
        let access_token = self
            .lifecycle
            .get_valid_token()
            .await
            .ok_or(GateError::SetupRequired)?;
        let record = self.lifecycle.current().ok_or(GateError::SetupRequired)?;

        if !ScopeAuthorizer::check(required, &record.granted_scopes) {
            let missing = ScopeAuthorizer::missing(required, &record.granted_scopes);
            debug!(operation, missing = ?missing, "operation denied");
            return Err(GateError::ScopeDenied {
                operation: operation.to_string(),
                missing,
            });
        }
        Ok(AuthorizedCall {
            access_token,
            tenant: record.tenant,
        })
    }
}
