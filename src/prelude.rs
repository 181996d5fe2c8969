//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthService, AuthorizedCall, GateError, GrantEvent, Operation, OperationGate,
    ScopeAuthorizer, SecureCredentialStore, TokenLifecycleManager, TokenRecord,
};
pub use crate::config::GrantConfig;
pub use crate::error::{Error, Result};
