//! OAuth device-grant setup, credential storage and per-operation scope checks.

pub mod device_code;
pub mod error;
pub mod events;
pub mod gate;
pub mod lifecycle;
pub mod poller;
pub mod scope;
pub mod server;
pub mod service;
pub mod store;
pub mod token;

pub use device_code::{DeviceCodePoll, DeviceGrantInitiator, DeviceGrantSession, PollState};
pub use error::AuthError;
pub use events::{silent_sink, BrowserLauncher, EventSink, GrantEvent, NoBrowser, SystemBrowser};
pub use gate::{AuthorizedCall, GateError, Operation, OperationGate};
pub use lifecycle::{TokenLifecycleManager, DEFAULT_EXPIRY_BUFFER};
pub use poller::AuthorizationPoller;
pub use scope::{Scope, ScopeAuthorizer};
pub use server::AuthorizationServer;
pub use service::{AuthService, CredentialStatus};
pub use store::{
    CredentialKey, FileBackend, KeyringBackend, MemoryBackend, SecretBackend,
    SecureCredentialStore,
};
pub use token::TokenRecord;
