//! devicegrant: OAuth2 device-grant credential lifecycle.
//!
//! Obtains an API credential through the Device Authorization Grant, keeps
//! it in the OS keychain, refreshes it before it expires, and checks every
//! privileged operation against the scopes the credential was issued with.
//!
//! # Quick Start
//!
//! ```no_run
//! use devicegrant::prelude::*;
//!
//! const LIST_USERS: Operation = Operation::new("list_users", &["read:users"]);
//!
//! # async fn example() -> devicegrant::error::Result<()> {
//! let service = AuthService::new(GrantConfig::from_env()?)?;
//! if service.status().is_none() {
//!     service.login(&[]).await?;
//! }
//! let call = service.gate().authorize(&LIST_USERS).await?;
//! println!("calling {} as tenant {}", LIST_USERS.name, call.tenant);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
