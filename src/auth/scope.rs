//! Per-operation scope enforcement.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::error::AuthError;

/// OpenID Connect scopes accepted without a `resource:action` shape.
const OIDC_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Scope required to receive a refresh token.
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Decides whether granted scopes cover an operation's requirement.
///
/// # Example
/// ```
/// use std::collections::BTreeSet;
/// use devicegrant::auth::ScopeAuthorizer;
///
/// let granted: BTreeSet<String> = ["read:users".to_string()].into_iter().collect();
/// assert!(ScopeAuthorizer::check(&["read:users"], &granted));
/// assert!(!ScopeAuthorizer::check(&["delete:users"], &granted));
/// assert!(ScopeAuthorizer::check(&[], &BTreeSet::new()));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ScopeAuthorizer;

impl ScopeAuthorizer {
    /// An empty requirement always passes; otherwise every scope must be granted.
    pub fn check(required: &[&str], granted: &BTreeSet<String>) -> bool {
        required.iter().all(|scope| granted.contains(*scope))
    }

    /// Required scopes absent from `granted`, sorted and deduplicated.
    pub fn missing(required: &[&str], granted: &BTreeSet<String>) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !granted.contains(**scope))
            .map(|scope| scope.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// A validated scope string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope(String);

impl Scope {
    /// Accepts `resource:action` or one of the OpenID Connect scopes.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let trimmed = raw.trim();
        if OIDC_SCOPES.contains(&trimmed) {
            return Ok(Self(trimmed.to_string()));
        }
        let well_formed = match trimmed.split_once(':') {
            Some((resource, action)) => is_scope_part(resource) && is_scope_part(action),
            None => false,
        };
        if !well_formed {
            return Err(AuthError::Configuration(format!(
                "invalid scope '{trimmed}' (expected resource:action)"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Scope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a scope list on whitespace or commas.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join scopes for the `scope` form field.
pub fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_scope_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
