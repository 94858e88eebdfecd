use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    /// Only the literal claim `admin` grants admin; any other claim is a member.
    pub fn from_claim(claim: &str) -> Role {
        if claim == "admin" { Role::Admin } else { Role::Member }
    }
}

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
}

/// A capability the caller must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission<'a> {
    Admin,
    /// Admin, or the user who owns the resource.
    Owner(&'a str),
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn authorize(&self, permission: Permission<'_>) -> Result<(), AuthError> {
        let allowed = match permission {
            Permission::Admin => self.is_admin(),
            Permission::Owner(owner) => self.is_admin() || self.subject == owner,
        };
        if allowed { Ok(()) } else { Err(AuthError::Forbidden) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Bearer` credential was presented.
    MissingToken,
    InvalidToken,
    Forbidden,
}

impl AuthError {
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Forbidden => "forbidden",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "unauthorized: missing bearer token"),
            AuthError::InvalidToken => write!(f, "unauthorized: invalid token"),
            AuthError::Forbidden => write!(f, "forbidden"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Turns a bearer credential into a [`Principal`]. Token verification lives behind this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Fixed token table, loaded from configuration.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Principal>,
}

impl StaticTokens {
    pub fn new(entries: impl IntoIterator<Item = (String, Principal)>) -> Self {
        Self {
            tokens: entries.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(subject: &str, role: Role) -> Principal {
        Principal {
            subject: subject.into(),
            role,
        }
    }

    #[test]
    fn admin_claim_is_exact() {
        assert_eq!(Role::from_claim("admin"), Role::Admin);
        assert_eq!(Role::from_claim("user"), Role::Member);
        assert_eq!(Role::from_claim("Admin"), Role::Member);
        assert_eq!(Role::from_claim(""), Role::Member);
    }

    #[test]
    fn admin_permission() {
        assert!(principal("root", Role::Admin).authorize(Permission::Admin).is_ok());
        assert_eq!(
            principal("alice", Role::Member).authorize(Permission::Admin),
            Err(AuthError::Forbidden)
        );
    }

    #[test]
    fn owner_permission() {
        let alice = principal("alice", Role::Member);
        assert!(alice.authorize(Permission::Owner("alice")).is_ok());
        assert_eq!(alice.authorize(Permission::Owner("bob")), Err(AuthError::Forbidden));
        assert!(principal("root", Role::Admin).authorize(Permission::Owner("bob")).is_ok());
    }

    #[tokio::test]
    async fn static_tokens_verify() {
        let tokens = StaticTokens::new([("t-alice".to_string(), principal("alice", Role::Member))]);
        assert_eq!(tokens.verify("t-alice").await.unwrap().subject, "alice");
        assert_eq!(tokens.verify("nope").await, Err(AuthError::InvalidToken));
        assert!(!tokens.is_empty());
        assert!(StaticTokens::default().is_empty());
    }
}
