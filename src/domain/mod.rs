//! Domain types for identities and credentials with strong typing.
//!
//! Newtype identifiers keep user ids and account-code ids from being mixed up
//! when they travel through the gateway as query arguments.

pub mod events;
pub mod time;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a User.
///
/// # Examples
///
/// ```rust
/// use gatehouse::domain::UserId;
///
/// let id = UserId::new(42);
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for i32 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for an Account-Creation Code row (not the code itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCodeId(i32);

impl AccountCodeId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for AccountCodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of an access token. Session listings carry this instead of the
/// bearer secret, and revocation from the list goes through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(i32);

impl TokenId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who issued an Account-Creation Code.
///
/// Exactly one of the two holds; the store encodes this as the
/// `issued_by_system` flag plus a nullable `issued_by_user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Issuer {
    System,
    User(UserId),
}

impl Issuer {
    /// Rebuilds the issuer from its stored columns, `None` if they are inconsistent.
    #[must_use]
    pub fn from_columns(issued_by_system: bool, issued_by_user_id: Option<i32>) -> Option<Self> {
        match (issued_by_system, issued_by_user_id) {
            (true, None) => Some(Self::System),
            (false, Some(id)) => Some(Self::User(UserId::new(id))),
            _ => None,
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User(id) => Some(*id),
        }
    }
}

/// Short, non-reversible label for a bearer token, safe to put in logs.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    token.chars().take(6).collect::<String>() + "…"
}
