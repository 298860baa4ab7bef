//! Gateway error taxonomy.
//!
//! Two representations are kept apart:
//!
//! - [`QueryError`] is what query functions return. It carries the precise
//!   reason (which token state failed, why a code was refused, the raw store
//!   error) and is only ever logged.
//! - [`GatewayError`] is what callers of the gateway see. Its messages are
//!   fixed strings. The only conversion between the two is [`reject`], which
//!   runs at the gateway boundary.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use tracing::{error, warn};

use crate::domain::AccountCodeId;

/// Why a presented bearer token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("no token was presented")]
    Missing,
    #[error("token not found")]
    NotFound,
    #[error("token expired, log in again")]
    Expired,
    #[error("token revoked by user action")]
    ManuallyRevoked,
    #[error("token revoked by account policy")]
    AutomaticallyRevoked,
    #[error("token could not be attributed to its owner")]
    OwnerMismatch,
    #[error("token owner no longer exists")]
    OwnerInactive,
}

/// Why an account-creation code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvitationRejection {
    #[error("code not found")]
    NotFound,
    #[error("code was revoked")]
    Revoked,
    #[error("code was already used")]
    Used,
    #[error("code expired")]
    Expired,
    #[error("email does not match the code")]
    EmailMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Username,
    Email,
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Username => write!(f, "username"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Detailed failure raised below the gateway.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("store error: {0}")]
    Store(#[from] DbErr),

    #[error("access token rejected: {0}")]
    Token(TokenRejection),

    #[error("credential check failed for '{username}'")]
    Credentials { username: String },

    #[error("missing permission '{0}'")]
    PermissionDenied(String),

    #[error("bootstrap refused: store holds {users} users and {codes} account codes")]
    BootstrapRefused { users: u64, codes: u64 },

    #[error("account code rejected: {0}")]
    Invitation(InvitationRejection),

    #[error("{0} already in use")]
    Conflict(ConflictField),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("could not revoke access token {fingerprint}")]
    RevocationFailed { fingerprint: String },

    #[error("account code {code_id} was claimed but account creation failed: {source}")]
    RedemptionIncomplete {
        code_id: AccountCodeId,
        #[source]
        source: Box<QueryError>,
    },

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl From<TokenRejection> for QueryError {
    fn from(reason: TokenRejection) -> Self {
        Self::Token(reason)
    }
}

impl From<InvitationRejection> for QueryError {
    fn from(reason: InvitationRejection) -> Self {
        Self::Invitation(reason)
    }
}

/// Store failure classes that are safe to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageFailure {
    #[error("The request conflicts with existing data")]
    Conflict,
    #[error("The request references data that does not exist")]
    Reference,
    #[error("The service is temporarily unavailable, please try again")]
    Unavailable,
    #[error("An internal error occurred")]
    Internal,
}

/// Error returned to callers of the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Invalid username or password")]
    InvalidCredential,

    #[error("Your session is invalid or has expired, please log in again")]
    InvalidToken,

    #[error("You do not have permission to perform this action")]
    PermissionDenied,

    #[error("This account creation code is not valid")]
    InvitationInvalid,

    #[error("That username or email address is already in use")]
    InvitationConflict,

    #[error("{0}")]
    Validation(String),

    #[error("The requested item was not found")]
    NotFound,

    #[error("Could not revoke access token")]
    TokenRevocationFailed,

    #[error("Account creation did not complete, please contact an administrator")]
    RedemptionIncomplete,

    #[error("{0}")]
    Storage(StorageFailure),
}

impl GatewayError {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::InvalidToken => "invalid_token",
            Self::PermissionDenied => "permission_denied",
            Self::InvitationInvalid => "invitation_invalid",
            Self::InvitationConflict => "invitation_conflict",
            Self::Validation(_) => "validation",
            Self::NotFound => "not_found",
            Self::TokenRevocationFailed => "token_revocation_failed",
            Self::RedemptionIncomplete => "redemption_incomplete",
            Self::Storage(_) => "storage",
        }
    }
}

/// Allow-list of store error classes. Anything not listed is `Internal`.
#[must_use]
pub fn classify_store_error(err: &DbErr) -> StorageFailure {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StorageFailure::Conflict,
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => StorageFailure::Reference,
        _ => match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => StorageFailure::Unavailable,
            _ => StorageFailure::Internal,
        },
    }
}

/// Converts a detailed failure into the caller-facing taxonomy, logging the
/// detail on the way out.
pub(super) fn reject(err: QueryError) -> GatewayError {
    let public = match &err {
        QueryError::Token(reason) => {
            warn!(reason = %reason, "Access token rejected");
            GatewayError::InvalidToken
        }
        QueryError::Credentials { username } => {
            warn!(username = %username, "Login rejected");
            GatewayError::InvalidCredential
        }
        QueryError::PermissionDenied(name) => {
            warn!(permission = %name, "Permission check failed");
            GatewayError::PermissionDenied
        }
        QueryError::BootstrapRefused { users, codes } => {
            warn!(users, codes, "System account code refused, store is not empty");
            GatewayError::PermissionDenied
        }
        QueryError::Invitation(reason) => {
            warn!(reason = %reason, "Account creation code rejected");
            GatewayError::InvitationInvalid
        }
        QueryError::Conflict(field) => {
            warn!(field = %field, "Account creation conflict");
            GatewayError::InvitationConflict
        }
        QueryError::Validation(message) => GatewayError::Validation(message.clone()),
        QueryError::NotFound(what) => {
            warn!(what, "Requested item not found");
            GatewayError::NotFound
        }
        QueryError::RevocationFailed { fingerprint } => {
            error!(token = %fingerprint, "Access token revocation failed");
            GatewayError::TokenRevocationFailed
        }
        QueryError::RedemptionIncomplete { code_id, source } => {
            error!(
                code_id = %code_id,
                error = %source,
                "Account code claimed but account creation failed; operator follow-up required"
            );
            GatewayError::RedemptionIncomplete
        }
        QueryError::Hashing(message) => {
            error!(error = %message, "Password hashing failed");
            GatewayError::Storage(StorageFailure::Internal)
        }
        QueryError::Store(db_err) => {
            let failure = classify_store_error(db_err);
            if failure == StorageFailure::Internal {
                error!(error = %db_err, "Unmapped store error");
            } else {
                warn!(error = %db_err, failure = ?failure, "Store error");
            }
            GatewayError::Storage(failure)
        }
    };

    metrics::counter!("gateway_rejections_total", "kind" => public.kind()).increment(1);
    public
}
