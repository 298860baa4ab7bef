//! User identities: lookup, profile, settings, password and soft deletion.

use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::info;

use super::capability::Authorized;
use super::error::{ConflictField, QueryError};
use super::{Caller, Policy, QueryContext, tokens};
use crate::domain::UserId;
use crate::domain::events::AccountEvent;
use crate::entities::{prelude::*, users};

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap_or_else(|e| panic!("bad regex: {e}"))
});

pub fn validate_username(username: &str) -> Result<(), QueryError> {
    if !USERNAME_PATTERN.is_match(username) {
        return Err(QueryError::Validation(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        ));
    }
    Ok(())
}

/// Shape check only; the address is bound to an account code, which is the
/// real proof of ownership.
pub fn validate_email(email: &str) -> Result<(), QueryError> {
    let well_formed = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            });

    if !well_formed {
        return Err(QueryError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), QueryError> {
    if password.chars().count() < min_length {
        return Err(QueryError::Validation(format!(
            "Password must be at least {min_length} characters"
        )));
    }
    Ok(())
}

pub fn validate_token_expiry(seconds: i64, policy: &Policy) -> Result<(), QueryError> {
    if seconds <= 0 || seconds > policy.max_token_expiry_seconds {
        return Err(QueryError::Validation(format!(
            "Token expiry must be between 1 and {} seconds",
            policy.max_token_expiry_seconds
        )));
    }
    Ok(())
}

/// A user as shown to themselves. Never carries the password digest.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub default_token_expiry_seconds: i64,
    pub max_tokens_at_a_time: Option<i32>,
}

impl From<users::Model> for UserProfile {
    fn from(model: users::Model) -> Self {
        Self {
            id: UserId::new(model.id),
            username: model.username,
            email: model.email,
            created_at: model.created_at,
            last_login_at: model.last_login_at,
            default_token_expiry_seconds: model.default_token_expiry_seconds,
            max_tokens_at_a_time: model.max_tokens_at_a_time,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub default_token_expiry_seconds: Option<i64>,
    pub max_tokens_at_a_time: Option<i32>,
    /// Removes the concurrent token limit. Wins over `max_tokens_at_a_time`.
    #[serde(default)]
    pub clear_max_tokens: bool,
}

pub(super) async fn find_live_by_id<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
) -> Result<Option<users::Model>, QueryError> {
    Ok(Users::find_by_id(user_id.value())
        .filter(users::Column::DeletedAt.is_null())
        .one(db)
        .await?)
}

pub(super) async fn find_live_by_username<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<Option<users::Model>, QueryError> {
    Ok(Users::find()
        .filter(users::Column::Username.eq(username))
        .filter(users::Column::DeletedAt.is_null())
        .one(db)
        .await?)
}

/// Fails with `Conflict` if a live user already holds `username` or `email`.
pub(super) async fn ensure_available<C: ConnectionTrait>(
    db: &C,
    username: &str,
    email: &str,
) -> Result<(), QueryError> {
    let username_taken = Users::find()
        .filter(users::Column::Username.eq(username))
        .filter(users::Column::DeletedAt.is_null())
        .count(db)
        .await?;
    if username_taken > 0 {
        return Err(QueryError::Conflict(ConflictField::Username));
    }

    let email_taken = Users::find()
        .filter(users::Column::Email.eq(email))
        .filter(users::Column::DeletedAt.is_null())
        .count(db)
        .await?;
    if email_taken > 0 {
        return Err(QueryError::Conflict(ConflictField::Email));
    }

    Ok(())
}

async fn require_live<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
) -> Result<users::Model, QueryError> {
    find_live_by_id(db, user_id)
        .await?
        .ok_or(QueryError::NotFound("user"))
}

pub async fn current(
    _cap: Authorized,
    ctx: QueryContext,
    caller: Caller,
) -> Result<UserProfile, QueryError> {
    Ok(require_live(&ctx.db, caller.id()).await?.into())
}

/// Changes the caller's token lifetime and concurrent token limit. Only new
/// logins are affected; existing tokens keep their expiry.
pub async fn update_settings(
    cap: Authorized,
    ctx: QueryContext,
    (caller, update): (Caller, SettingsUpdate),
) -> Result<UserProfile, QueryError> {
    let user_id = caller.id();
    if let Some(seconds) = update.default_token_expiry_seconds {
        validate_token_expiry(seconds, &ctx.policy)?;
    }

    let limit = if update.clear_max_tokens {
        Some(None)
    } else if let Some(limit) = update.max_tokens_at_a_time {
        if limit < 1 {
            return Err(QueryError::Validation(
                "Token limit must be at least 1".to_string(),
            ));
        }
        Some(Some(limit))
    } else {
        None
    };

    if update.default_token_expiry_seconds.is_none() && limit.is_none() {
        return current(cap, ctx, caller).await;
    }

    let mut query = Users::update_many();
    if let Some(seconds) = update.default_token_expiry_seconds {
        query = query.col_expr(users::Column::DefaultTokenExpirySeconds, Expr::value(seconds));
    }
    if let Some(limit) = limit {
        query = query.col_expr(users::Column::MaxTokensAtATime, Expr::value(limit));
    }

    let result = query
        .filter(users::Column::Id.eq(user_id.value()))
        .filter(users::Column::DeletedAt.is_null())
        .exec(&ctx.db)
        .await?;

    if result.rows_affected == 0 {
        return Err(QueryError::NotFound("user"));
    }

    info!(user_id = %user_id, "User settings updated");
    Ok(require_live(&ctx.db, user_id).await?.into())
}

/// Replaces the caller's password after re-checking the current one.
/// Existing tokens stay valid.
pub async fn change_password(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, current_password, new_password): (Caller, String, String),
) -> Result<(), QueryError> {
    let user_id = caller.id();
    let user = require_live(&ctx.db, user_id).await?;

    if !ctx
        .credentials
        .verify(&current_password, Some(user.password_hash.as_str()))
        .await?
    {
        return Err(QueryError::Credentials {
            username: user.username,
        });
    }

    validate_password(&new_password, ctx.policy.min_password_length)?;
    if new_password == current_password {
        return Err(QueryError::Validation(
            "New password must differ from the current one".to_string(),
        ));
    }

    let digest = ctx.credentials.hash(&new_password).await?;

    Users::update_many()
        .col_expr(users::Column::PasswordHash, Expr::value(digest))
        .filter(users::Column::Id.eq(user_id.value()))
        .filter(users::Column::DeletedAt.is_null())
        .exec(&ctx.db)
        .await?;

    info!(user_id = %user_id, "Password changed");
    Ok(())
}

/// Soft-deletes the caller and manually revokes every token they still hold.
/// Username and email become available to new accounts.
pub async fn delete_self(
    _cap: Authorized,
    ctx: QueryContext,
    caller: Caller,
) -> Result<(), QueryError> {
    let user_id = caller.id();
    let now = ctx.now();
    let txn = ctx.db.begin().await?;

    let result = Users::update_many()
        .col_expr(users::Column::DeletedAt, Expr::value(now))
        .filter(users::Column::Id.eq(user_id.value()))
        .filter(users::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(QueryError::NotFound("user"));
    }

    let revoked = tokens::revoke_all_for_user(&txn, user_id, now).await?;
    txn.commit().await?;

    info!(user_id = %user_id, revoked_tokens = revoked, "User deleted");
    ctx.publish(AccountEvent::AccountDeleted { user_id });
    Ok(())
}
