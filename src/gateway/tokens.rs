//! Access token lifecycle: verification, issuance, last-use tracking and
//! eviction when a user exceeds their concurrent token limit.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};
use serde::Serialize;
use tracing::info;

use super::capability::Authorized;
use super::error::{QueryError, TokenRejection};
use super::{Caller, QueryContext};
use crate::domain::events::AccountEvent;
use crate::domain::{TokenId, UserId, token_fingerprint};
use crate::entities::{access_tokens, prelude::*, users};

/// Verification outcome, in precedence order: the first matching state wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    NotFound,
    Expired,
    ManuallyRevoked,
    AutomaticallyRevoked,
    Valid,
}

impl TokenState {
    #[must_use]
    pub const fn rejection(self) -> Option<TokenRejection> {
        match self {
            Self::NotFound => Some(TokenRejection::NotFound),
            Self::Expired => Some(TokenRejection::Expired),
            Self::ManuallyRevoked => Some(TokenRejection::ManuallyRevoked),
            Self::AutomaticallyRevoked => Some(TokenRejection::AutomaticallyRevoked),
            Self::Valid => None,
        }
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Classifies a token row at instant `now`. Never mutates anything.
#[must_use]
pub fn evaluate(token: Option<&access_tokens::Model>, now: DateTime<Utc>) -> TokenState {
    let Some(token) = token else {
        return TokenState::NotFound;
    };

    if now >= token.expires_at {
        TokenState::Expired
    } else if token.manually_revoked_at.is_some() {
        TokenState::ManuallyRevoked
    } else if token.automatically_revoked_at.is_some() {
        TokenState::AutomaticallyRevoked
    } else {
        TokenState::Valid
    }
}

/// Generate a random bearer token (64 character hex string, 256 bits).
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Picks the tokens to revoke so that, after one more is issued, at most
/// `limit` remain valid. Oldest first.
#[must_use]
pub fn select_for_eviction(
    tokens: Vec<access_tokens::Model>,
    limit: Option<i32>,
    now: DateTime<Utc>,
) -> Vec<access_tokens::Model> {
    let Some(limit) = limit else {
        return Vec::new();
    };

    // One slot is reserved for the token about to be issued.
    let keep = usize::try_from(limit.saturating_sub(1)).unwrap_or(0);

    let mut valid: Vec<_> = tokens
        .into_iter()
        .filter(|t| evaluate(Some(t), now).is_valid())
        .collect();

    if valid.len() <= keep {
        return Vec::new();
    }

    valid.sort_by_key(|t| t.created_at);
    let excess = valid.len() - keep;
    valid.truncate(excess);
    valid
}

/// Session listing entry shown to the token owner. The secret itself is never
/// listed; `id` is what [`revoke`] takes.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    pub id: TokenId,
    pub fingerprint: String,
    pub is_current: bool,
    pub state: TokenState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub manually_revoked_at: Option<DateTime<Utc>>,
    pub automatically_revoked_at: Option<DateTime<Utc>>,
}

impl TokenSummary {
    fn from_model(model: access_tokens::Model, current: &str, now: DateTime<Utc>) -> Self {
        Self {
            is_current: model.token == current,
            state: evaluate(Some(&model), now),
            id: TokenId::new(model.id),
            fingerprint: token_fingerprint(&model.token),
            created_at: model.created_at,
            expires_at: model.expires_at,
            last_used_at: model.last_used_at,
            manually_revoked_at: model.manually_revoked_at,
            automatically_revoked_at: model.automatically_revoked_at,
        }
    }
}

pub(super) async fn find<C: ConnectionTrait>(
    db: &C,
    token: &str,
) -> Result<Option<access_tokens::Model>, QueryError> {
    Ok(AccessTokens::find()
        .filter(access_tokens::Column::Token.eq(token))
        .one(db)
        .await?)
}

async fn list_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
) -> Result<Vec<access_tokens::Model>, QueryError> {
    Ok(AccessTokens::find()
        .filter(access_tokens::Column::UserId.eq(user_id.value()))
        .order_by_desc(access_tokens::Column::CreatedAt)
        .all(db)
        .await?)
}

/// Records a use of `token` by `owner`. Zero affected rows means the token
/// cannot be attributed to that owner, which fails closed.
pub(super) async fn touch<C: ConnectionTrait>(
    db: &C,
    token: &str,
    owner: UserId,
    now: DateTime<Utc>,
) -> Result<(), QueryError> {
    let result = AccessTokens::update_many()
        .col_expr(access_tokens::Column::LastUsedAt, Expr::value(now))
        .filter(access_tokens::Column::Token.eq(token))
        .filter(access_tokens::Column::UserId.eq(owner.value()))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(TokenRejection::OwnerMismatch.into());
    }

    Ok(())
}

/// Revokes the oldest valid tokens of `user` so a new one fits under the
/// limit. Each revocation is its own preconditioned update; any that does not
/// land is reported rather than skipped.
pub(super) async fn evict_over_limit<C: ConnectionTrait>(
    db: &C,
    user: &users::Model,
    now: DateTime<Utc>,
) -> Result<usize, QueryError> {
    if user.max_tokens_at_a_time.is_none() {
        return Ok(0);
    }

    let user_id = UserId::new(user.id);
    let existing = list_for_user(db, user_id).await?;
    let excess = select_for_eviction(existing, user.max_tokens_at_a_time, now);

    for token in &excess {
        let result = AccessTokens::update_many()
            .col_expr(access_tokens::Column::AutomaticallyRevokedAt, Expr::value(now))
            .filter(access_tokens::Column::Id.eq(token.id))
            .filter(access_tokens::Column::ManuallyRevokedAt.is_null())
            .filter(access_tokens::Column::AutomaticallyRevokedAt.is_null())
            .exec(db)
            .await?;

        if result.rows_affected != 1 {
            return Err(QueryError::RevocationFailed {
                fingerprint: token_fingerprint(&token.token),
            });
        }
    }

    if !excess.is_empty() {
        info!(user_id = %user_id, evicted = excess.len(), "Revoked oldest access tokens over limit");
        metrics::counter!("tokens_evicted_total").increment(excess.len() as u64);
    }

    Ok(excess.len())
}

/// Mints and stores a token for `user`, expiring after the user's configured lifetime.
pub(super) async fn issue<C: ConnectionTrait>(
    db: &C,
    user: &users::Model,
    now: DateTime<Utc>,
) -> Result<access_tokens::Model, QueryError> {
    let token = access_tokens::ActiveModel {
        token: Set(generate_token()),
        user_id: Set(user.id),
        created_at: Set(now),
        expires_at: Set(now + Duration::seconds(user.default_token_expiry_seconds)),
        last_used_at: Set(now),
        manually_revoked_at: Set(None),
        automatically_revoked_at: Set(None),
        ..Default::default()
    };

    Ok(token.insert(db).await?)
}

/// Manually revokes every still-valid token of `user_id`. Expired or already
/// revoked tokens keep their original cause of death.
pub(super) async fn revoke_all_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<usize, QueryError> {
    let live: Vec<_> = list_for_user(db, user_id)
        .await?
        .into_iter()
        .filter(|t| evaluate(Some(t), now).is_valid())
        .collect();

    for token in &live {
        AccessTokens::update_many()
            .col_expr(access_tokens::Column::ManuallyRevokedAt, Expr::value(now))
            .filter(access_tokens::Column::Id.eq(token.id))
            .filter(access_tokens::Column::ManuallyRevokedAt.is_null())
            .filter(access_tokens::Column::AutomaticallyRevokedAt.is_null())
            .exec(db)
            .await?;
    }

    Ok(live.len())
}

/// `getAccessToken`: the token used for this call.
pub async fn current(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, token): (Caller, String),
) -> Result<TokenSummary, QueryError> {
    let now = ctx.now();
    let model = find(&ctx.db, &token)
        .await?
        .filter(|m| m.user_id == caller.id().value())
        .ok_or(QueryError::Token(TokenRejection::OwnerMismatch))?;

    Ok(TokenSummary::from_model(model, &token, now))
}

/// `getUserAccessTokens`: every token of the caller, newest first.
pub async fn list_for_caller(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, current): (Caller, String),
) -> Result<Vec<TokenSummary>, QueryError> {
    let now = ctx.now();
    let tokens = list_for_user(&ctx.db, caller.id()).await?;

    Ok(tokens
        .into_iter()
        .map(|t| TokenSummary::from_model(t, &current, now))
        .collect())
}

/// `revokeToken`: manual revocation of one of the caller's own tokens, by
/// the id shown in the session listing.
///
/// Revoking an already revoked token succeeds, so concurrent revocations of
/// the same token are idempotent.
pub async fn revoke(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, token_id): (Caller, TokenId),
) -> Result<(), QueryError> {
    let found = AccessTokens::find_by_id(token_id.value()).one(&ctx.db).await?;
    revoke_owned(&ctx, caller, found).await
}

/// `revokeSelf`: logout.
pub async fn revoke_current(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, token): (Caller, String),
) -> Result<(), QueryError> {
    let found = find(&ctx.db, &token).await?;
    revoke_owned(&ctx, caller, found).await
}

async fn revoke_owned(
    ctx: &QueryContext,
    caller: Caller,
    found: Option<access_tokens::Model>,
) -> Result<(), QueryError> {
    // Someone else's token is reported exactly like a missing one.
    let Some(token) = found.filter(|m| m.user_id == caller.id().value()) else {
        return Err(QueryError::NotFound("access token"));
    };

    AccessTokens::update_many()
        .col_expr(access_tokens::Column::ManuallyRevokedAt, Expr::value(ctx.now()))
        .filter(access_tokens::Column::Id.eq(token.id))
        .filter(access_tokens::Column::ManuallyRevokedAt.is_null())
        .filter(access_tokens::Column::AutomaticallyRevokedAt.is_null())
        .exec(&ctx.db)
        .await?;

    info!(
        user_id = %caller,
        token = %token_fingerprint(&token.token),
        "Access token revoked"
    );
    Ok(())
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub evicted: usize,
}

/// Evicts over-limit tokens and mints a new one inside one transaction that
/// starts by writing the user's row, so concurrent logins by the same user
/// are serialized instead of both reading a stale token count.
pub(super) async fn login_session(
    ctx: &QueryContext,
    user: &users::Model,
    now: DateTime<Utc>,
) -> Result<IssuedToken, QueryError> {
    let txn = ctx.db.begin().await?;

    let touched = Users::update_many()
        .col_expr(users::Column::LastLoginAt, Expr::value(now))
        .filter(users::Column::Id.eq(user.id))
        .filter(users::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;

    if touched.rows_affected == 0 {
        return Err(QueryError::Credentials {
            username: user.username.clone(),
        });
    }

    let evicted = evict_over_limit(&txn, user, now).await?;
    let token = issue(&txn, user, now).await?;

    txn.commit().await?;

    if evicted > 0 {
        ctx.publish(AccountEvent::AccessTokensEvicted {
            user_id: UserId::new(user.id),
            count: evicted,
        });
    }

    Ok(IssuedToken {
        token: token.token,
        expires_at: token.expires_at,
        evicted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_at(
        created: DateTime<Utc>,
        expires: DateTime<Utc>,
        manual: bool,
        automatic: bool,
    ) -> access_tokens::Model {
        access_tokens::Model {
            id: 0,
            token: generate_token(),
            user_id: 1,
            created_at: created,
            expires_at: expires,
            last_used_at: created,
            manually_revoked_at: manual.then_some(created),
            automatically_revoked_at: automatic.then_some(created),
        }
    }

    #[test]
    fn missing_token_is_not_found() {
        assert_eq!(evaluate(None, Utc::now()), TokenState::NotFound);
    }

    #[test]
    fn valid_only_when_unrevoked_and_unexpired() {
        let now = Utc::now();
        let created = now - Duration::hours(1);

        for expired in [false, true] {
            for manual in [false, true] {
                for automatic in [false, true] {
                    let expires = if expired {
                        now - Duration::seconds(1)
                    } else {
                        now + Duration::hours(1)
                    };
                    let token = token_at(created, expires, manual, automatic);
                    let state = evaluate(Some(&token), now);

                    assert_eq!(
                        state.is_valid(),
                        !expired && !manual && !automatic,
                        "expired={expired} manual={manual} automatic={automatic}"
                    );

                    let expected = if expired {
                        TokenState::Expired
                    } else if manual {
                        TokenState::ManuallyRevoked
                    } else if automatic {
                        TokenState::AutomaticallyRevoked
                    } else {
                        TokenState::Valid
                    };
                    assert_eq!(state, expected);
                }
            }
        }
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let token = token_at(now - Duration::hours(1), now, false, false);
        assert_eq!(evaluate(Some(&token), now), TokenState::Expired);
        assert_eq!(
            evaluate(Some(&token), now - Duration::nanoseconds(1)),
            TokenState::Valid
        );
    }

    #[test]
    fn generated_tokens_are_256_bit_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn eviction_takes_oldest_valid_first() {
        let now = Utc::now();
        let later = now + Duration::days(1);
        let tokens: Vec<_> = (0..4)
            .map(|i| token_at(now - Duration::minutes(10 - i), later, false, false))
            .collect();
        let oldest = tokens[0].token.clone();
        let second = tokens[1].token.clone();

        // limit 3 keeps two existing tokens plus the new one
        let evicted = select_for_eviction(tokens, Some(3), now);
        let evicted: Vec<_> = evicted.into_iter().map(|t| t.token).collect();
        assert_eq!(evicted, vec![oldest, second]);
    }

    #[test]
    fn eviction_ignores_dead_tokens() {
        let now = Utc::now();
        let later = now + Duration::days(1);
        let tokens = vec![
            token_at(now - Duration::minutes(5), now - Duration::minutes(1), false, false),
            token_at(now - Duration::minutes(4), later, true, false),
            token_at(now - Duration::minutes(3), later, false, true),
            token_at(now - Duration::minutes(2), later, false, false),
        ];

        assert!(select_for_eviction(tokens.clone(), Some(2), now).is_empty());
        assert_eq!(select_for_eviction(tokens, Some(1), now).len(), 1);
    }

    #[test]
    fn no_limit_means_no_eviction() {
        let now = Utc::now();
        let tokens: Vec<_> = (0..10)
            .map(|_| token_at(now, now + Duration::days(1), false, false))
            .collect();
        assert!(select_for_eviction(tokens, None, now).is_empty());
    }
}
