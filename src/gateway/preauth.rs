//! The pre-authentication allow-list.
//!
//! These are the only functions that accept a [`PreAuth`] capability, so the
//! only ones [`super::Gateway::execute_unauthenticated`] can run.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::account_codes::{self, IssueAccountCode, IssuedCode};
use super::capability::PreAuth;
use super::error::QueryError;
use super::{QueryContext, permissions, tokens, users};
use crate::domain::events::AccountEvent;
use crate::domain::{AccountCodeId, Issuer, UserId};
use crate::entities::{prelude::*, users as user_rows};

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// `login`. Unknown usernames still pay for a password verification so the
/// two failure paths cost the same and return the same error.
pub async fn login(
    _cap: PreAuth,
    ctx: QueryContext,
    (username, password): (String, String),
) -> Result<LoginOutcome, QueryError> {
    let user = users::find_live_by_username(&ctx.db, &username).await?;

    let verified = ctx
        .credentials
        .verify(&password, user.as_ref().map(|u| u.password_hash.as_str()))
        .await?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            metrics::counter!("logins_total", "outcome" => "failure").increment(1);
            return Err(QueryError::Credentials { username });
        }
    };

    let issued = tokens::login_session(&ctx, &user, ctx.now()).await?;

    metrics::counter!("logins_total", "outcome" => "success").increment(1);
    info!(
        user_id = user.id,
        evicted = issued.evicted,
        "User logged in"
    );

    Ok(LoginOutcome {
        token: issued.token,
        message: format!("Welcome back, {}", user.username),
        expires_at: issued.expires_at,
    })
}

/// `redeemInvitation_validate`: reports whether `code` could be redeemed right
/// now. Reads only.
pub async fn validate_account_code(
    _cap: PreAuth,
    ctx: QueryContext,
    code: String,
) -> Result<(), QueryError> {
    let found = account_codes::find_by_code(&ctx.db, &code).await?;
    account_codes::check_redeemable(found.as_ref(), None, ctx.now())?;
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub code: String,
}

/// `createAccount`: redeems an account-creation code.
///
/// The code is claimed with a single conditional update before anything else
/// is written. Once claimed it stays used even if creating the user fails
/// afterwards; that case is reported as `RedemptionIncomplete` for an
/// operator to resolve.
pub async fn create_account(
    _cap: PreAuth,
    ctx: QueryContext,
    account: NewAccount,
) -> Result<UserId, QueryError> {
    users::validate_username(&account.username)?;
    users::validate_email(&account.email)?;
    users::validate_password(&account.password, ctx.policy.min_password_length)?;

    let now = ctx.now();
    let found = account_codes::find_by_code(&ctx.db, &account.code).await?;
    let code = account_codes::check_redeemable(found.as_ref(), Some(account.email.as_str()), now)?;
    let code_id = AccountCodeId::new(code.id);
    let grants = account_codes::granted_permissions(code)?;

    if let Err(conflict) = users::ensure_available(&ctx.db, &account.username, &account.email).await
    {
        // The colliding user may come from a racing redemption of this same
        // code; report the code as used in that case.
        let latest = account_codes::find_by_code(&ctx.db, &account.code).await?;
        account_codes::check_redeemable(latest.as_ref(), Some(account.email.as_str()), now)?;
        return Err(conflict);
    }

    let digest = ctx.credentials.hash(&account.password).await?;

    // Hashing takes a while; the claim re-checks expiry at its own instant.
    account_codes::claim(&ctx.db, code, ctx.now()).await?;

    let created = async {
        let txn = ctx.db.begin().await?;

        let user = user_rows::ActiveModel {
            username: Set(account.username.clone()),
            email: Set(account.email.clone()),
            password_hash: Set(digest),
            created_at: Set(now),
            last_login_at: Set(None),
            default_token_expiry_seconds: Set(code.token_expiry_seconds),
            max_tokens_at_a_time: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let user_id = UserId::new(user.id);
        permissions::grant_all(&txn, user_id, &grants, now).await?;
        account_codes::link_user(&txn, code_id, user_id).await?;

        txn.commit().await?;
        Ok::<_, QueryError>(user_id)
    }
    .await
    .map_err(|source| QueryError::RedemptionIncomplete {
        code_id,
        source: Box::new(source),
    })?;

    metrics::counter!("account_codes_redeemed_total").increment(1);
    info!(
        user_id = %created,
        code_id = %code_id,
        permissions = ?grants,
        "Account created from code"
    );

    ctx.publish(AccountEvent::AccountCodeRedeemed {
        code_id,
        new_user_id: created,
        username: account.username,
        issued_by: code.issued_by_user_id.map(UserId::new),
        notify_issuer: code.notify_issuer_on_redeem,
    });

    Ok(created)
}

/// First-run bootstrap: a system-issued code, only while the store holds no
/// users and no account codes at all. Both counts and the insert share one
/// transaction.
pub async fn bootstrap_account_code(
    _cap: PreAuth,
    ctx: QueryContext,
    request: IssueAccountCode,
) -> Result<IssuedCode, QueryError> {
    let now = ctx.now();
    let txn = ctx.db.begin().await?;

    let user_count = Users::find().count(&txn).await?;
    let code_count = account_codes::count(&txn).await?;
    if user_count > 0 || code_count > 0 {
        return Err(QueryError::BootstrapRefused {
            users: user_count,
            codes: code_count,
        });
    }

    let issued = account_codes::insert_code(&txn, Issuer::System, &request, &ctx.policy, now).await?;
    txn.commit().await?;

    info!(
        code_id = %issued.id,
        permissions = ?issued.permissions,
        "Bootstrap account code issued"
    );
    ctx.publish(AccountEvent::AccountCodeIssued {
        code_id: issued.id,
        email: issued.email.clone(),
        issued_by: None,
    });

    Ok(issued)
}
