//! Account-creation codes: single-use, email-bound invitations that carry the
//! permission set of the account they create.
//!
//! Lifecycle: `Issued -> Redeemed`, `Issued -> Revoked`, or `Issued -> Expired`
//! (derived from the clock, never stored).

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::capability::Authorized;
use super::error::{InvitationRejection, QueryError};
use super::{Caller, Policy, QueryContext, permissions, users};
use crate::domain::events::AccountEvent;
use crate::domain::{AccountCodeId, Issuer, UserId};
use crate::entities::{account_creation_codes, prelude::*};

/// Uppercase letters and digits without the easily confused `I`, `O`, `0`, `1`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const MAX_CODE_LIFETIME_MINUTES: i64 = 365 * 24 * 60;
const INSERT_ATTEMPTS: usize = 3;

#[must_use]
pub fn generate_code(length: usize) -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Codes are typed by hand: ignore case, spaces and hyphens.
#[must_use]
pub fn normalize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeState {
    Issued,
    Redeemed,
    Revoked,
    Expired,
}

impl CodeState {
    #[must_use]
    pub fn of(code: &account_creation_codes::Model, now: DateTime<Utc>) -> Self {
        if code.revoked_at.is_some() {
            Self::Revoked
        } else if code.used_at.is_some() {
            Self::Redeemed
        } else if now >= code.expires_at {
            Self::Expired
        } else {
            Self::Issued
        }
    }
}

/// Checks, in order: exists, not revoked, not used, not expired, and (when
/// `email` is given) an exact match with the bound address.
pub fn check_redeemable<'a>(
    code: Option<&'a account_creation_codes::Model>,
    email: Option<&str>,
    now: DateTime<Utc>,
) -> Result<&'a account_creation_codes::Model, InvitationRejection> {
    let code = code.ok_or(InvitationRejection::NotFound)?;

    if code.revoked_at.is_some() {
        return Err(InvitationRejection::Revoked);
    }
    if code.used_at.is_some() {
        return Err(InvitationRejection::Used);
    }
    if now >= code.expires_at {
        return Err(InvitationRejection::Expired);
    }
    if email.is_some_and(|email| email != code.email) {
        return Err(InvitationRejection::EmailMismatch);
    }

    Ok(code)
}

/// Permission names stored on a code, in grant order.
pub fn granted_permissions(code: &account_creation_codes::Model) -> Result<Vec<String>, QueryError> {
    serde_json::from_str(&code.permissions).map_err(|e| {
        DbErr::Json(format!("account code {} has a malformed permission set: {e}", code.id)).into()
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueAccountCode {
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Lifetime of the new user's login tokens. Defaults to the server setting.
    pub token_expiry_seconds: Option<i64>,
    /// How long the code stays redeemable. Defaults to the server setting.
    pub expires_in_minutes: Option<i64>,
    #[serde(default)]
    pub notify_issuer_on_redeem: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCode {
    pub id: AccountCodeId,
    pub code: String,
    pub email: String,
    pub permissions: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCodeSummary {
    pub id: AccountCodeId,
    pub code: String,
    pub email: String,
    pub issuer: Option<Issuer>,
    pub state: CodeState,
    pub permissions: Vec<String>,
    pub token_expiry_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by_user_id: Option<UserId>,
}

impl AccountCodeSummary {
    fn from_model(model: account_creation_codes::Model, now: DateTime<Utc>) -> Self {
        let permissions = granted_permissions(&model).unwrap_or_default();
        Self {
            id: AccountCodeId::new(model.id),
            state: CodeState::of(&model, now),
            issuer: Issuer::from_columns(model.issued_by_system, model.issued_by_user_id),
            permissions,
            code: model.code,
            email: model.email,
            token_expiry_seconds: model.token_expiry_seconds,
            created_at: model.created_at,
            expires_at: model.expires_at,
            revoked_at: model.revoked_at,
            used_at: model.used_at,
            used_by_user_id: model.used_by_user_id.map(UserId::new),
        }
    }
}

/// Validates and de-duplicates the permission names of a request, keeping
/// their first-seen order.
fn normalize_permissions(names: &[String]) -> Result<Vec<String>, QueryError> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        permissions::validate_name(name)?;
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    Ok(unique)
}

pub(super) async fn find_by_code<C: ConnectionTrait>(
    db: &C,
    code: &str,
) -> Result<Option<account_creation_codes::Model>, QueryError> {
    Ok(AccountCreationCodes::find()
        .filter(account_creation_codes::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await?)
}

pub(super) async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, QueryError> {
    Ok(AccountCreationCodes::find().count(db).await?)
}

/// Validates `request` and stores a new code for `issuer`.
pub(super) async fn insert_code<C: ConnectionTrait>(
    db: &C,
    issuer: Issuer,
    request: &IssueAccountCode,
    policy: &Policy,
    now: DateTime<Utc>,
) -> Result<IssuedCode, QueryError> {
    users::validate_email(&request.email)?;
    let names = normalize_permissions(&request.permissions)?;

    let token_expiry_seconds = request
        .token_expiry_seconds
        .unwrap_or(policy.default_token_expiry_seconds);
    users::validate_token_expiry(token_expiry_seconds, policy)?;

    let lifetime = match request.expires_in_minutes {
        None => policy.default_code_lifetime,
        Some(minutes) if (1..=MAX_CODE_LIFETIME_MINUTES).contains(&minutes) => {
            Duration::minutes(minutes)
        }
        Some(_) => {
            return Err(QueryError::Validation(format!(
                "Code lifetime must be between 1 and {MAX_CODE_LIFETIME_MINUTES} minutes"
            )));
        }
    };

    let encoded = serde_json::to_string(&names)
        .map_err(|e| DbErr::Json(format!("cannot encode permissions: {e}")))?;

    let mut attempt = 0;
    let model = loop {
        attempt += 1;
        let row = account_creation_codes::ActiveModel {
            code: Set(generate_code(policy.code_length)),
            email: Set(request.email.clone()),
            issued_by_system: Set(issuer == Issuer::System),
            issued_by_user_id: Set(issuer.user_id().map(|id| id.value())),
            token_expiry_seconds: Set(token_expiry_seconds),
            permissions: Set(encoded.clone()),
            created_at: Set(now),
            expires_at: Set(now + lifetime),
            revoked_at: Set(None),
            revoked_by_user_id: Set(None),
            used_at: Set(None),
            used_by_user_id: Set(None),
            notify_issuer_on_redeem: Set(request.notify_issuer_on_redeem),
            ..Default::default()
        };

        match row.insert(db).await {
            Ok(model) => break model,
            Err(e)
                if attempt < INSERT_ATTEMPTS
                    && matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                warn!(attempt, "Generated account code collided, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    };

    Ok(IssuedCode {
        id: AccountCodeId::new(model.id),
        code: model.code,
        email: model.email,
        permissions: names,
        expires_at: model.expires_at,
    })
}

/// Marks the code used. The update only lands on an unused, unrevoked and
/// unexpired code, so of two concurrent redemptions at most one gets past this
/// point, and a code that expired while the password was hashed stays unused.
pub(super) async fn claim<C: ConnectionTrait>(
    db: &C,
    code: &account_creation_codes::Model,
    now: DateTime<Utc>,
) -> Result<(), QueryError> {
    let result = AccountCreationCodes::update_many()
        .col_expr(account_creation_codes::Column::UsedAt, Expr::value(now))
        .filter(account_creation_codes::Column::Id.eq(code.id))
        .filter(account_creation_codes::Column::UsedAt.is_null())
        .filter(account_creation_codes::Column::RevokedAt.is_null())
        .filter(account_creation_codes::Column::ExpiresAt.gt(now))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let reason = if now >= code.expires_at {
            InvitationRejection::Expired
        } else {
            InvitationRejection::Used
        };
        return Err(reason.into());
    }
    Ok(())
}

pub(super) async fn link_user<C: ConnectionTrait>(
    db: &C,
    code_id: AccountCodeId,
    user_id: UserId,
) -> Result<(), QueryError> {
    AccountCreationCodes::update_many()
        .col_expr(
            account_creation_codes::Column::UsedByUserId,
            Expr::value(user_id.value()),
        )
        .filter(account_creation_codes::Column::Id.eq(code_id.value()))
        .exec(db)
        .await?;
    Ok(())
}

/// Issues a code on behalf of `caller`. Requires [`permissions::ISSUE_ACCOUNT_CODES`].
///
/// The caller may only pass on permissions they hold, unless they hold
/// [`permissions::GRANT_PERMISSIONS`].
pub async fn issue(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, request): (Caller, IssueAccountCode),
) -> Result<IssuedCode, QueryError> {
    let caller = caller.id();
    permissions::require(&ctx.db, caller, permissions::ISSUE_ACCOUNT_CODES).await?;

    if !permissions::holds(&ctx.db, caller, permissions::GRANT_PERMISSIONS).await? {
        for name in &request.permissions {
            permissions::require(&ctx.db, caller, name).await?;
        }
    }

    let issued = insert_code(&ctx.db, Issuer::User(caller), &request, &ctx.policy, ctx.now()).await?;

    info!(
        code_id = %issued.id,
        issued_by = %caller,
        permissions = ?issued.permissions,
        "Account code issued"
    );
    ctx.publish(AccountEvent::AccountCodeIssued {
        code_id: issued.id,
        email: issued.email.clone(),
        issued_by: Some(caller),
    });

    Ok(issued)
}

/// Codes issued by the caller, newest first.
pub async fn list_issued(
    _cap: Authorized,
    ctx: QueryContext,
    caller: Caller,
) -> Result<Vec<AccountCodeSummary>, QueryError> {
    let now = ctx.now();
    let rows = AccountCreationCodes::find()
        .filter(account_creation_codes::Column::IssuedByUserId.eq(caller.id().value()))
        .order_by_desc(account_creation_codes::Column::CreatedAt)
        .all(&ctx.db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| AccountCodeSummary::from_model(row, now))
        .collect())
}

/// Revokes an Issued code. Allowed for its issuer, or for any holder of
/// [`permissions::REVOKE_ANY_ACCOUNT_CODE`].
pub async fn revoke(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, code_id): (Caller, AccountCodeId),
) -> Result<(), QueryError> {
    let caller = caller.id();
    let now = ctx.now();
    let code = AccountCreationCodes::find_by_id(code_id.value())
        .one(&ctx.db)
        .await?
        .ok_or(QueryError::NotFound("account code"))?;

    let issuer = Issuer::from_columns(code.issued_by_system, code.issued_by_user_id);
    if issuer != Some(Issuer::User(caller)) {
        permissions::require(&ctx.db, caller, permissions::REVOKE_ANY_ACCOUNT_CODE).await?;
    }

    check_redeemable(Some(&code), None, now)?;

    let result = AccountCreationCodes::update_many()
        .col_expr(account_creation_codes::Column::RevokedAt, Expr::value(now))
        .col_expr(
            account_creation_codes::Column::RevokedByUserId,
            Expr::value(caller.value()),
        )
        .filter(account_creation_codes::Column::Id.eq(code_id.value()))
        .filter(account_creation_codes::Column::UsedAt.is_null())
        .filter(account_creation_codes::Column::RevokedAt.is_null())
        .exec(&ctx.db)
        .await?;

    if result.rows_affected == 0 {
        return Err(InvitationRejection::Used.into());
    }

    info!(code_id = %code_id, revoked_by = %caller, "Account code revoked");
    ctx.publish(AccountEvent::AccountCodeRevoked {
        code_id,
        revoked_by: caller,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(now: DateTime<Utc>) -> account_creation_codes::Model {
        account_creation_codes::Model {
            id: 1,
            code: "ABCDEFGHJKLM".to_string(),
            email: "a@x.com".to_string(),
            issued_by_system: true,
            issued_by_user_id: None,
            token_expiry_seconds: 3600,
            permissions: r#"["use_app"]"#.to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(5),
            revoked_at: None,
            revoked_by_user_id: None,
            used_at: None,
            used_by_user_id: None,
            notify_issuer_on_redeem: false,
        }
    }

    #[tokio::test]
    async fn claim_refuses_a_code_that_expired_after_the_check() {
        let store = crate::db::Store::new("sqlite::memory:").await.unwrap();
        let db = store.connection();
        let policy = Policy::from(&crate::config::Config::default());
        let now = Utc::now();

        let request = IssueAccountCode {
            email: "late@example.com".to_string(),
            permissions: vec![permissions::USE_APP.to_string()],
            token_expiry_seconds: None,
            expires_in_minutes: Some(5),
            notify_issuer_on_redeem: false,
        };
        let issued = insert_code(db, Issuer::System, &request, &policy, now)
            .await
            .unwrap();

        let row = find_by_code(db, &issued.code).await.unwrap().unwrap();
        let err = claim(db, &row, row.expires_at).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Invitation(InvitationRejection::Expired)
        ));

        let row = find_by_code(db, &issued.code).await.unwrap().unwrap();
        assert!(row.used_at.is_none());

        claim(db, &row, now).await.unwrap();
        let err = claim(db, &row, now).await.unwrap_err();
        assert!(matches!(err, QueryError::Invitation(InvitationRejection::Used)));
    }

    #[test]
    fn generated_codes_use_alphabet() {
        let generated = generate_code(12);
        assert_eq!(generated.len(), 12);
        assert!(generated.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert_ne!(generate_code(12), generated);
    }

    #[test]
    fn normalization_ignores_case_and_separators() {
        assert_eq!(normalize_code("abcd-efgh jklm"), "ABCDEFGHJKLM");
        assert_eq!(normalize_code(" ABCD "), "ABCD");
    }

    #[test]
    fn redeemable_checks_run_in_order() {
        let now = Utc::now();

        assert_eq!(
            check_redeemable(None, Some("a@x.com"), now).unwrap_err(),
            InvitationRejection::NotFound
        );

        // revoked, used and expired all at once: revocation is reported first
        let mut dead = code(now);
        dead.revoked_at = Some(now);
        dead.used_at = Some(now);
        dead.expires_at = now - Duration::minutes(1);
        assert_eq!(
            check_redeemable(Some(&dead), Some("b@x.com"), now).unwrap_err(),
            InvitationRejection::Revoked
        );

        dead.revoked_at = None;
        assert_eq!(
            check_redeemable(Some(&dead), Some("b@x.com"), now).unwrap_err(),
            InvitationRejection::Used
        );

        dead.used_at = None;
        assert_eq!(
            check_redeemable(Some(&dead), Some("b@x.com"), now).unwrap_err(),
            InvitationRejection::Expired
        );

        let live = code(now);
        assert_eq!(
            check_redeemable(Some(&live), Some("b@x.com"), now).unwrap_err(),
            InvitationRejection::EmailMismatch
        );
        assert_eq!(
            check_redeemable(Some(&live), Some("A@x.com"), now).unwrap_err(),
            InvitationRejection::EmailMismatch
        );
        assert!(check_redeemable(Some(&live), Some("a@x.com"), now).is_ok());
        assert!(check_redeemable(Some(&live), None, now).is_ok());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let live = code(now);
        let at_expiry = live.expires_at;
        assert_eq!(
            check_redeemable(Some(&live), None, at_expiry).unwrap_err(),
            InvitationRejection::Expired
        );
        assert_eq!(CodeState::of(&live, at_expiry), CodeState::Expired);
        assert_eq!(CodeState::of(&live, now), CodeState::Issued);
    }

    #[test]
    fn permissions_are_deduplicated_in_order() {
        let names = vec![
            "use_app".to_string(),
            "users:read".to_string(),
            "use_app".to_string(),
        ];
        assert_eq!(
            normalize_permissions(&names).unwrap(),
            vec!["use_app".to_string(), "users:read".to_string()]
        );
        assert!(normalize_permissions(&["Bad Name".to_string()]).is_err());
    }

    #[test]
    fn stored_permissions_decode() {
        let now = Utc::now();
        assert_eq!(granted_permissions(&code(now)).unwrap(), vec!["use_app"]);

        let mut broken = code(now);
        broken.permissions = "not json".to_string();
        assert!(granted_permissions(&broken).is_err());
    }
}
