//! Flat (user, permission) grants.
//!
//! There is no hierarchy. Names may use `:` to group related capabilities
//! (`account_codes:issue`), but holding `a:b` says nothing about `a`, and
//! holding `a` says nothing about `a:b`. Callers ask yes/no questions through
//! [`check_for_permission`] / [`check_for_permissions`]; they never inspect
//! grant lists to decide access.

use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    sea_query::OnConflict,
};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::info;

use super::{Caller, QueryContext};
use super::capability::Authorized;
use super::error::QueryError;
use super::users;
use crate::domain::UserId;
use crate::entities::{permissions, prelude::*};

pub const USE_APP: &str = "use_app";
pub const ISSUE_ACCOUNT_CODES: &str = "account_codes:issue";
pub const REVOKE_ANY_ACCOUNT_CODE: &str = "account_codes:revoke_any";
pub const GRANT_PERMISSIONS: &str = "permissions:grant";
pub const REVOKE_PERMISSIONS: &str = "permissions:revoke";
pub const READ_USERS: &str = "users:read";

/// Static metadata about a known permission.
///
/// `privileged` only changes how a grant is presented; it is never consulted
/// when deciding access.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PermissionInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub privileged: bool,
}

pub const CATALOG: &[PermissionInfo] = &[
    PermissionInfo {
        name: USE_APP,
        description: "Use the portal",
        privileged: false,
    },
    PermissionInfo {
        name: ISSUE_ACCOUNT_CODES,
        description: "Issue account creation codes to invite new users",
        privileged: false,
    },
    PermissionInfo {
        name: REVOKE_ANY_ACCOUNT_CODE,
        description: "Revoke account creation codes issued by anyone",
        privileged: false,
    },
    PermissionInfo {
        name: GRANT_PERMISSIONS,
        description: "Grant any permission to any user",
        privileged: true,
    },
    PermissionInfo {
        name: REVOKE_PERMISSIONS,
        description: "Remove any permission from any user",
        privileged: true,
    },
    PermissionInfo {
        name: READ_USERS,
        description: "View other users' profiles",
        privileged: false,
    },
];

#[must_use]
pub fn info(name: &str) -> Option<&'static PermissionInfo> {
    CATALOG.iter().find(|p| p.name == name)
}

#[must_use]
pub fn is_privileged(name: &str) -> bool {
    info(name).is_some_and(|p| p.privileged)
}

/// The part of `name` before the first `:`. Informational only.
#[must_use]
pub fn family(name: &str) -> &str {
    name.split_once(':').map_or(name, |(family, _)| family)
}

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_]+(:[a-z0-9_]+)*$").unwrap_or_else(|e| panic!("bad regex: {e}"))
});

pub fn validate_name(name: &str) -> Result<(), QueryError> {
    if name.len() > 64 || !NAME_PATTERN.is_match(name) {
        return Err(QueryError::Validation(format!(
            "Invalid permission name '{name}'. Use lowercase letters, digits, '_' and ':' separators"
        )));
    }
    Ok(())
}

/// A grant held by a user, annotated with catalog metadata.
#[derive(Debug, Clone, Serialize)]
pub struct GrantedPermission {
    pub name: String,
    pub description: Option<&'static str>,
    pub privileged: bool,
    pub granted_at: DateTime<Utc>,
}

pub(super) async fn holds<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
    name: &str,
) -> Result<bool, QueryError> {
    let count = Permissions::find()
        .filter(permissions::Column::UserId.eq(user_id.value()))
        .filter(permissions::Column::Name.eq(name))
        .count(db)
        .await?;

    Ok(count > 0)
}

/// Fails with `PermissionDenied` unless `user_id` holds `name`.
pub(super) async fn require<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
    name: &str,
) -> Result<(), QueryError> {
    validate_name(name)?;

    if holds(db, user_id, name).await? {
        Ok(())
    } else {
        Err(QueryError::PermissionDenied(name.to_string()))
    }
}

/// Inserts each grant, ignoring ones the user already holds.
pub(super) async fn grant_all<C: ConnectionTrait>(
    db: &C,
    user_id: UserId,
    names: &[String],
    now: DateTime<Utc>,
) -> Result<(), QueryError> {
    for name in names {
        Permissions::insert(permissions::ActiveModel {
            user_id: Set(user_id.value()),
            name: Set(name.clone()),
            granted_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([permissions::Column::UserId, permissions::Column::Name])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    }

    Ok(())
}

/// `checkForPermission`
pub async fn check_for_permission(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, name): (Caller, String),
) -> Result<(), QueryError> {
    require(&ctx.db, caller.id(), &name).await
}

/// `checkForPermissions`: logical AND, stopping at the first missing grant.
/// Names after the first failure are not looked at.
pub async fn check_for_permissions(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, names): (Caller, Vec<String>),
) -> Result<(), QueryError> {
    for name in &names {
        require(&ctx.db, caller.id(), name).await?;
    }
    Ok(())
}

/// The caller's own grants.
pub async fn list_for_caller(
    _cap: Authorized,
    ctx: QueryContext,
    caller: Caller,
) -> Result<Vec<GrantedPermission>, QueryError> {
    let rows = Permissions::find()
        .filter(permissions::Column::UserId.eq(caller.id().value()))
        .order_by_asc(permissions::Column::Name)
        .all(&ctx.db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let meta = info(&row.name);
            GrantedPermission {
                description: meta.map(|m| m.description),
                privileged: meta.is_some_and(|m| m.privileged),
                name: row.name,
                granted_at: row.granted_at,
            }
        })
        .collect())
}

/// Grants `name` to `target`. Requires [`GRANT_PERMISSIONS`]. Idempotent.
pub async fn grant(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, target, name): (Caller, UserId, String),
) -> Result<(), QueryError> {
    require(&ctx.db, caller.id(), GRANT_PERMISSIONS).await?;
    validate_name(&name)?;

    if users::find_live_by_id(&ctx.db, target).await?.is_none() {
        return Err(QueryError::NotFound("user"));
    }

    grant_all(&ctx.db, target, std::slice::from_ref(&name), ctx.now()).await?;
    info!(
        granted_by = %caller,
        user_id = %target,
        permission = %name,
        privileged = is_privileged(&name),
        "Permission granted"
    );
    Ok(())
}

/// Removes `name` from `target`. Requires [`REVOKE_PERMISSIONS`]. Idempotent.
pub async fn revoke(
    _cap: Authorized,
    ctx: QueryContext,
    (caller, target, name): (Caller, UserId, String),
) -> Result<(), QueryError> {
    require(&ctx.db, caller.id(), REVOKE_PERMISSIONS).await?;
    validate_name(&name)?;

    let result = Permissions::delete_many()
        .filter(permissions::Column::UserId.eq(target.value()))
        .filter(permissions::Column::Name.eq(name.as_str()))
        .exec(&ctx.db)
        .await?;

    info!(
        revoked_by = %caller,
        user_id = %target,
        permission = %name,
        removed = result.rows_affected,
        "Permission revoked"
    );
    Ok(())
}
