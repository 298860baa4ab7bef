use sea_orm::entity::prelude::*;

/// Bearer credential. Rows are never deleted; revocation is recorded in
/// one of the two revocation timestamps so audits can tell why a token died.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "access_tokens")]
pub struct Model {
    /// Handle shown in session listings in place of the secret.
    #[sea_orm(primary_key)]
    pub id: i32,

    /// 64-char hex string (256 bits from the OS RNG)
    #[sea_orm(unique)]
    pub token: String,

    pub user_id: i32,

    pub created_at: DateTimeUtc,

    pub expires_at: DateTimeUtc,

    pub last_used_at: DateTimeUtc,

    /// Set by explicit user action (logout, revoke from the session list).
    pub manually_revoked_at: Option<DateTimeUtc>,

    /// Set by policy (concurrent token limit eviction).
    pub automatically_revoked_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
