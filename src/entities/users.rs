use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Unique among users where `deleted_at` is null (partial index)
    pub username: String,

    /// Unique among users where `deleted_at` is null (partial index)
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub created_at: DateTimeUtc,

    pub last_login_at: Option<DateTimeUtc>,

    /// Lifetime of tokens minted at login, in seconds.
    pub default_token_expiry_seconds: i64,

    /// `None` means no limit on concurrently valid tokens.
    pub max_tokens_at_a_time: Option<i32>,

    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::access_tokens::Entity")]
    AccessTokens,
    #[sea_orm(has_many = "super::permissions::Entity")]
    Permissions,
}

impl Related<super::access_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccessTokens.def()
    }
}

impl Related<super::permissions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Permissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
