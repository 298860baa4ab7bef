use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "account_creation_codes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub code: String,

    /// Redemption must present exactly this address.
    pub email: String,

    /// Mutually exclusive with `issued_by_user_id`.
    pub issued_by_system: bool,

    pub issued_by_user_id: Option<i32>,

    pub token_expiry_seconds: i64,

    /// JSON array of permission names, in grant order.
    pub permissions: String,

    pub created_at: DateTimeUtc,

    pub expires_at: DateTimeUtc,

    pub revoked_at: Option<DateTimeUtc>,

    pub revoked_by_user_id: Option<i32>,

    pub used_at: Option<DateTimeUtc>,

    pub used_by_user_id: Option<i32>,

    pub notify_issuer_on_redeem: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
