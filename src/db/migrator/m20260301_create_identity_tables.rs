use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Users::LastLoginAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Users::DefaultTokenExpirySeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Users::MaxTokensAtATime).integer().null())
                    .col(ColumnDef::new(Users::DeletedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        // Uniqueness only applies to live accounts; soft-deleted rows keep their values.
        let db = manager.get_connection();
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_live \
             ON users (username) WHERE deleted_at IS NULL",
        )
        .await?;
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_live \
             ON users (email) WHERE deleted_at IS NULL",
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Permissions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Permissions::UserId).integer().not_null())
                    .col(ColumnDef::new(Permissions::Name).string().not_null())
                    .col(
                        ColumnDef::new(Permissions::GrantedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_permissions_user")
                            .from(Permissions::Table, Permissions::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_permissions_user_name")
                    .table(Permissions::Table)
                    .col(Permissions::UserId)
                    .col(Permissions::Name)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AccessTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AccessTokens::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AccessTokens::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(AccessTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccessTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccessTokens::LastUsedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccessTokens::ManuallyRevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AccessTokens::AutomaticallyRevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_access_tokens_user")
                            .from(AccessTokens::Table, AccessTokens::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_access_tokens_user")
                    .table(AccessTokens::Table)
                    .col(AccessTokens::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AccountCreationCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccountCreationCodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AccountCreationCodes::Email).string().not_null())
                    .col(
                        ColumnDef::new(AccountCreationCodes::IssuedBySystem)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::IssuedByUserId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::TokenExpirySeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::Permissions)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::RevokedByUserId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::UsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::UsedByUserId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AccountCreationCodes::NotifyIssuerOnRedeem)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .check(
                        Expr::cust(
                            "(issued_by_system = 1 AND issued_by_user_id IS NULL) \
                             OR (issued_by_system = 0 AND issued_by_user_id IS NOT NULL)",
                        ),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AccountCreationCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccessTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    CreatedAt,
    LastLoginAt,
    DefaultTokenExpirySeconds,
    MaxTokensAtATime,
    DeletedAt,
}

#[derive(Iden)]
enum Permissions {
    Table,
    Id,
    UserId,
    Name,
    GrantedAt,
}

#[derive(Iden)]
enum AccessTokens {
    Table,
    Id,
    Token,
    UserId,
    CreatedAt,
    ExpiresAt,
    LastUsedAt,
    ManuallyRevokedAt,
    AutomaticallyRevokedAt,
}

#[derive(Iden)]
enum AccountCreationCodes {
    Table,
    Id,
    Code,
    Email,
    IssuedBySystem,
    IssuedByUserId,
    TokenExpirySeconds,
    Permissions,
    CreatedAt,
    ExpiresAt,
    RevokedAt,
    RevokedByUserId,
    UsedAt,
    UsedByUserId,
    NotifyIssuerOnRedeem,
}
