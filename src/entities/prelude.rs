pub use super::access_tokens::Entity as AccessTokens;
pub use super::account_creation_codes::Entity as AccountCreationCodes;
pub use super::permissions::Entity as Permissions;
pub use super::users::Entity as Users;
