pub mod prelude;

pub mod access_tokens;
pub mod account_creation_codes;
pub mod permissions;
pub mod users;
