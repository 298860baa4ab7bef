use super::ApiError;
use crate::domain::{AccountCodeId, TokenId, UserId};

/// Maximum number of names accepted by a single permission check.
const MAX_CHECKED_PERMISSIONS: usize = 32;

pub fn validate_login(username: &str, password: &str) -> Result<(), ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }
    Ok(())
}

pub fn validate_user_id(id: i32) -> Result<UserId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid user ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(UserId::new(id))
}

pub fn validate_code_id(id: i32) -> Result<AccountCodeId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid account code ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(AccountCodeId::new(id))
}

pub fn validate_token_id(id: i32) -> Result<TokenId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid access token ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(TokenId::new(id))
}

pub fn validate_code(code: &str) -> Result<&str, ApiError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Account code cannot be empty"));
    }
    if trimmed.len() > 128 {
        return Err(ApiError::validation("Account code is too long"));
    }
    Ok(trimmed)
}

pub fn validate_permission_names(names: Vec<String>) -> Result<Vec<String>, ApiError> {
    if names.is_empty() {
        return Err(ApiError::validation(
            "At least one permission name is required",
        ));
    }

    if names.len() > MAX_CHECKED_PERMISSIONS {
        return Err(ApiError::validation(format!(
            "At most {MAX_CHECKED_PERMISSIONS} permissions can be checked at once"
        )));
    }

    Ok(names)
}
