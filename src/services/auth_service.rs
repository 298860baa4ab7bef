//! Domain service for authentication and account management.
//!
//! This is the surface the HTTP layer and CLI consume. Every method that acts
//! for a signed-in user takes the presented bearer token; identity is never
//! passed in directly.

use crate::domain::{AccountCodeId, TokenId, UserId};
use crate::gateway::GatewayError;
use crate::gateway::account_codes::{AccountCodeSummary, IssueAccountCode, IssuedCode};
use crate::gateway::permissions::GrantedPermission;
use crate::gateway::preauth::{LoginOutcome, NewAccount};
use crate::gateway::tokens::TokenSummary;
use crate::gateway::users::{SettingsUpdate, UserProfile};

pub type AuthResult<T> = Result<T, GatewayError>;

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and mints a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidCredential`] for an unknown username and
    /// for a wrong password alike.
    async fn login(&self, username: &str, password: &str) -> AuthResult<LoginOutcome>;

    /// Revokes the token presented with this call.
    async fn logout(&self, token: Option<&str>) -> AuthResult<()>;

    /// Redeems an account-creation code.
    async fn create_account(&self, account: NewAccount) -> AuthResult<UserId>;

    /// Reports whether a code could be redeemed right now. No side effects.
    async fn validate_account_code(&self, code: &str) -> AuthResult<()>;

    /// First-run system code. Refused once any user or code exists.
    async fn bootstrap_account_code(&self, request: IssueAccountCode) -> AuthResult<IssuedCode>;

    async fn current_token(&self, token: Option<&str>) -> AuthResult<TokenSummary>;

    async fn list_tokens(&self, token: Option<&str>) -> AuthResult<Vec<TokenSummary>>;

    /// Manually revokes one of the caller's own tokens, by its listing id.
    async fn revoke_token(&self, token: Option<&str>, target: TokenId) -> AuthResult<()>;

    async fn current_user(&self, token: Option<&str>) -> AuthResult<UserProfile>;

    async fn update_settings(
        &self,
        token: Option<&str>,
        update: SettingsUpdate,
    ) -> AuthResult<UserProfile>;

    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidCredential`] if the current password is wrong.
    async fn change_password(
        &self,
        token: Option<&str>,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()>;

    /// Soft-deletes the caller and revokes all of their tokens.
    async fn delete_account(&self, token: Option<&str>) -> AuthResult<()>;

    async fn check_permission(&self, token: Option<&str>, name: &str) -> AuthResult<()>;

    /// All of `names` must be held. Stops at the first missing one.
    async fn check_permissions(&self, token: Option<&str>, names: Vec<String>) -> AuthResult<()>;

    async fn list_permissions(&self, token: Option<&str>) -> AuthResult<Vec<GrantedPermission>>;

    async fn grant_permission(
        &self,
        token: Option<&str>,
        user_id: UserId,
        name: &str,
    ) -> AuthResult<()>;

    async fn revoke_permission(
        &self,
        token: Option<&str>,
        user_id: UserId,
        name: &str,
    ) -> AuthResult<()>;

    async fn issue_account_code(
        &self,
        token: Option<&str>,
        request: IssueAccountCode,
    ) -> AuthResult<IssuedCode>;

    async fn list_account_codes(&self, token: Option<&str>)
    -> AuthResult<Vec<AccountCodeSummary>>;

    async fn revoke_account_code(&self, token: Option<&str>, code_id: AccountCodeId)
    -> AuthResult<()>;
}
