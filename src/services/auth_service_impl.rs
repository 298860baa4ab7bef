//! Gateway-backed implementation of the `AuthService` trait.

use async_trait::async_trait;

use crate::domain::{AccountCodeId, TokenId, UserId};
use crate::gateway::account_codes::{self, AccountCodeSummary, IssueAccountCode, IssuedCode};
use crate::gateway::permissions::{self, GrantedPermission};
use crate::gateway::preauth::{self, LoginOutcome, NewAccount};
use crate::gateway::tokens::{self, TokenSummary};
use crate::gateway::users::{self, SettingsUpdate, UserProfile};
use crate::gateway::{Arg, AsCaller, CurrentToken, Gateway};
use crate::services::auth_service::{AuthResult, AuthService};

pub struct GatewayAuthService {
    gateway: Gateway,
}

impl GatewayAuthService {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl AuthService for GatewayAuthService {
    async fn login(&self, username: &str, password: &str) -> AuthResult<LoginOutcome> {
        self.gateway
            .execute_unauthenticated(
                preauth::login,
                (username.to_string(), password.to_string()),
            )
            .await
    }

    async fn logout(&self, token: Option<&str>) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(token, tokens::revoke_current, (AsCaller, CurrentToken))
            .await
    }

    async fn create_account(&self, account: NewAccount) -> AuthResult<UserId> {
        self.gateway
            .execute_unauthenticated(preauth::create_account, account)
            .await
    }

    async fn validate_account_code(&self, code: &str) -> AuthResult<()> {
        self.gateway
            .execute_unauthenticated(preauth::validate_account_code, code.to_string())
            .await
    }

    async fn bootstrap_account_code(&self, request: IssueAccountCode) -> AuthResult<IssuedCode> {
        self.gateway
            .execute_unauthenticated(preauth::bootstrap_account_code, request)
            .await
    }

    async fn current_token(&self, token: Option<&str>) -> AuthResult<TokenSummary> {
        self.gateway
            .execute_authenticated(token, tokens::current, (AsCaller, CurrentToken))
            .await
    }

    async fn list_tokens(&self, token: Option<&str>) -> AuthResult<Vec<TokenSummary>> {
        self.gateway
            .execute_authenticated(token, tokens::list_for_caller, (AsCaller, CurrentToken))
            .await
    }

    async fn revoke_token(&self, token: Option<&str>, target: TokenId) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(token, tokens::revoke, (AsCaller, Arg(target)))
            .await
    }

    async fn current_user(&self, token: Option<&str>) -> AuthResult<UserProfile> {
        self.gateway
            .execute_authenticated(token, users::current, AsCaller)
            .await
    }

    async fn update_settings(
        &self,
        token: Option<&str>,
        update: SettingsUpdate,
    ) -> AuthResult<UserProfile> {
        self.gateway
            .execute_authenticated(token, users::update_settings, (AsCaller, Arg(update)))
            .await
    }

    async fn change_password(
        &self,
        token: Option<&str>,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(
                token,
                users::change_password,
                (
                    AsCaller,
                    Arg(current_password.to_string()),
                    Arg(new_password.to_string()),
                ),
            )
            .await
    }

    async fn delete_account(&self, token: Option<&str>) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(token, users::delete_self, AsCaller)
            .await
    }

    async fn check_permission(&self, token: Option<&str>, name: &str) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(
                token,
                permissions::check_for_permission,
                (AsCaller, Arg(name.to_string())),
            )
            .await
    }

    async fn check_permissions(&self, token: Option<&str>, names: Vec<String>) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(
                token,
                permissions::check_for_permissions,
                (AsCaller, Arg(names)),
            )
            .await
    }

    async fn list_permissions(&self, token: Option<&str>) -> AuthResult<Vec<GrantedPermission>> {
        self.gateway
            .execute_authenticated(token, permissions::list_for_caller, AsCaller)
            .await
    }

    async fn grant_permission(
        &self,
        token: Option<&str>,
        user_id: UserId,
        name: &str,
    ) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(
                token,
                permissions::grant,
                (AsCaller, user_id, Arg(name.to_string())),
            )
            .await
    }

    async fn revoke_permission(
        &self,
        token: Option<&str>,
        user_id: UserId,
        name: &str,
    ) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(
                token,
                permissions::revoke,
                (AsCaller, user_id, Arg(name.to_string())),
            )
            .await
    }

    async fn issue_account_code(
        &self,
        token: Option<&str>,
        request: IssueAccountCode,
    ) -> AuthResult<IssuedCode> {
        self.gateway
            .execute_authenticated(token, account_codes::issue, (AsCaller, Arg(request)))
            .await
    }

    async fn list_account_codes(
        &self,
        token: Option<&str>,
    ) -> AuthResult<Vec<AccountCodeSummary>> {
        self.gateway
            .execute_authenticated(token, account_codes::list_issued, AsCaller)
            .await
    }

    async fn revoke_account_code(
        &self,
        token: Option<&str>,
        code_id: AccountCodeId,
    ) -> AuthResult<()> {
        self.gateway
            .execute_authenticated(token, account_codes::revoke, (AsCaller, Arg(code_id)))
            .await
    }
}
