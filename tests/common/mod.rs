#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectionTrait, Database};
use std::sync::Arc;

use gatehouse::config::Config;
use gatehouse::db::Store;
use gatehouse::domain::UserId;
use gatehouse::domain::time::SimulatedTimeSource;
use gatehouse::gateway::account_codes::{IssueAccountCode, IssuedCode};
use gatehouse::gateway::permissions::CATALOG;
use gatehouse::gateway::preauth::NewAccount;
use gatehouse::services::AuthService;
use gatehouse::state::SharedState;

pub const PASSWORD: &str = "correct horse battery";
pub const ROOT_EMAIL: &str = "root@example.com";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;
    config
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub state: Arc<SharedState>,
    pub clock: SimulatedTimeSource,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let clock = SimulatedTimeSource::new(start_time());
        let store = Store::new(&config.general.database_path)
            .await
            .expect("Failed to open in-memory store");
        let state = SharedState::with_store(config, store, Some(Arc::new(clock.clone())))
            .expect("Failed to build state");

        Self {
            state: Arc::new(state),
            clock,
        }
    }

    /// A harness on a throwaway database file, so a test can open its own
    /// connection next to the pool. Returns the database URL with it.
    pub async fn on_disk() -> (Self, String) {
        let path = std::env::temp_dir().join(format!("gatehouse-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        let mut config = test_config();
        config.general.database_path = url.clone();
        (Self::with_config(config).await, url)
    }

    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.state.auth_service
    }

    /// Bootstraps the first account with every catalog permission and
    /// returns a token for it.
    pub async fn root(&self) -> String {
        let issued = self
            .auth()
            .bootstrap_account_code(IssueAccountCode {
                email: ROOT_EMAIL.to_string(),
                permissions: CATALOG.iter().map(|p| p.name.to_string()).collect(),
                token_expiry_seconds: None,
                expires_in_minutes: None,
                notify_issuer_on_redeem: false,
            })
            .await
            .expect("bootstrap failed");

        self.register(&issued.code, "root", ROOT_EMAIL)
            .await
            .expect("root registration failed");
        self.login("root").await
    }

    pub async fn invite(&self, token: &str, email: &str, permissions: &[&str]) -> IssuedCode {
        self.auth()
            .issue_account_code(
                Some(token),
                IssueAccountCode {
                    email: email.to_string(),
                    permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
                    token_expiry_seconds: None,
                    expires_in_minutes: None,
                    notify_issuer_on_redeem: false,
                },
            )
            .await
            .expect("issuing account code failed")
    }

    pub async fn register(
        &self,
        code: &str,
        username: &str,
        email: &str,
    ) -> Result<UserId, gatehouse::gateway::GatewayError> {
        self.auth()
            .create_account(NewAccount {
                username: username.to_string(),
                password: PASSWORD.to_string(),
                email: email.to_string(),
                code: code.to_string(),
            })
            .await
    }

    pub async fn login(&self, username: &str) -> String {
        self.auth()
            .login(username, PASSWORD)
            .await
            .expect("login failed")
            .token
    }

    /// Invites, registers and logs in a user holding `permissions`.
    pub async fn user(&self, root: &str, username: &str, permissions: &[&str]) -> String {
        let email = format!("{username}@example.com");
        let issued = self.invite(root, &email, permissions).await;
        self.register(&issued.code, username, &email)
            .await
            .expect("registration failed");
        self.login(username).await
    }
}

/// Runs `sql` on a separate connection to the database at `url`.
pub async fn execute_sql(url: &str, sql: &str) {
    let conn = Database::connect(url)
        .await
        .expect("Failed to open side connection");
    conn.execute_unprepared(sql)
        .await
        .expect("Side connection statement failed");
    conn.close().await.expect("Failed to close side connection");
}
