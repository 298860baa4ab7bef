//! Bootstrap command handler

use crate::config::Config;
use crate::gateway::account_codes::IssueAccountCode;
use crate::gateway::permissions::CATALOG;
use crate::state::SharedState;

pub async fn cmd_bootstrap(
    config: Config,
    email: String,
    permissions: Vec<String>,
    expires_in_minutes: Option<i64>,
) -> anyhow::Result<()> {
    let permissions = if permissions.is_empty() {
        CATALOG.iter().map(|p| p.name.to_string()).collect()
    } else {
        permissions
    };

    let state = SharedState::new(config).await?;
    let issued = state
        .auth_service
        .bootstrap_account_code(IssueAccountCode {
            email,
            permissions,
            token_expiry_seconds: None,
            expires_in_minutes,
            notify_issuer_on_redeem: false,
        })
        .await?;

    println!("✓ Bootstrap account code issued");
    println!("  Code:        {}", issued.code);
    println!("  Email:       {}", issued.email);
    println!("  Expires:     {}", issued.expires_at.to_rfc3339());
    println!("  Permissions: {}", issued.permissions.join(", "));
    println!();
    println!("Redeem it with POST /api/accounts to create the first user.");

    Ok(())
}
