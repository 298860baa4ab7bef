//! Listens on the account event bus and records what should be sent to whom.
//!
//! Rendering and delivering the actual messages belongs to an outside
//! collaborator; this listener only logs the intent so an operator can see it.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::events::AccountEvent;

pub struct NotificationListener {
    event_bus: broadcast::Sender<AccountEvent>,
}

impl NotificationListener {
    #[must_use]
    pub const fn new(event_bus: broadcast::Sender<AccountEvent>) -> Self {
        Self { event_bus }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.event_bus.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => Self::handle_event(&event),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        error!(count, "Notification listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Account event bus closed, notification listener stopping");
                        break;
                    }
                }
            }
        })
    }

    fn handle_event(event: &AccountEvent) {
        match event {
            AccountEvent::AccountCodeRedeemed {
                code_id,
                new_user_id,
                username,
                issued_by: Some(issuer),
                notify_issuer: true,
            } => {
                info!(
                    event = "notify_issuer",
                    code_id = %code_id,
                    issuer = %issuer,
                    new_user_id = %new_user_id,
                    username = %username,
                    "Issuer asked to be notified of redemption"
                );
            }
            AccountEvent::AccountCodeIssued {
                code_id,
                email,
                issued_by,
            } => {
                info!(
                    event = "deliver_code",
                    code_id = %code_id,
                    email = %email,
                    system = issued_by.is_none(),
                    "Account code ready for delivery"
                );
            }
            other => {
                let payload = serde_json::to_string(other).unwrap_or_default();
                info!(event = "account_event", payload = %payload, "Account event");
            }
        }
    }
}
