//! Account events published on the event bus.
//!
//! Subscribers (the notification collaborator, the server's log task) decide
//! what to do with them; nothing here renders or sends messages.

use serde::Serialize;

use super::{AccountCodeId, UserId};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum AccountEvent {
    AccountCodeIssued {
        code_id: AccountCodeId,
        email: String,
        issued_by: Option<UserId>,
    },
    AccountCodeRedeemed {
        code_id: AccountCodeId,
        new_user_id: UserId,
        username: String,
        issued_by: Option<UserId>,
        notify_issuer: bool,
    },
    AccountCodeRevoked {
        code_id: AccountCodeId,
        revoked_by: UserId,
    },
    AccessTokensEvicted {
        user_id: UserId,
        count: usize,
    },
    AccountDeleted {
        user_id: UserId,
    },
}
