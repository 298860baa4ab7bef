mod common;

use chrono::Duration;
use std::collections::BTreeSet;
use std::time::Instant;

use common::{Harness, PASSWORD, test_config};
use gatehouse::domain::events::AccountEvent;
use gatehouse::domain::{TokenId, token_fingerprint};
use gatehouse::gateway::GatewayError;
use gatehouse::gateway::account_codes::{CodeState, IssueAccountCode};
use gatehouse::gateway::permissions::{GRANT_PERMISSIONS, ISSUE_ACCOUNT_CODES, READ_USERS, USE_APP};
use gatehouse::gateway::tokens::TokenState;
use gatehouse::gateway::users::SettingsUpdate;

#[tokio::test]
async fn test_missing_token_is_invalid_token() {
    let h = Harness::new().await;

    let err = h.auth().current_user(None).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);

    let err = h.auth().current_user(Some("")).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);

    let err = h.auth().current_user(Some("not-a-real-token")).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);
}

#[tokio::test]
async fn test_token_expires_exactly_at_expiry() {
    let h = Harness::new().await;
    h.root().await;

    let outcome = h.auth().login("root", PASSWORD).await.unwrap();
    let token = outcome.token.as_str();

    h.clock.set(outcome.expires_at - Duration::seconds(1));
    assert!(h.auth().current_user(Some(token)).await.is_ok());

    h.clock.set(outcome.expires_at);
    let err = h.auth().current_user(Some(token)).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let h = Harness::new().await;
    let root = h.root().await;

    h.auth().logout(Some(&root)).await.unwrap();

    let err = h.auth().current_token(Some(&root)).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);
    assert_eq!(err.to_string(), GatewayError::InvalidToken.to_string());
}

#[tokio::test]
async fn test_authenticated_call_touches_last_use() {
    let h = Harness::new().await;
    let root = h.root().await;

    h.clock.advance(Duration::minutes(5));
    let summary = h.auth().current_token(Some(&root)).await.unwrap();

    assert!(summary.is_current);
    assert_eq!(summary.last_used_at, common::start_time() + Duration::minutes(5));
    assert!(summary.last_used_at > summary.created_at);
}

#[tokio::test]
async fn test_login_evicts_oldest_tokens_over_limit() {
    let h = Harness::new().await;
    let root = h.root().await;
    let first = h.user(&root, "eve", &[USE_APP]).await;

    let limit = 2;
    h.auth()
        .update_settings(
            Some(&first),
            SettingsUpdate {
                max_tokens_at_a_time: Some(limit),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();

    let logins = 5;
    let mut tokens = vec![first];
    for _ in 1..logins {
        h.clock.advance(Duration::seconds(1));
        tokens.push(h.login("eve").await);
    }

    let newest = tokens.last().unwrap();
    let listed = h.auth().list_tokens(Some(newest)).await.unwrap();
    assert_eq!(listed.len(), logins);

    // Newest first, so the listing reversed lines up with login order.
    let oldest_first: Vec<_> = listed.iter().rev().collect();
    for (summary, token) in oldest_first.iter().zip(&tokens) {
        assert_eq!(summary.fingerprint, token_fingerprint(token));
    }

    let evicted = logins - usize::try_from(limit).unwrap();
    for summary in &oldest_first[..evicted] {
        assert_eq!(summary.state, TokenState::AutomaticallyRevoked);
    }
    for summary in &oldest_first[evicted..] {
        assert_eq!(summary.state, TokenState::Valid);
    }

    let err = h.auth().current_user(Some(&tokens[0])).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);
}

#[tokio::test]
async fn test_eviction_that_does_not_land_fails_the_login() {
    let (h, url) = Harness::on_disk().await;
    let root = h.root().await;
    h.auth()
        .update_settings(
            Some(&root),
            SettingsUpdate {
                max_tokens_at_a_time: Some(1),
                ..SettingsUpdate::default()
            },
        )
        .await
        .unwrap();

    // Silently skips every automatic revocation.
    common::execute_sql(
        &url,
        "CREATE TRIGGER pin_tokens BEFORE UPDATE OF automatically_revoked_at ON access_tokens \
         BEGIN SELECT RAISE(IGNORE); END",
    )
    .await;

    h.clock.advance(Duration::seconds(1));
    let err = h.auth().login("root", PASSWORD).await.unwrap_err();
    assert_eq!(err, GatewayError::TokenRevocationFailed);

    // Nothing was issued and the existing token is untouched.
    let listed = h.auth().list_tokens(Some(&root)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, TokenState::Valid);
}

#[tokio::test]
async fn test_manual_revocation_is_recorded_separately() {
    let h = Harness::new().await;
    let root = h.root().await;
    h.clock.advance(Duration::seconds(1));
    let second = h.login("root").await;
    let first_id = h.auth().current_token(Some(&root)).await.unwrap().id;

    h.auth().revoke_token(Some(&second), first_id).await.unwrap();
    // Revoking an already revoked token succeeds.
    h.auth().revoke_token(Some(&second), first_id).await.unwrap();

    let listed = h.auth().list_tokens(Some(&second)).await.unwrap();
    let revoked = listed.iter().find(|t| t.id == first_id).unwrap();
    assert_eq!(revoked.state, TokenState::ManuallyRevoked);
    assert!(revoked.manually_revoked_at.is_some());
    assert!(revoked.automatically_revoked_at.is_none());

    // The listing identifies sessions without handing out their secrets.
    let json = serde_json::to_string(&listed).unwrap();
    assert!(!json.contains(&root));
    assert!(!json.contains(&second));
}

#[tokio::test]
async fn test_cannot_revoke_someone_elses_token() {
    let h = Harness::new().await;
    let root = h.root().await;
    let eve = h.user(&root, "eve", &[USE_APP]).await;
    let root_id = h.auth().current_token(Some(&root)).await.unwrap().id;

    let err = h.auth().revoke_token(Some(&eve), root_id).await.unwrap_err();
    assert_eq!(err, GatewayError::NotFound);

    // An id that does not exist at all looks the same.
    let err = h
        .auth()
        .revoke_token(Some(&eve), TokenId::new(9_999))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NotFound);

    assert!(h.auth().current_user(Some(&root)).await.is_ok());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let mut config = test_config();
    config.security.argon2_memory_cost_kib = 4096;
    config.security.argon2_time_cost = 2;
    let h = Harness::with_config(config).await;
    h.root().await;

    let ghost = h.auth().login("ghost_user", "anything").await.unwrap_err();
    let wrong = h.auth().login("root", "wrong_password").await.unwrap_err();
    assert_eq!(ghost, GatewayError::InvalidCredential);
    assert_eq!(wrong, GatewayError::InvalidCredential);
    assert_eq!(ghost.to_string(), wrong.to_string());

    async fn median_duration(h: &Harness, username: &str, password: &str) -> f64 {
        let mut samples = Vec::new();
        for _ in 0..7 {
            let start = Instant::now();
            let _ = h.auth().login(username, password).await;
            samples.push(start.elapsed().as_secs_f64());
        }
        samples.sort_by(f64::total_cmp);
        samples[samples.len() / 2]
    }

    let ghost_time = median_duration(&h, "ghost_user", "anything").await;
    let wrong_time = median_duration(&h, "root", "wrong_password").await;

    let ratio = ghost_time / wrong_time;
    assert!(
        (0.33..=3.0).contains(&ratio),
        "ghost {ghost_time:.4}s vs wrong password {wrong_time:.4}s"
    );
}

#[tokio::test]
async fn test_code_round_trip_grants_exact_permissions() {
    let h = Harness::new().await;
    let root = h.root().await;
    let eve = h.user(&root, "eve", &[USE_APP, ISSUE_ACCOUNT_CODES]).await;

    let held: BTreeSet<String> = h
        .auth()
        .list_permissions(Some(&eve))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();

    let expected: BTreeSet<String> = [USE_APP, ISSUE_ACCOUNT_CODES]
        .iter()
        .map(|p| (*p).to_string())
        .collect();
    assert_eq!(held, expected);

    let err = h
        .auth()
        .check_permission(Some(&eve), READ_USERS)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::PermissionDenied);
}

#[tokio::test]
async fn test_concrete_redemption_scenario() {
    let h = Harness::new().await;
    let root = h.root().await;

    let issued = h
        .auth()
        .issue_account_code(
            Some(&root),
            IssueAccountCode {
                email: "a@x.com".to_string(),
                permissions: vec![USE_APP.to_string()],
                token_expiry_seconds: None,
                expires_in_minutes: Some(5),
                notify_issuer_on_redeem: false,
            },
        )
        .await
        .unwrap();

    let err = h.register(&issued.code, "alice", "b@x.com").await.unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);

    let alice = h.register(&issued.code, "alice", "a@x.com").await.unwrap();

    let codes = h.auth().list_account_codes(Some(&root)).await.unwrap();
    let code = codes.iter().find(|c| c.id == issued.id).unwrap();
    assert!(code.used_at.is_some());
    assert_eq!(code.used_by_user_id, Some(alice));
    assert_eq!(code.state, CodeState::Redeemed);

    let err = h.register(&issued.code, "alice2", "a@x.com").await.unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let h = Harness::new().await;
    let root = h.root().await;
    let issued = h.invite(&root, "late@example.com", &[USE_APP]).await;

    h.auth().validate_account_code(&issued.code).await.unwrap();

    h.clock.set(issued.expires_at);
    let err = h.auth().validate_account_code(&issued.code).await.unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);

    let err = h
        .register(&issued.code, "late", "late@example.com")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);
}

#[tokio::test]
async fn test_codes_are_normalized_on_lookup() {
    let h = Harness::new().await;
    let root = h.root().await;
    let issued = h.invite(&root, "typist@example.com", &[USE_APP]).await;

    let (head, tail) = issued.code.split_at(4);
    let typed = format!(" {}-{} ", head.to_lowercase(), tail.to_lowercase());

    h.auth().validate_account_code(&typed).await.unwrap();
    h.register(&typed, "typist", "typist@example.com").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_redemption_admits_one() {
    let h = Harness::new().await;
    let root = h.root().await;
    let issued = h.invite(&root, "twin@example.com", &[USE_APP]).await;

    let (first, second) = tokio::join!(
        h.register(&issued.code, "twin_a", "twin@example.com"),
        h.register(&issued.code, "twin_b", "twin@example.com"),
    );

    let results = [first, second];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    for result in &results {
        if let Err(err) = result {
            assert_eq!(*err, GatewayError::InvitationInvalid);
        }
    }
}

#[tokio::test]
async fn test_revoked_code_cannot_be_redeemed() {
    let h = Harness::new().await;
    let root = h.root().await;
    let issued = h.invite(&root, "nope@example.com", &[USE_APP]).await;

    h.auth()
        .revoke_account_code(Some(&root), issued.id)
        .await
        .unwrap();

    let err = h
        .register(&issued.code, "nope", "nope@example.com")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);

    // A code that is no longer issued cannot be revoked again.
    let err = h
        .auth()
        .revoke_account_code(Some(&root), issued.id)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);
}

#[tokio::test]
async fn test_failure_after_claim_leaves_code_used() {
    let (h, url) = Harness::on_disk().await;
    let root = h.root().await;
    let issued = h.invite(&root, "late@example.com", &[USE_APP]).await;

    common::execute_sql(
        &url,
        "CREATE TRIGGER refuse_grants BEFORE INSERT ON permissions \
         BEGIN SELECT RAISE(ABORT, 'grants disabled'); END",
    )
    .await;

    let err = h
        .register(&issued.code, "late", "late@example.com")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::RedemptionIncomplete);

    let codes = h.auth().list_account_codes(Some(&root)).await.unwrap();
    let code = codes.iter().find(|c| c.id == issued.id).unwrap();
    assert!(code.used_at.is_some());
    assert!(code.used_by_user_id.is_none());

    // The user row went down with the failed grants.
    let err = h.auth().login("late", PASSWORD).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidCredential);

    common::execute_sql(&url, "DROP TRIGGER refuse_grants").await;

    let err = h
        .register(&issued.code, "late", "late@example.com")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::InvitationInvalid);
}

#[tokio::test]
async fn test_username_collision_is_a_conflict() {
    let h = Harness::new().await;
    let root = h.root().await;
    let issued = h.invite(&root, "other@example.com", &[USE_APP]).await;

    let err = h
        .register(&issued.code, "root", "other@example.com")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::InvitationConflict);

    // The code was not burned by the failed attempt.
    h.auth().validate_account_code(&issued.code).await.unwrap();
}

#[tokio::test]
async fn test_check_permissions_is_an_ordered_and() {
    let h = Harness::new().await;
    let root = h.root().await;
    let eve = h.user(&root, "eve", &[USE_APP]).await;

    let names = |list: &[&str]| list.iter().map(|n| (*n).to_string()).collect::<Vec<_>>();

    h.auth()
        .check_permissions(Some(&eve), names(&[USE_APP]))
        .await
        .unwrap();

    for order in [[USE_APP, GRANT_PERMISSIONS], [GRANT_PERMISSIONS, USE_APP]] {
        let err = h
            .auth()
            .check_permissions(Some(&eve), names(&order))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::PermissionDenied);
    }

    // Stops at the first missing grant; the malformed name is never examined.
    let err = h
        .auth()
        .check_permissions(Some(&eve), names(&[GRANT_PERMISSIONS, "NOT A NAME!"]))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::PermissionDenied);

    let err = h
        .auth()
        .check_permissions(Some(&eve), names(&["NOT A NAME!", GRANT_PERMISSIONS]))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
}

#[tokio::test]
async fn test_grant_and_revoke_require_permission() {
    let h = Harness::new().await;
    let root = h.root().await;
    let eve = h.user(&root, "eve", &[USE_APP]).await;
    let eve_id = h.auth().current_user(Some(&eve)).await.unwrap().id;

    let err = h
        .auth()
        .grant_permission(Some(&eve), eve_id, READ_USERS)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::PermissionDenied);

    h.auth()
        .grant_permission(Some(&root), eve_id, READ_USERS)
        .await
        .unwrap();
    h.auth().check_permission(Some(&eve), READ_USERS).await.unwrap();

    h.auth()
        .revoke_permission(Some(&root), eve_id, READ_USERS)
        .await
        .unwrap();
    let err = h
        .auth()
        .check_permission(Some(&eve), READ_USERS)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::PermissionDenied);
}

#[tokio::test]
async fn test_issuer_cannot_pass_on_permissions_they_lack() {
    let h = Harness::new().await;
    let root = h.root().await;
    let inviter = h.user(&root, "inviter", &[USE_APP, ISSUE_ACCOUNT_CODES]).await;

    let err = h
        .auth()
        .issue_account_code(
            Some(&inviter),
            IssueAccountCode {
                email: "friend@example.com".to_string(),
                permissions: vec![GRANT_PERMISSIONS.to_string()],
                token_expiry_seconds: None,
                expires_in_minutes: None,
                notify_issuer_on_redeem: true,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::PermissionDenied);

    let issued = h.invite(&inviter, "friend@example.com", &[USE_APP]).await;
    assert_eq!(issued.permissions, vec![USE_APP.to_string()]);
}

#[tokio::test]
async fn test_bootstrap_only_on_empty_store() {
    let h = Harness::new().await;
    h.root().await;

    let err = h
        .auth()
        .bootstrap_account_code(IssueAccountCode {
            email: "second@example.com".to_string(),
            permissions: vec![GRANT_PERMISSIONS.to_string()],
            token_expiry_seconds: None,
            expires_in_minutes: None,
            notify_issuer_on_redeem: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::PermissionDenied);
}

#[tokio::test]
async fn test_deleted_account_loses_access() {
    let h = Harness::new().await;
    let root = h.root().await;
    let eve = h.user(&root, "eve", &[USE_APP]).await;

    h.auth().delete_account(Some(&eve)).await.unwrap();

    let err = h.auth().current_user(Some(&eve)).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidToken);

    let err = h.auth().login("eve", PASSWORD).await.unwrap_err();
    assert_eq!(err, GatewayError::InvalidCredential);
}

#[tokio::test]
async fn test_change_password() {
    let h = Harness::new().await;
    let root = h.root().await;

    let err = h
        .auth()
        .change_password(Some(&root), "not my password", "a brand new secret")
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::InvalidCredential);

    h.auth()
        .change_password(Some(&root), PASSWORD, "a brand new secret")
        .await
        .unwrap();

    assert!(h.auth().login("root", PASSWORD).await.is_err());
    assert!(h.auth().login("root", "a brand new secret").await.is_ok());
}

#[tokio::test]
async fn test_redemption_publishes_event() {
    let h = Harness::new().await;
    let root = h.root().await;
    let issued = h.invite(&root, "evented@example.com", &[USE_APP]).await;

    let mut rx = h.state.event_bus.subscribe();
    let user_id = h
        .register(&issued.code, "evented", "evented@example.com")
        .await
        .unwrap();

    match rx.try_recv().unwrap() {
        AccountEvent::AccountCodeRedeemed {
            code_id,
            new_user_id,
            username,
            ..
        } => {
            assert_eq!(code_id, issued.id);
            assert_eq!(new_user_id, user_id);
            assert_eq!(username, "evented");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
