//! Capability-gated query gateway.
//!
//! All identity, token, permission and account-code data is read and written
//! by query functions in this module's children. Each takes a capability
//! marker as its first parameter, and the markers can only be minted here, so
//! [`Gateway::execute_authenticated`] and [`Gateway::execute_unauthenticated`]
//! are the only ways to run them.
//!
//! ```rust,ignore
//! let tokens = gateway
//!     .execute_authenticated(bearer, tokens::list_for_caller, (AsCaller, CurrentToken))
//!     .await?;
//! ```

pub mod account_codes;
pub mod capability;
pub mod credentials;
pub mod error;
pub mod permissions;
pub mod preauth;
pub mod tokens;
pub mod users;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Span, debug, field};

pub use capability::{Authorized, PreAuth};
pub use credentials::Credentials;
pub use error::{
    ConflictField, GatewayError, InvitationRejection, QueryError, StorageFailure, TokenRejection,
};

use crate::config::Config;
use crate::db::Store;
use crate::domain::events::AccountEvent;
use crate::domain::time::{SystemTimeSource, TimeSource};
use crate::domain::{UserId, token_fingerprint};

/// Limits applied by query functions, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct Policy {
    pub default_token_expiry_seconds: i64,
    pub max_token_expiry_seconds: i64,
    pub min_password_length: usize,
    pub code_length: usize,
    pub default_code_lifetime: Duration,
}

impl From<&Config> for Policy {
    fn from(config: &Config) -> Self {
        Self {
            default_token_expiry_seconds: config.tokens.default_expiry_seconds,
            max_token_expiry_seconds: config.tokens.max_expiry_seconds,
            min_password_length: config.security.min_password_length,
            code_length: config.invitations.code_length,
            default_code_lifetime: Duration::minutes(config.invitations.default_code_lifetime_minutes),
        }
    }
}

/// Everything a query function may touch. Handed out by value to each query,
/// its fields are only reachable from inside the gateway module.
#[derive(Clone)]
pub struct QueryContext {
    db: DatabaseConnection,
    clock: Arc<dyn TimeSource>,
    credentials: Credentials,
    policy: Arc<Policy>,
    events: broadcast::Sender<AccountEvent>,
}

impl QueryContext {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn publish(&self, event: AccountEvent) {
        // No subscribers is fine; delivery is best-effort.
        let _ = self.events.send(event);
    }
}

/// The verified caller of an authenticated call.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    token: String,
}

impl Session {
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// The acting user of an authenticated query.
///
/// Only the gateway can build one, from a verified [`Session`], so a query
/// that takes a `Caller` always acts as the owner of the presented token. An
/// explicit [`UserId`] does not fit in its place:
///
/// ```compile_fail
/// use gatehouse::domain::UserId;
/// use gatehouse::gateway::{Gateway, users};
///
/// async fn delete_someone(gateway: &Gateway, my_token: &str) {
///     let _ = gateway
///         .execute_authenticated(Some(my_token), users::delete_self, UserId::new(1))
///         .await;
/// }
/// ```
///
/// The same call shape with [`AsCaller`] compiles:
///
/// ```no_run
/// use gatehouse::gateway::{AsCaller, Gateway, users};
///
/// async fn delete_me(gateway: &Gateway, my_token: &str) {
///     let _ = gateway
///         .execute_authenticated(Some(my_token), users::delete_self, AsCaller)
///         .await;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(UserId);

impl Caller {
    #[must_use]
    pub const fn id(self) -> UserId {
        self.0
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Arguments for an authenticated query, resolved against the verified session
/// before the query runs.
///
/// [`AsCaller`] binds to a [`Caller`] while an explicit [`UserId`] passes
/// through as itself, so a target user can never stand in for the acting one.
pub trait Bind: Send {
    type Bound: Send;

    fn bind(self, session: &Session) -> Self::Bound;
}

/// Resolves to the [`Caller`] that owns the presented token.
#[derive(Debug, Clone, Copy)]
pub struct AsCaller;

/// Resolves to the token value presented with this call.
#[derive(Debug, Clone, Copy)]
pub struct CurrentToken;

/// A plain argument passed through unchanged.
#[derive(Debug, Clone)]
pub struct Arg<T>(pub T);

impl Bind for AsCaller {
    type Bound = Caller;

    fn bind(self, session: &Session) -> Caller {
        Caller(session.user_id)
    }
}

impl Bind for CurrentToken {
    type Bound = String;

    fn bind(self, session: &Session) -> String {
        session.token.clone()
    }
}

impl Bind for UserId {
    type Bound = Self;

    fn bind(self, _session: &Session) -> Self {
        self
    }
}

impl<T: Send> Bind for Arg<T> {
    type Bound = T;

    fn bind(self, _session: &Session) -> T {
        self.0
    }
}

impl Bind for () {
    type Bound = ();

    fn bind(self, _session: &Session) {}
}

impl<A: Bind, B: Bind> Bind for (A, B) {
    type Bound = (A::Bound, B::Bound);

    fn bind(self, session: &Session) -> Self::Bound {
        (self.0.bind(session), self.1.bind(session))
    }
}

impl<A: Bind, B: Bind, C: Bind> Bind for (A, B, C) {
    type Bound = (A::Bound, B::Bound, C::Bound);

    fn bind(self, session: &Session) -> Self::Bound {
        (self.0.bind(session), self.1.bind(session), self.2.bind(session))
    }
}

/// The single path to identity data.
#[derive(Clone)]
pub struct Gateway {
    ctx: QueryContext,
}

impl Gateway {
    pub fn new(
        store: &Store,
        config: &Config,
        events: broadcast::Sender<AccountEvent>,
    ) -> Result<Self> {
        Ok(Self {
            ctx: QueryContext {
                db: store.connection().clone(),
                clock: Arc::new(SystemTimeSource),
                credentials: Credentials::new(&config.security)?,
                policy: Arc::new(Policy::from(config)),
                events,
            },
        })
    }

    /// Replaces the clock, for deterministic tests.
    #[must_use]
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.ctx.clock = clock;
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.ctx.events.subscribe()
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.ctx.policy
    }

    /// Verifies `token`, records its use, binds `args` to the verified caller
    /// and runs `query` under an [`Authorized`] capability.
    ///
    /// A missing token fails before any store round-trip.
    pub async fn execute_authenticated<A, T, F, Fut>(
        &self,
        token: Option<&str>,
        query: F,
        args: A,
    ) -> Result<T, GatewayError>
    where
        A: Bind,
        F: FnOnce(Authorized, QueryContext, A::Bound) -> Fut + Send,
        Fut: Future<Output = Result<T, QueryError>> + Send,
        T: Send,
    {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(error::reject(TokenRejection::Missing.into()));
        };

        let session = self.verify(token).await.map_err(error::reject)?;
        Span::current().record("user_id", field::display(session.user_id));
        debug!(token = %token_fingerprint(token), "Authenticated gateway call");

        let bound = args.bind(&session);
        query(Authorized::new(), self.ctx.clone(), bound)
            .await
            .map_err(error::reject)
    }

    /// Runs a pre-authentication query from [`preauth`] without a token.
    pub async fn execute_unauthenticated<A, T, F, Fut>(
        &self,
        query: F,
        args: A,
    ) -> Result<T, GatewayError>
    where
        A: Send,
        F: FnOnce(PreAuth, QueryContext, A) -> Fut + Send,
        Fut: Future<Output = Result<T, QueryError>> + Send,
        T: Send,
    {
        query(PreAuth::new(), self.ctx.clone(), args)
            .await
            .map_err(error::reject)
    }

    async fn verify(&self, token: &str) -> Result<Session, QueryError> {
        let now = self.ctx.now();
        let record = tokens::find(&self.ctx.db, token).await?;

        if let Some(reason) = tokens::evaluate(record.as_ref(), now).rejection() {
            debug!(token = %token_fingerprint(token), reason = %reason, "Token failed verification");
            return Err(reason.into());
        }

        let Some(record) = record else {
            return Err(TokenRejection::NotFound.into());
        };

        let owner = UserId::new(record.user_id);
        if users::find_live_by_id(&self.ctx.db, owner).await?.is_none() {
            return Err(TokenRejection::OwnerInactive.into());
        }

        tokens::touch(&self.ctx.db, token, owner, now).await?;

        Ok(Session {
            user_id: owner,
            token: token.to_string(),
        })
    }
}
