use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::Store;
use crate::domain::events::AccountEvent;
use crate::domain::time::TimeSource;
use crate::gateway::Gateway;
use crate::services::{AuthService, GatewayAuthService};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub gateway: Gateway,

    pub auth_service: Arc<dyn AuthService>,

    pub event_bus: broadcast::Sender<AccountEvent>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::from_config(&config.general).await?;
        Self::with_store(config, store, None)
    }

    /// Builds the state over an existing store, optionally with a replacement
    /// clock. Used by tests to run against an in-memory database.
    pub fn with_store(
        config: Config,
        store: Store,
        clock: Option<Arc<dyn TimeSource>>,
    ) -> anyhow::Result<Self> {
        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size);

        let mut gateway = Gateway::new(&store, &config, event_bus.clone())?;
        if let Some(clock) = clock {
            gateway = gateway.with_time_source(clock);
        }

        let auth_service =
            Arc::new(GatewayAuthService::new(gateway.clone())) as Arc<dyn AuthService>;

        Ok(Self {
            config: Arc::new(config),
            store,
            gateway,
            auth_service,
            event_bus,
        })
    }
}
