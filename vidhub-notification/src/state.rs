use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use vidhub_shared::clients::db::create_pool;
use vidhub_shared::clients::redis::RedisClient;

use crate::config::{AppConfig, PresenceBackend, StoreBackend};
use crate::delivery::{ConnectionHub, DeliveryChannel, LocalRelay, RedisRelay, Relay};
use crate::dispatcher::NotificationDispatcher;
use crate::presence::{LocalPresence, PresenceRegistry, RedisPresence};
use crate::session::ConnectionSession;
use crate::store::{MemoryNotificationStore, NotificationStore, PgNotificationStore};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn NotificationStore>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub dispatcher: NotificationDispatcher,
    /// Set when presence is shared through Redis.
    pub redis: Option<RedisClient>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the configured store and presence backends.
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn NotificationStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let pool = create_pool(&config.database_url, config.db_pool_size)?;
                Arc::new(PgNotificationStore::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory notification store, records are lost on restart");
                Arc::new(MemoryNotificationStore::with_open_registration())
            }
        };

        let redis = match config.presence_backend {
            PresenceBackend::Redis => Some(RedisClient::connect(&config.redis_url).await?),
            PresenceBackend::Local => None,
        };

        Ok(Self::assemble(config, store, redis))
    }

    /// Build state around an existing store. Presence is shared through Redis
    /// when a client is given, process-local otherwise.
    pub fn assemble(config: AppConfig, store: Arc<dyn NotificationStore>, redis: Option<RedisClient>) -> Self {
        let hub = Arc::new(ConnectionHub::new());

        let presence: Arc<dyn PresenceRegistry>;
        let relay: Arc<dyn Relay>;
        match &redis {
            Some(client) => {
                presence = Arc::new(RedisPresence::new(client.clone()));
                relay = Arc::new(RedisRelay::new(config.node_id.clone(), hub.clone(), Arc::new(client.clone())));
            }
            None => {
                presence = Arc::new(LocalPresence::new());
                relay = Arc::new(LocalRelay::new(config.node_id.clone(), hub.clone()));
            }
        }

        let channel = DeliveryChannel::new(presence.clone(), relay);
        let dispatcher = NotificationDispatcher::new(store.clone(), channel);

        tracing::info!(
            node_id = %config.node_id,
            shared_presence = redis.is_some(),
            "notification state assembled"
        );

        Self {
            config,
            store,
            presence,
            hub,
            dispatcher,
            redis,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// A fresh session bound to this process's presence and hub.
    pub fn new_session(&self) -> ConnectionSession {
        ConnectionSession::new(&self.config.node_id, self.presence.clone(), self.hub.clone())
    }
}
