//! One realtime session: the connection, its subscriptions and the event router,
//! wired together.

use std::sync::Arc;
use std::time::Duration;

use api::TokenProvider;
use drill_core::model::JobId;
use tokio::sync::watch;

use crate::backoff::ReconnectPolicy;
use crate::connection::{ConnectionManager, ConnectionState, ConnectionStatus};
use crate::router::ProgressEventRouter;
use crate::subscriptions::SubscriptionMultiplexer;
use crate::transport::ProgressTransport;
use crate::ws::WsTransport;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/progress";
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    /// Minimum time a finished job stays visible before completion callbacks run.
    pub completion_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_owned(),
            reconnect: ReconnectPolicy::default(),
            completion_delay: DEFAULT_COMPLETION_DELAY,
        }
    }
}

/// Cheap to clone; every clone shares the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    connection: ConnectionManager,
    subscriptions: Arc<SubscriptionMultiplexer>,
    router: Arc<ProgressEventRouter>,
}

impl RealtimeClient {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ProgressTransport>,
        tokens: Arc<dyn TokenProvider>,
        config: &RealtimeConfig,
    ) -> Self {
        let connection = ConnectionManager::new(transport, tokens, config.reconnect.clone());
        let subscriptions = SubscriptionMultiplexer::attach(&connection);
        let router = ProgressEventRouter::new(config.completion_delay);
        router.attach(&connection);
        Self {
            connection,
            subscriptions,
            router,
        }
    }

    /// Client speaking WebSocket to `config.ws_url`.
    #[must_use]
    pub fn websocket(config: &RealtimeConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::new(Arc::new(WsTransport::new(config.ws_url.clone())), tokens, config)
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionMultiplexer> {
        &self.subscriptions
    }

    #[must_use]
    pub fn router(&self) -> &Arc<ProgressEventRouter> {
        &self.router
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    pub async fn connect(&self) {
        self.connection.connect().await;
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Subscribe to `job_id` and make it the tracked job until the guard drops.
    #[must_use]
    pub fn watch_job(&self, job_id: JobId, total_chunks: u32) -> JobWatch {
        self.router.track(job_id.clone(), total_chunks);
        self.subscriptions.subscribe(job_id.clone());
        JobWatch {
            job_id,
            subscriptions: Arc::clone(&self.subscriptions),
            router: Arc::clone(&self.router),
        }
    }
}

/// Keeps one job subscribed and tracked; dropping it undoes both.
pub struct JobWatch {
    job_id: JobId,
    subscriptions: Arc<SubscriptionMultiplexer>,
    router: Arc<ProgressEventRouter>,
}

impl JobWatch {
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.subscriptions.unsubscribe(&self.job_id);
        self.router.untrack(&self.job_id);
    }
}
