//! Per-role composition and task supervision.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::TunnelConfig;
use crate::dispatch;
use crate::egress::Fetch;
use crate::engine::CorrelationEngine;
use crate::error::{TunnelError, TunnelResult};
use crate::ingress::IngressServer;
use crate::lifecycle::Shutdown;
use crate::registry::PendingRegistry;
use crate::router::InboundRouter;
use crate::transport::{ConversationId, Inbound, Transport};

/// How long tasks get to finish after shutdown before they are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type TaskOutcome = (&'static str, TunnelResult<()>);

/// Wires up one role and runs it until shutdown or a fatal task exit.
pub struct Supervisor {
    config: TunnelConfig,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            shutdown: Shutdown::new(),
        }
    }

    /// Handle that stops the supervised role when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    fn conversation(&self) -> ConversationId {
        ConversationId(self.config.transport.chat_id)
    }

    /// Run the ingress role: HTTP proxy, router resolving replies, dispatcher.
    pub async fn run_ingress<T: Transport>(
        self,
        transport: T,
        inbound: Inbound,
        listener: TcpListener,
    ) -> TunnelResult<()> {
        let registry = PendingRegistry::with_limit(self.config.correlation.max_pending);
        let (queue, dispatcher) = dispatch::channel(transport);
        let engine = CorrelationEngine::new(registry.clone(), queue, &self.config.correlation);
        let router = InboundRouter::ingress(self.conversation(), registry.clone());
        let server = IngressServer::new(engine, &self.config.ingress);

        let mut tasks = JoinSet::new();
        tasks.spawn(named("dispatcher", dispatcher.run(self.shutdown.subscribe())));
        tasks.spawn(named("router", router.run(inbound, self.shutdown.subscribe())));
        let server_shutdown = self.shutdown.subscribe();
        tasks.spawn(named("ingress", async move {
            server.run(listener, server_shutdown).await.map_err(TunnelError::from)
        }));

        tracing::info!(conversation = %self.conversation(), "Ingress role running");
        self.supervise(tasks, Some(&registry)).await
    }

    /// Run the egress role: router serving OUT envelopes, dispatcher.
    pub async fn run_egress<T: Transport>(
        self,
        transport: T,
        inbound: Inbound,
        fetcher: Arc<dyn Fetch>,
    ) -> TunnelResult<()> {
        let (queue, dispatcher) = dispatch::channel(transport);
        let router = InboundRouter::egress(self.conversation(), fetcher, queue, &self.config.egress);

        let mut tasks = JoinSet::new();
        tasks.spawn(named("dispatcher", dispatcher.run(self.shutdown.subscribe())));
        tasks.spawn(named("router", router.run(inbound, self.shutdown.subscribe())));

        tracing::info!(conversation = %self.conversation(), "Egress role running");
        self.supervise(tasks, None).await
    }

    async fn supervise(
        &self,
        mut tasks: JoinSet<TaskOutcome>,
        registry: Option<&PendingRegistry>,
    ) -> TunnelResult<()> {
        let mut external = self.shutdown.subscribe();
        let mut result = Ok(());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received");
            }
            _ = external.recv() => {}
            Some(joined) = tasks.join_next() => {
                let (name, outcome) = flatten(joined);
                match outcome {
                    Ok(()) if self.shutdown.is_triggered() => {}
                    Ok(()) => tracing::warn!(task = name, "Task exited unexpectedly"),
                    Err(e) => {
                        tracing::error!(task = name, error = %e, "Task failed");
                        result = Err(e);
                    }
                }
            }
        }

        self.shutdown.trigger();
        if let Some(registry) = registry {
            let cancelled = registry.cancel_all();
            if cancelled > 0 {
                tracing::info!(cancelled, "Cancelled pending requests");
            }
        }

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(joined) = tasks.join_next().await {
                let (name, outcome) = flatten(joined);
                match outcome {
                    Ok(()) => tracing::debug!(task = name, "Task stopped"),
                    Err(e) => {
                        tracing::warn!(task = name, error = %e, "Task failed during shutdown");
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "Drain deadline passed, aborting tasks");
            tasks.abort_all();
        }

        tracing::info!("Shutdown complete");
        result
    }
}

fn named<F>(name: &'static str, task: F) -> impl Future<Output = TaskOutcome> + Send + 'static
where
    F: Future<Output = TunnelResult<()>> + Send + 'static,
{
    async move { (name, task.await) }
}

fn flatten(joined: Result<TaskOutcome, tokio::task::JoinError>) -> TaskOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => ("unknown", Err(TunnelError::Task(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryHub;
    use futures_util::future::BoxFuture;

    struct NoOrigin;

    impl Fetch for NoOrigin {
        fn fetch<'a>(&'a self, _host: &'a str, _request: Vec<u8>) -> BoxFuture<'a, TunnelResult<Vec<u8>>> {
            Box::pin(async { Err(TunnelError::Fetch("no origin".into())) })
        }
    }

    fn config() -> TunnelConfig {
        let mut config = TunnelConfig::default();
        config.transport.chat_id = 5;
        config
    }

    #[tokio::test]
    async fn test_external_shutdown_stops_egress() {
        let hub = MemoryHub::new();
        let (transport, inbound) = hub.join(ConversationId(5));
        let supervisor = Supervisor::new(config());
        let shutdown = supervisor.shutdown_handle();

        let running = tokio::spawn(supervisor.run_egress(transport, inbound, Arc::new(NoOrigin)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_transport_loss_is_fatal() {
        let hub = MemoryHub::new();
        let (transport, inbound) = hub.join(ConversationId(5));
        let supervisor = Supervisor::new(config());

        let running = tokio::spawn(supervisor.run_egress(transport, inbound, Arc::new(NoOrigin)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        hub.close();

        let result = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
        assert!(matches!(result, Err(TunnelError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_ingress_shutdown_releases_listener_task() {
        let hub = MemoryHub::new();
        let (transport, inbound) = hub.join(ConversationId(5));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let supervisor = Supervisor::new(config());
        let shutdown = supervisor.shutdown_handle();

        let running = tokio::spawn(supervisor.run_ingress(transport, inbound, listener));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
