//! Client registry and the periodic session watchdog

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::context::AuthContext;
use super::service::{AuthService, ReconcileOutcome};

pub type SharedContext = Arc<Mutex<AuthContext>>;

/// Contexts of signed-in clients, keyed by client id
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, SharedContext>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<SharedContext> {
        self.clients.read().await.get(id).cloned()
    }

    /// Register (or re-register) a context
    pub async fn insert(&self, id: impl Into<String>, ctx: SharedContext) {
        self.clients.write().await.insert(id.into(), ctx);
    }

    pub async fn remove(&self, id: &str) -> Option<SharedContext> {
        self.clients.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<(String, SharedContext)> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, ctx)| (id.clone(), ctx.clone()))
            .collect()
    }
}

/// Tally of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub idle: usize,
    pub refreshed: usize,
    pub refresh_failed: usize,
    pub expired: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Idle => self.idle += 1,
            ReconcileOutcome::Refreshed => self.refreshed += 1,
            ReconcileOutcome::RefreshFailed => self.refresh_failed += 1,
            ReconcileOutcome::Expired => self.expired += 1,
        }
    }
}

/// Refreshes valid sessions and signs out invalid ones on a fixed interval.
/// Each context is reconciled under its own lock, so a concurrent manual
/// sign-out and a watchdog sign-out are serialized.
pub struct SessionWatchdog {
    service: Arc<AuthService>,
    registry: Arc<ClientRegistry>,
    interval: Duration,
}

impl SessionWatchdog {
    pub fn new(service: Arc<AuthService>, registry: Arc<ClientRegistry>, interval: Duration) -> Self {
        Self {
            service,
            registry,
            interval,
        }
    }

    /// Reconcile every registered context once, dropping the ones that end
    /// up signed out
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for (id, shared) in self.registry.snapshot().await {
            let mut ctx = shared.lock().await;
            let outcome = self.service.reconcile(&mut ctx).await;
            report.record(outcome);

            if !ctx.is_signed_in() {
                drop(ctx);
                self.registry.remove(&id).await;
                debug!("Dropped signed-out client {}", id);
            }
        }

        if report.expired > 0 || report.refresh_failed > 0 {
            info!(
                "Session sweep: {} refreshed, {} refresh failed, {} expired",
                report.refreshed, report.refresh_failed, report.expired
            );
        }
        report
    }

    /// Run until the shutdown signal fires. The first sweep happens one
    /// interval after start.
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Session watchdog running every {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Session watchdog stopped");
                        break;
                    }
                }
            }
        })
    }
}
