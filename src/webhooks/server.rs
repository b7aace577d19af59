//! Admission webhook server.
//!
//! Owns the TLS listener and drives the lifecycle
//! `Idle -> Serving -> Draining -> Stopped`. On the shutdown signal the
//! listener stops accepting and in-flight requests get
//! [`SHUTDOWN_GRACE_PERIOD`] to finish before connections are closed.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::watch;
use tracing::{error, info};

use super::router::WebhookRouter;
use crate::config::ServeOptions;
use crate::error::{Error, Result};
use crate::health::HealthState;

/// Time in-flight requests get to finish once draining starts
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Lifecycle state of a [`WebhookServer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    /// Built, not yet listening
    Idle,
    /// Accepting admission requests
    Serving,
    /// No longer accepting; waiting for in-flight requests
    Draining,
    Stopped,
}

/// Serves a [`WebhookRouter`] over TLS until shut down
pub struct WebhookServer {
    options: ServeOptions,
    app: Router,
    health: Arc<HealthState>,
    state: watch::Sender<ServerState>,
}

impl WebhookServer {
    /// Freeze `router` into a server; no handler can be added afterwards
    pub fn new(options: ServeOptions, router: WebhookRouter) -> Self {
        let health = Arc::new(HealthState::new());
        let app = router.into_router(health.clone());
        let (state, _) = watch::channel(ServerState::Idle);
        Self {
            options,
            app,
            health,
            state,
        }
    }

    /// Health and metrics state shared with the HTTP endpoints
    pub fn health(&self) -> Arc<HealthState> {
        self.health.clone()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Serve until `shutdown` resolves, then drain.
    ///
    /// Invalid options or unreadable TLS material fail before anything is
    /// bound. A listener failure while serving is returned to the caller.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.options.validate()?;
        let addr = self.options.socket_addr()?;

        let tls = RustlsConfig::from_pem_file(&self.options.cert_file, &self.options.key_file)
            .await
            .map_err(|e| Error::TlsConfig(e.to_string()))?;

        let handle = Handle::new();
        let server = axum_server::bind_rustls(addr, tls)
            .handle(handle.clone())
            .serve(self.app.clone().into_make_service());

        self.drive(server, handle, shutdown).await
    }

    fn transition(&self, next: ServerState) {
        let previous = self.state.send_replace(next);
        info!(from = ?previous, to = ?next, "Webhook server state changed");
    }

    async fn stopped(&self, result: io::Result<()>) -> Result<()> {
        self.health.set_ready(false).await;
        self.transition(ServerState::Stopped);
        result.map_err(|e| {
            error!(error = %e, "Webhook server error");
            Error::Server(e.to_string())
        })
    }

    async fn drive<S, F>(&self, server: S, handle: Handle, shutdown: F) -> Result<()>
    where
        S: Future<Output = io::Result<()>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(server);
        tokio::pin!(shutdown);

        let listening = tokio::select! {
            addr = handle.listening() => addr,
            result = &mut server => {
                let result = result.and_then(|()| {
                    Err(io::Error::other("listener closed before serving"))
                });
                return self.stopped(result).await;
            }
        };
        let Some(addr) = listening else {
            let result = server.await;
            return self.stopped(result).await;
        };

        info!(addr = %addr, "Webhook server listening with TLS");
        self.transition(ServerState::Serving);
        self.health.set_ready(true).await;

        tokio::select! {
            result = &mut server => return self.stopped(result).await,
            _ = &mut shutdown => {}
        }

        info!(
            grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
            connections = handle.connection_count(),
            "Shutdown requested, draining in-flight requests"
        );
        self.health.set_ready(false).await;
        self.transition(ServerState::Draining);
        handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));

        let result = server.await;
        self.stopped(result).await
    }
}
