//! admission-webhook-runtime - demo admission webhook server.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Registers a generic validating webhook and a Pod mutating webhook
//! - Serves them over TLS until SIGTERM or SIGINT

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use tokio::signal;
use tracing::info;

use admission_webhook_runtime::{
    AdmissionContext, DynamicObject, HandlerError, MultiMutatingWebhook, MutatingWebhook, Scheme,
    ServeOptions, ValidatingWebhook, WebhookRouter, WebhookServer,
};

/// Objects carrying this label set to "true" are rejected
const DENY_LABEL: &str = "admission.example.com/deny";
/// Label added to every Pod that lacks it
const MANAGED_LABEL: &str = "admission.example.com/managed";
/// Team label defaulted from the namespace
const TEAM_LABEL: &str = "admission.example.com/team";

/// Rejects any object labelled for denial
struct DenyLabel;

impl DenyLabel {
    fn check(obj: &DynamicObject) -> Result<(), HandlerError> {
        let denied = obj
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(DENY_LABEL))
            .is_some_and(|value| value == "true");
        if denied {
            return Err(HandlerError::denied(format!(
                "objects labelled {DENY_LABEL}=true are not admitted"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ValidatingWebhook<DynamicObject> for DenyLabel {
    async fn validate_create(
        &self,
        _ctx: &AdmissionContext,
        obj: &DynamicObject,
    ) -> Result<(), HandlerError> {
        Self::check(obj)
    }

    async fn validate_update(
        &self,
        _ctx: &AdmissionContext,
        _old_obj: &DynamicObject,
        new_obj: &DynamicObject,
    ) -> Result<(), HandlerError> {
        Self::check(new_obj)
    }
}

/// Sets a label on Pods that do not carry it yet
struct DefaultLabel {
    key: &'static str,
    value: fn(&AdmissionContext) -> String,
}

impl DefaultLabel {
    fn apply(&self, ctx: &AdmissionContext, pod: &mut Pod) {
        pod.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .entry(self.key.to_string())
            .or_insert_with(|| (self.value)(ctx));
    }
}

#[async_trait]
impl MutatingWebhook<Pod> for DefaultLabel {
    async fn mutate_create(
        &self,
        ctx: &AdmissionContext,
        obj: &mut Pod,
    ) -> Result<(), HandlerError> {
        self.apply(ctx, obj);
        Ok(())
    }

    async fn mutate_update(
        &self,
        ctx: &AdmissionContext,
        _old_obj: &Pod,
        new_obj: &mut Pod,
    ) -> Result<(), HandlerError> {
        self.apply(ctx, new_obj);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("admission_webhook_runtime=info".parse()?),
        )
        .json()
        .init();

    info!("Starting admission-webhook-runtime");

    let options = ServeOptions::from_env();
    info!(
        bind_address = %options.bind_address,
        cert_file = %options.cert_file.display(),
        key_file = %options.key_file.display(),
        "Loaded server options"
    );

    let mut scheme = Scheme::new();
    scheme.add::<Pod>();

    let pod_defaults = MultiMutatingWebhook::new()
        .with(DefaultLabel {
            key: MANAGED_LABEL,
            value: |_| "true".to_string(),
        })
        .with(DefaultLabel {
            key: TEAM_LABEL,
            value: |ctx| ctx.namespace.clone().unwrap_or_else(|| "default".to_string()),
        });

    let mut router = WebhookRouter::new(Arc::new(scheme));
    router
        .register_generic_validating(DenyLabel)?
        .register_mutating::<Pod, _>(pod_defaults)?;

    let server = WebhookServer::new(options, router);
    server.serve(shutdown_signal()).await?;

    info!("Webhook server stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the server cannot shut down
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal, draining");
}
