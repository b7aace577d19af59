//! End-to-end tests for composite webhooks behind typed paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use admission_webhook_runtime::{
    AdmissionContext, HandlerError, MultiMutatingWebhook, MultiValidatingWebhook, MultiWebhook,
    MutatingWebhook, Scheme, ValidatingWebhook, WebhookRouter,
};
use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use k8s_openapi::api::core::v1::ConfigMap;

use crate::{ConfigMapBuilder, ReviewBuilder, admit, health};

fn label<'a>(obj: &'a ConfigMap, key: &str) -> Option<&'a str> {
    obj.metadata.labels.as_ref()?.get(key).map(String::as_str)
}

fn set_label(obj: &mut ConfigMap, key: &str, value: &str) {
    obj.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}

/// Requires a label and stamps it when missing
struct Stamp {
    key: &'static str,
    value: &'static str,
    validations: Arc<AtomicUsize>,
}

impl Stamp {
    fn new(key: &'static str, value: &'static str) -> Self {
        Self {
            key,
            value,
            validations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ValidatingWebhook<ConfigMap> for Stamp {
    async fn validate_create(
        &self,
        _ctx: &AdmissionContext,
        obj: &ConfigMap,
    ) -> Result<(), HandlerError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        match label(obj, self.key) {
            Some(value) if value != self.value => Err(HandlerError::denied(format!(
                "label {} must be {}",
                self.key, self.value
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MutatingWebhook<ConfigMap> for Stamp {
    async fn mutate_create(
        &self,
        _ctx: &AdmissionContext,
        obj: &mut ConfigMap,
    ) -> Result<(), HandlerError> {
        if label(obj, self.key).is_none() {
            set_label(obj, self.key, self.value);
        }
        Ok(())
    }
}

/// Toggles a label on every call and never settles
struct Flip(&'static str);

#[async_trait]
impl MutatingWebhook<ConfigMap> for Flip {
    async fn mutate_create(
        &self,
        _ctx: &AdmissionContext,
        obj: &mut ConfigMap,
    ) -> Result<(), HandlerError> {
        let next = if label(obj, self.0) == Some("a") { "b" } else { "a" };
        set_label(obj, self.0, next);
        Ok(())
    }
}

fn scheme() -> Arc<Scheme> {
    let mut scheme = Scheme::new();
    scheme.add::<ConfigMap>();
    Arc::new(scheme)
}

fn app_with_mutator(mutator: MultiMutatingWebhook<ConfigMap>) -> Router {
    let mut router = WebhookRouter::new(scheme());
    router.register_mutating::<ConfigMap, _>(mutator).unwrap();
    router.into_router(health())
}

fn create(uid: &str, builder: ConfigMapBuilder) -> ReviewBuilder {
    ReviewBuilder::new(uid, "CREATE").object(builder.to_json())
}

#[tokio::test]
async fn test_validation_chain_stops_at_first_denial() {
    let first = Stamp::new("tier", "gold");
    let second = Stamp::new("owner", "ops");
    let second_calls = second.validations.clone();

    let mut router = WebhookRouter::new(scheme());
    router
        .register_validating::<ConfigMap, _>(
            MultiValidatingWebhook::new().with(first).with(second),
        )
        .unwrap();
    let app = router.into_router(health());

    let reply = admit(
        &app,
        "/core/v1/configmap/validate",
        create("uid-chain", ConfigMapBuilder::new("cm").label("tier", "silver")),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    let response = reply.response();
    assert!(!response.allowed);
    assert_eq!(response.result.message, "label tier must be gold");
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_composite_mutation_converges_into_one_patch() {
    let app = app_with_mutator(
        MultiMutatingWebhook::new()
            .with(Stamp::new("tier", "gold"))
            .with(Stamp::new("owner", "ops")),
    );
    let original = ConfigMapBuilder::new("cm").to_json();
    let reply = admit(
        &app,
        "/core/v1/configmap/mutate",
        ReviewBuilder::new("uid-converge", "CREATE").object(original.clone()),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.response().allowed);

    let mut patched = original;
    json_patch::patch(&mut patched, &reply.patch()).unwrap();
    assert_eq!(patched["metadata"]["labels"]["tier"], "gold");
    assert_eq!(patched["metadata"]["labels"]["owner"], "ops");
}

#[tokio::test]
async fn test_non_converging_mutation_is_denied() {
    let app = app_with_mutator(MultiMutatingWebhook::new().with(Flip("x")).with(Flip("y")));
    let reply = admit(
        &app,
        "/core/v1/configmap/mutate",
        create("uid-loop", ConfigMapBuilder::new("cm")),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    let response = reply.response();
    assert_eq!(response.uid, "uid-loop");
    assert!(!response.allowed);
    assert!(response.patch.is_none());
    let status = response.result;
    assert_eq!(status.code, 403);
    assert!(status.message.contains("endless mutation loop"));
    assert!(status.message.contains("200"));
}

#[tokio::test]
async fn test_joint_composite_serves_both_paths() {
    let mut router = WebhookRouter::new(scheme());
    router
        .register_webhook::<ConfigMap, _>(
            MultiWebhook::new()
                .with(Stamp::new("tier", "gold"))
                .with(Stamp::new("owner", "ops")),
        )
        .unwrap();
    let app = router.into_router(health());

    let reply = admit(
        &app,
        "/core/v1/configmap/mutate",
        create("uid-joint-m", ConfigMapBuilder::new("cm")),
    )
    .await;
    assert!(reply.response().patch.is_some());

    let reply = admit(
        &app,
        "/core/v1/configmap/validate",
        create("uid-joint-v", ConfigMapBuilder::new("cm").label("owner", "dev")),
    )
    .await;
    let response = reply.response();
    assert!(!response.allowed);
    assert_eq!(response.result.message, "label owner must be ops");
}
