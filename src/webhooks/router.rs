//! Webhook registration and HTTP dispatch.
//!
//! Typed webhooks are served on `/<group>/<version>/<kind>/<validate|mutate>`
//! (empty group spelled `core`, all segments lowercased). Generic webhooks
//! are served on the fixed `/generic/validate` and `/generic/mutate` paths.
//!
//! [`WebhookRouter`] is consumed by [`WebhookRouter::into_router`], so no
//! registration can happen once requests are being served.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use kube::core::{DynamicObject, GroupVersionKind};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::handler::{AdmissionHandler, MutatingHandler, ValidatingHandler};
use super::review::{
    self, ADMISSION_CONTENT_TYPE, AdmissionResponse, DynamicRequest, decode_review, encode_review,
    operation_name,
};
use super::scheme::{Decoder, Scheme};
use super::webhook::{MutatingWebhook, Object, ValidatingWebhook, Webhook};
use crate::error::{Error, Result};
use crate::health::{self, AdmissionOutcome, HealthState};

/// Path of the generic validating webhook
pub const GENERIC_VALIDATE_PATH: &str = "/generic/validate";
/// Path of the generic mutating webhook
pub const GENERIC_MUTATE_PATH: &str = "/generic/mutate";

/// Largest accepted review body.
///
/// An UPDATE review carries both the new and the old object, each of which
/// the API server allows up to about 1.5 MiB.
pub const MAX_REVIEW_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Which admission phase a path serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookType {
    Validate,
    Mutate,
}

impl WebhookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookType::Validate => "validate",
            WebhookType::Mutate => "mutate",
        }
    }

    /// Fixed path of the generic webhook of this type
    pub fn generic_path(&self) -> &'static str {
        match self {
            WebhookType::Validate => GENERIC_VALIDATE_PATH,
            WebhookType::Mutate => GENERIC_MUTATE_PATH,
        }
    }
}

/// Path serving webhooks of `webhook_type` for the given resource identity
pub fn webhook_path(gvk: &GroupVersionKind, webhook_type: WebhookType) -> String {
    let group = if gvk.group.is_empty() {
        "core"
    } else {
        gvk.group.as_str()
    };
    format!(
        "/{}/{}/{}/{}",
        group.to_lowercase(),
        gvk.version.to_lowercase(),
        gvk.kind.to_lowercase(),
        webhook_type.as_str()
    )
}

/// Registry of admission handlers keyed by path
pub struct WebhookRouter {
    scheme: Arc<Scheme>,
    handlers: BTreeMap<String, Arc<dyn AdmissionHandler>>,
}

impl WebhookRouter {
    /// Create an empty router resolving typed webhooks through `scheme`
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            scheme,
            handlers: BTreeMap::new(),
        }
    }

    /// Registered paths in lexical order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Handler registered on `path`
    pub fn handler(&self, path: &str) -> Option<Arc<dyn AdmissionHandler>> {
        self.handlers.get(path).cloned()
    }

    /// Resolve the path for a typed webhook
    pub fn path_for<K: 'static>(&self, webhook_type: WebhookType) -> Result<String> {
        let kinds = self.scheme.kinds_of::<K>()?;
        if kinds.unversioned {
            return Err(Error::UnversionedType(kinds.type_name));
        }
        match kinds.kinds.as_slice() {
            [gvk] => Ok(webhook_path(gvk, webhook_type)),
            other => Err(Error::AmbiguousKinds {
                type_name: kinds.type_name,
                count: other.len(),
            }),
        }
    }

    fn ensure_free(&self, path: &str) -> Result<()> {
        if self.handlers.contains_key(path) {
            return Err(Error::DuplicatePath(path.to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, path: String, handler: Arc<dyn AdmissionHandler>) {
        info!(path = %path, "Registered webhook handler");
        self.handlers.insert(path, handler);
    }

    /// Register a validating webhook for the concrete type `K`
    pub fn register_validating<K, W>(&mut self, webhook: W) -> Result<&mut Self>
    where
        K: Object,
        W: ValidatingWebhook<K> + 'static,
    {
        let path = self.path_for::<K>(WebhookType::Validate)?;
        self.ensure_free(&path)?;
        let decoder = Decoder::<K>::typed(self.scheme.clone());
        self.insert(path, Arc::new(ValidatingHandler::new(Arc::new(webhook), decoder)));
        Ok(self)
    }

    /// Register a mutating webhook for the concrete type `K`
    pub fn register_mutating<K, W>(&mut self, webhook: W) -> Result<&mut Self>
    where
        K: Object,
        W: MutatingWebhook<K> + 'static,
    {
        let path = self.path_for::<K>(WebhookType::Mutate)?;
        self.ensure_free(&path)?;
        let decoder = Decoder::<K>::typed(self.scheme.clone());
        self.insert(path, Arc::new(MutatingHandler::new(Arc::new(webhook), decoder)));
        Ok(self)
    }

    /// Register a joint webhook on both paths of `K`; all or nothing
    pub fn register_webhook<K, W>(&mut self, webhook: W) -> Result<&mut Self>
    where
        K: Object,
        W: Webhook<K> + 'static,
    {
        let validate_path = self.path_for::<K>(WebhookType::Validate)?;
        let mutate_path = self.path_for::<K>(WebhookType::Mutate)?;
        self.ensure_free(&validate_path)?;
        self.ensure_free(&mutate_path)?;

        let webhook = Arc::new(webhook);
        let validating =
            ValidatingHandler::new(webhook.clone(), Decoder::<K>::typed(self.scheme.clone()));
        let mutating = MutatingHandler::new(webhook, Decoder::<K>::typed(self.scheme.clone()));
        self.insert(validate_path, Arc::new(validating));
        self.insert(mutate_path, Arc::new(mutating));
        Ok(self)
    }

    /// Register the generic validating webhook (at most one)
    pub fn register_generic_validating<W>(&mut self, webhook: W) -> Result<&mut Self>
    where
        W: ValidatingWebhook<DynamicObject> + 'static,
    {
        self.ensure_free(GENERIC_VALIDATE_PATH)?;
        let handler = ValidatingHandler::new(Arc::new(webhook), Decoder::untyped());
        self.insert(GENERIC_VALIDATE_PATH.to_string(), Arc::new(handler));
        Ok(self)
    }

    /// Register the generic mutating webhook (at most one)
    pub fn register_generic_mutating<W>(&mut self, webhook: W) -> Result<&mut Self>
    where
        W: MutatingWebhook<DynamicObject> + 'static,
    {
        self.ensure_free(GENERIC_MUTATE_PATH)?;
        let handler = MutatingHandler::new(Arc::new(webhook), Decoder::untyped());
        self.insert(GENERIC_MUTATE_PATH.to_string(), Arc::new(handler));
        Ok(self)
    }

    /// Register a joint generic webhook on both generic paths; all or nothing
    pub fn register_generic_webhook<W>(&mut self, webhook: W) -> Result<&mut Self>
    where
        W: Webhook<DynamicObject> + 'static,
    {
        self.ensure_free(GENERIC_VALIDATE_PATH)?;
        self.ensure_free(GENERIC_MUTATE_PATH)?;

        let webhook = Arc::new(webhook);
        let validating = ValidatingHandler::new(webhook.clone(), Decoder::untyped());
        let mutating = MutatingHandler::new(webhook, Decoder::untyped());
        self.insert(GENERIC_VALIDATE_PATH.to_string(), Arc::new(validating));
        self.insert(GENERIC_MUTATE_PATH.to_string(), Arc::new(mutating));
        Ok(self)
    }

    /// Build the HTTP router: one POST route per handler plus health endpoints
    pub fn into_router(self, health: Arc<HealthState>) -> Router {
        let mut router = health::create_router(health.clone());
        for (path, handler) in self.handlers {
            let endpoint = Arc::new(Endpoint {
                path: path.clone(),
                handler,
                health: health.clone(),
            });
            router = router.route(&path, post(admit).with_state(endpoint));
        }
        router.layer(DefaultBodyLimit::max(MAX_REVIEW_BODY_BYTES))
    }
}

/// One registered admission path
struct Endpoint {
    path: String,
    handler: Arc<dyn AdmissionHandler>,
    health: Arc<HealthState>,
}

impl Endpoint {
    fn record(&self, operation: &str, outcome: AdmissionOutcome, started: Instant) {
        self.health.metrics.record_admission(
            &self.path,
            operation,
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }

    async fn dispatch(&self, request: DynamicRequest, started: Instant) -> Response {
        let operation = operation_name(&request.operation);

        let (status, response) = match self.handler.admit(&request).await {
            Ok(response) => (StatusCode::OK, response),
            Err(e) => {
                let code = e.status_code();
                error!(code = code.as_u16(), error = %e, "Error handling admission request");
                let response = AdmissionResponse::from(&request);
                (code, review::deny(response, code, &e.to_string()))
            }
        };

        let outcome = if status != StatusCode::OK {
            AdmissionOutcome::Error
        } else if response.allowed {
            info!("Admission request allowed");
            AdmissionOutcome::Allowed
        } else {
            warn!(message = %response.result.message, "Admission request denied");
            AdmissionOutcome::Denied
        };

        match encode_review(&request.uid, response) {
            Ok(body) => {
                self.record(operation, outcome, started);
                (status, [(CONTENT_TYPE, ADMISSION_CONTENT_TYPE)], body).into_response()
            }
            Err(e) => {
                error!(error = %e, "Error handling admission request");
                self.record(operation, AdmissionOutcome::Error, started);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

/// POST handler shared by all admission paths
async fn admit(
    State(endpoint): State<Arc<Endpoint>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let request = match decode_review(content_type, &body) {
        Ok(request) => request,
        Err(e) => {
            let code = e.status_code();
            error!(
                path = %endpoint.path,
                code = code.as_u16(),
                error = %e,
                "Error handling admission request"
            );
            endpoint.record("UNKNOWN", AdmissionOutcome::Error, started);
            return (code, e.to_string()).into_response();
        }
    };

    let span = info_span!(
        "admission",
        path = %endpoint.path,
        uid = %request.uid,
        operation = operation_name(&request.operation),
        namespace = ?request.namespace,
        name = %request.name,
    );
    debug!(parent: &span, "Processing admission request");
    endpoint.dispatch(request, started).instrument(span).await
}
