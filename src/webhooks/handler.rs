//! Handler adapters.
//!
//! Bind a validating or mutating webhook for one object type to the dispatch
//! surface: decode the payloads, invoke the hook matching the operation and
//! build the admission response.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::patch::create_patch;
use super::review::{self, AdmissionResponse, DynamicRequest, Operation};
use super::scheme::Decoder;
use super::webhook::{AdmissionContext, HandlerError, MutatingWebhook, Object, ValidatingWebhook};
use crate::error::{Error, Result};

/// Dispatch surface shared by all registered handlers.
///
/// `Ok` always carries a well-formed decision (handler denials included);
/// `Err` means the request could not be processed and is answered with the
/// error's HTTP status.
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    async fn admit(&self, request: &DynamicRequest) -> Result<AdmissionResponse>;
}

fn require<K>(obj: Option<K>, what: &'static str) -> Result<K> {
    obj.ok_or(Error::MissingObject(what))
}

fn decision(
    request: &DynamicRequest,
    result: std::result::Result<(), HandlerError>,
) -> AdmissionResponse {
    match result {
        Ok(()) => AdmissionResponse::from(request),
        Err(e) => {
            debug!(uid = %request.uid, error = %e, "Webhook denied request");
            review::deny(AdmissionResponse::from(request), e.code(), &e.to_string())
        }
    }
}

/// Adapter for a validating webhook
pub struct ValidatingHandler<K> {
    webhook: Arc<dyn ValidatingWebhook<K>>,
    decoder: Decoder<K>,
}

impl<K: Object> ValidatingHandler<K> {
    pub fn new(webhook: Arc<dyn ValidatingWebhook<K>>, decoder: Decoder<K>) -> Self {
        Self { webhook, decoder }
    }
}

#[async_trait]
impl<K: Object> AdmissionHandler for ValidatingHandler<K> {
    async fn admit(&self, request: &DynamicRequest) -> Result<AdmissionResponse> {
        let obj = self.decoder.decode_opt(request.object.as_ref(), "object")?;
        let old_obj = self
            .decoder
            .decode_opt(request.old_object.as_ref(), "old object")?;
        let ctx = AdmissionContext::from(request);

        let result = match request.operation {
            Operation::Create => {
                let obj = require(obj, "object")?;
                debug!(uid = %request.uid, "Invoking validate_create");
                self.webhook.validate_create(&ctx, &obj).await
            }
            Operation::Update => {
                let obj = require(obj, "object")?;
                let old_obj = require(old_obj, "old object")?;
                debug!(uid = %request.uid, "Invoking validate_update");
                self.webhook.validate_update(&ctx, &old_obj, &obj).await
            }
            Operation::Delete => {
                let old_obj = require(old_obj, "old object")?;
                debug!(uid = %request.uid, "Invoking validate_delete");
                self.webhook.validate_delete(&ctx, &old_obj).await
            }
            Operation::Connect => Ok(()),
        };

        Ok(decision(request, result))
    }
}

/// Adapter for a mutating webhook
pub struct MutatingHandler<K> {
    webhook: Arc<dyn MutatingWebhook<K>>,
    decoder: Decoder<K>,
}

impl<K: Object> MutatingHandler<K> {
    pub fn new(webhook: Arc<dyn MutatingWebhook<K>>, decoder: Decoder<K>) -> Self {
        Self { webhook, decoder }
    }
}

#[async_trait]
impl<K: Object> AdmissionHandler for MutatingHandler<K> {
    async fn admit(&self, request: &DynamicRequest) -> Result<AdmissionResponse> {
        // Nothing to mutate on delete or connect
        if matches!(request.operation, Operation::Delete | Operation::Connect) {
            return Ok(AdmissionResponse::from(request));
        }

        let original = self
            .decoder
            .decode(require(request.object.as_ref(), "object")?, "object")?;
        let old_obj = self
            .decoder
            .decode_opt(request.old_object.as_ref(), "old object")?;
        let ctx = AdmissionContext::from(request);

        let mut obj = original.clone();
        let result = match request.operation {
            Operation::Update => {
                let old_obj = require(old_obj, "old object")?;
                debug!(uid = %request.uid, "Invoking mutate_update");
                self.webhook.mutate_update(&ctx, &old_obj, &mut obj).await
            }
            _ => {
                debug!(uid = %request.uid, "Invoking mutate_create");
                self.webhook.mutate_create(&ctx, &mut obj).await
            }
        };
        if result.is_err() {
            return Ok(decision(request, result));
        }

        if obj == original {
            return Ok(AdmissionResponse::from(request));
        }

        let patch = create_patch(&original, &obj)?;
        debug!(uid = %request.uid, operations = patch.0.len(), "Computed mutation patch");
        if patch.0.is_empty() {
            return Ok(AdmissionResponse::from(request));
        }
        AdmissionResponse::from(request)
            .with_patch(patch)
            .map_err(|e| Error::Patch(e.to_string()))
    }
}
