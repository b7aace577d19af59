//! Admission webhook dispatch and composition.
//!
//! - [`review`]: admission review envelope decoding and encoding over kube's
//!   admission types
//! - [`scheme`]: type registry and object decoder
//! - [`webhook`]: validating and mutating webhook traits
//! - [`handler`]: adapters binding webhooks to the dispatch surface
//! - [`multi`]: composite webhooks (fail-fast validation, converging mutation)
//! - [`router`]: path registration and HTTP dispatch
//! - [`server`]: TLS listener lifecycle

pub mod handler;
pub mod multi;
pub mod patch;
pub mod review;
pub mod router;
pub mod scheme;
pub mod server;
pub mod webhook;

pub use handler::{AdmissionHandler, MutatingHandler, ValidatingHandler};
pub use multi::{
    MAX_PASSES_PER_WEBHOOK, MultiMutatingWebhook, MultiValidatingWebhook, MultiWebhook,
};
pub use patch::create_patch;
pub use review::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, DynamicRequest, Operation, decode_review,
    deny, encode_review, operation_name,
};
pub use router::{
    GENERIC_MUTATE_PATH, GENERIC_VALIDATE_PATH, MAX_REVIEW_BODY_BYTES, WebhookRouter, WebhookType,
    webhook_path,
};
pub use scheme::{Decoder, Scheme, TypeKinds};
pub use server::{SHUTDOWN_GRACE_PERIOD, ServerState, WebhookServer};
pub use webhook::{
    AdmissionContext, DynamicObject, HandlerError, MutatingWebhook, Object, ValidatingWebhook,
    Webhook,
};
