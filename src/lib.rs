//! admission-webhook-runtime library crate
//!
//! Serves Kubernetes validating and mutating admission webhooks: typed
//! webhooks per resource kind, generic webhooks for any kind, and composites
//! that chain several webhooks into one logical step.

pub mod config;
pub mod error;
pub mod health;
pub mod webhooks;

pub use config::ServeOptions;
pub use error::{Error, Result};
pub use health::HealthState;
pub use webhooks::{
    AdmissionContext, DynamicObject, HandlerError, MultiMutatingWebhook, MultiValidatingWebhook,
    MultiWebhook, MutatingWebhook, Scheme, ServerState, ValidatingWebhook, Webhook, WebhookRouter,
    WebhookServer,
};
