//! Webhook traits implemented by business handlers.
//!
//! A handler is bound to one object type `K`: either a concrete resource type
//! known to the [`Scheme`](super::Scheme) or [`DynamicObject`] for generic
//! handlers that accept any kind.

use async_trait::async_trait;
use axum::http::StatusCode;
use kube::core::GroupVersionKind;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::review::{DynamicRequest, Operation};

/// Generic (type-erased) object representation
pub use kube::core::DynamicObject;

/// Bound for object types webhooks operate on
pub trait Object:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Object for T where
    T: Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Request metadata passed to every handler invocation
#[derive(Clone, Debug)]
pub struct AdmissionContext {
    pub uid: String,
    pub operation: Operation,
    /// Resource identity as reported by the API server
    pub kind: GroupVersionKind,
    pub namespace: Option<String>,
    /// Empty on CREATE when the name is generated server side
    pub name: Option<String>,
    /// Requesting user, when the API server reports one
    pub username: Option<String>,
    pub dry_run: bool,
}

impl From<&DynamicRequest> for AdmissionContext {
    fn from(request: &DynamicRequest) -> Self {
        Self {
            uid: request.uid.clone(),
            operation: request.operation.clone(),
            kind: request.kind.clone(),
            namespace: request.namespace.clone(),
            name: Some(request.name.clone()).filter(|name| !name.is_empty()),
            username: request.user_info.username.clone(),
            dry_run: request.dry_run,
        }
    }
}

/// Error returned by a webhook implementation.
///
/// Always surfaces as a denial (`allowed: false`) in the response body.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler declined the change
    #[error("{message}")]
    Denied { code: StatusCode, message: String },

    /// Composite mutation did not stabilize within its pass budget
    #[error("potential endless mutation loop detected (no convergence after {passes} passes)")]
    Convergence { passes: usize },
}

impl HandlerError {
    /// Denial with status 403 Forbidden
    pub fn denied(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::FORBIDDEN, message)
    }

    /// Denial with a caller-chosen status code
    pub fn with_code(code: StatusCode, message: impl Into<String>) -> Self {
        HandlerError::Denied {
            code,
            message: message.into(),
        }
    }

    /// Status code carried in the denial body
    pub fn code(&self) -> StatusCode {
        match self {
            HandlerError::Denied { code, .. } => *code,
            HandlerError::Convergence { .. } => StatusCode::FORBIDDEN,
        }
    }
}

/// Validating webhook: decides allow or deny without touching the object.
///
/// Every method allows by default.
#[async_trait]
pub trait ValidatingWebhook<K: Object>: Send + Sync {
    async fn validate_create(
        &self,
        _ctx: &AdmissionContext,
        _obj: &K,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn validate_update(
        &self,
        _ctx: &AdmissionContext,
        _old_obj: &K,
        _new_obj: &K,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn validate_delete(
        &self,
        _ctx: &AdmissionContext,
        _obj: &K,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Mutating webhook: may modify the object in place.
///
/// There is no delete hook; mutating an object about to be deleted has no effect.
#[async_trait]
pub trait MutatingWebhook<K: Object>: Send + Sync {
    async fn mutate_create(
        &self,
        _ctx: &AdmissionContext,
        _obj: &mut K,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn mutate_update(
        &self,
        _ctx: &AdmissionContext,
        _old_obj: &K,
        _new_obj: &mut K,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Joint validating and mutating webhook
pub trait Webhook<K: Object>: ValidatingWebhook<K> + MutatingWebhook<K> {}

impl<K: Object, W: ValidatingWebhook<K> + MutatingWebhook<K>> Webhook<K> for W {}
