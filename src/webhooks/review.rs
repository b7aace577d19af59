//! Admission review envelope.
//!
//! Decodes the review the API server posts and encodes the review it expects
//! back. The envelope types are kube's; embedded objects arrive as
//! [`DynamicObject`] and are converted to a concrete type by the handler
//! adapter.

use axum::http::StatusCode;
use kube::core::admission::{META_API_VERSION_V1, META_API_VERSION_V1BETA1, META_KIND};
use kube::core::{DynamicObject, Status};

pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};

use crate::error::{Error, Result};

/// The only media type accepted on admission paths
pub const ADMISSION_CONTENT_TYPE: &str = "application/json";

/// Envelope kind for admission reviews
pub const ADMISSION_REVIEW_KIND: &str = META_KIND;

/// Supported envelope API versions
pub const ADMISSION_API_VERSIONS: [&str; 2] = [META_API_VERSION_V1, META_API_VERSION_V1BETA1];

/// Admission request whose objects are still untyped
pub type DynamicRequest = AdmissionRequest<DynamicObject>;

/// Wire name of an operation
pub fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Turn `response` into a denial carrying `code` and `message`.
///
/// The status reason is the canonical text of `code`.
pub fn deny(response: AdmissionResponse, code: StatusCode, message: &str) -> AdmissionResponse {
    let mut response = response.deny(message);
    response.result = Status::failure(message, code.canonical_reason().unwrap_or_default())
        .with_code(code.as_u16());
    response
}

/// Decode a request envelope.
///
/// The envelope type (apiVersion and kind) travels in `request.types` and is
/// echoed by responses built with `AdmissionResponse::from(&request)`.
pub fn decode_review(content_type: Option<&str>, body: &[u8]) -> Result<DynamicRequest> {
    let content_type = content_type.unwrap_or_default();
    if content_type != ADMISSION_CONTENT_TYPE {
        return Err(Error::UnsupportedMediaType(content_type.to_string()));
    }

    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(|e| Error::BadEnvelope(e.to_string()))?;

    if review.types.kind != ADMISSION_REVIEW_KIND {
        return Err(Error::BadEnvelope(format!(
            "unexpected kind {:?}; expected {}",
            review.types.kind, ADMISSION_REVIEW_KIND
        )));
    }
    if !ADMISSION_API_VERSIONS.contains(&review.types.api_version.as_str()) {
        return Err(Error::BadEnvelope(format!(
            "unsupported apiVersion {:?}",
            review.types.api_version
        )));
    }

    review
        .try_into()
        .map_err(|_| Error::BadEnvelope("review carries no request".to_string()))
}

/// Encode a response envelope, forcing the correlation identifier to `uid`
pub fn encode_review(uid: &str, mut response: AdmissionResponse) -> Result<Vec<u8>> {
    response.uid = uid.to_string();
    Ok(serde_json::to_vec(&response.into_review())?)
}
