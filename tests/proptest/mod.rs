// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for admission-webhook-runtime.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/fixtures.rs"]
mod fixtures;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use k8s_openapi::api::core::v1::ConfigMap;
use proptest::prelude::*;
use serde_json::{Value, json};

use admission_webhook_runtime::webhooks::{
    AdmissionHandler, AdmissionResponse, Decoder, MutatingHandler, create_patch, decode_review,
    deny, encode_review,
};
use admission_webhook_runtime::{DynamicObject, MutatingWebhook, Scheme};
use fixtures::{ConfigMapBuilder, ReviewBuilder};

/// Strategy for label and data keys.
fn key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,12}"
}

/// Strategy for small string maps.
fn string_map() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(key(), "[a-zA-Z0-9 ./~-]{0,16}", 0..6)
}

/// Strategy for correlation identifiers, including awkward characters.
fn any_uid() -> impl Strategy<Value = String> {
    prop_oneof![
        "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
        "\\PC{0,40}",
    ]
}

/// Strategy for arbitrary JSON, nulls included.
fn any_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(key(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Fields the API server sends that typed decoding drops or normalizes.
fn wire_extras() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(key().prop_map(|k| format!("x-{k}")), any_json(), 0..4)
}

fn config_map(labels: &BTreeMap<String, String>, data: &BTreeMap<String, String>) -> Value {
    let mut builder = ConfigMapBuilder::new("settings");
    for (k, v) in labels {
        builder = builder.label(k, v);
    }
    for (k, v) in data {
        builder = builder.data(k, v);
    }
    builder.to_json()
}

/// A config map as the API server would send it: null timestamp and
/// whatever extra fields the generator picked.
fn wire_config_map(
    labels: &BTreeMap<String, String>,
    data: &BTreeMap<String, String>,
    extras: &BTreeMap<String, Value>,
    null_labels: bool,
) -> Value {
    let mut object = config_map(labels, data);
    object["metadata"]["creationTimestamp"] = Value::Null;
    object["metadata"]["annotations"] = Value::Null;
    if null_labels && labels.is_empty() {
        object["metadata"]["labels"] = Value::Null;
    }
    for (k, v) in extras {
        object[k.as_str()] = v.clone();
        object["metadata"][k.as_str()] = v.clone();
    }
    object
}

fn any_operation() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("CREATE"), Just("UPDATE"), Just("DELETE"), Just("CONNECT")]
}

/// Mutator that never changes anything
struct Untouched;

#[async_trait]
impl MutatingWebhook<DynamicObject> for Untouched {}

#[async_trait]
impl MutatingWebhook<ConfigMap> for Untouched {}

/// Run one review through `handler` on a fresh runtime
fn admit_blocking(handler: &dyn AdmissionHandler, review: ReviewBuilder) -> AdmissionResponse {
    let request = decode_review(Some("application/json"), &review.body()).unwrap();
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(handler.admit(&request))
        .unwrap()
}

proptest! {
    /// Property: applying the generated patch to the original yields the mutated object.
    #[test]
    fn test_patch_round_trip(
        labels_before in string_map(),
        labels_after in string_map(),
        data_before in string_map(),
        data_after in string_map(),
    ) {
        let original = config_map(&labels_before, &data_before);
        let mutated = config_map(&labels_after, &data_after);

        let patch = create_patch(&original, &mutated).unwrap();

        let mut patched = original.clone();
        json_patch::patch(&mut patched, &patch).unwrap();
        prop_assert_eq!(patched, mutated);
    }

    /// Property: an unchanged object never produces patch operations.
    #[test]
    fn test_unchanged_object_has_empty_patch(labels in string_map(), data in string_map()) {
        let original: ConfigMap = serde_json::from_value(config_map(&labels, &data)).unwrap();
        let patch = create_patch(&original, &original.clone()).unwrap();
        prop_assert!(patch.0.is_empty());
    }

    /// Property: a mutator that changes nothing yields a bare allow, whatever
    /// nulls and unknown fields the payload carries.
    #[test]
    fn test_untouched_payload_never_gets_a_patch(
        labels in string_map(),
        data in string_map(),
        extras in wire_extras(),
        null_labels in any::<bool>(),
        update in any::<bool>(),
    ) {
        let object = wire_config_map(&labels, &data, &extras, null_labels);
        let operation = if update { "UPDATE" } else { "CREATE" };
        let review = || {
            let review = ReviewBuilder::new("uid-untouched", operation).object(object.clone());
            if update { review.old_object(object.clone()) } else { review }
        };

        let generic =
            MutatingHandler::<DynamicObject>::new(Arc::new(Untouched), Decoder::untyped());
        let response = admit_blocking(&generic, review());
        prop_assert!(response.allowed);
        prop_assert!(response.patch.is_none());

        let mut scheme = Scheme::new();
        scheme.add::<ConfigMap>();
        let typed = MutatingHandler::<ConfigMap>::new(
            Arc::new(Untouched),
            Decoder::typed(Arc::new(scheme)),
        );
        let response = admit_blocking(&typed, review());
        prop_assert!(response.allowed);
        prop_assert!(response.patch.is_none());
    }

    /// Property: the encoded response always carries the request's uid.
    #[test]
    fn test_uid_is_echoed(
        uid in any_uid(),
        stale_uid in any_uid(),
        operation in any_operation(),
        denied in any::<bool>(),
    ) {
        let body = ReviewBuilder::new(uid.clone(), operation).body();
        let request = decode_review(Some("application/json"), &body).unwrap();
        prop_assert_eq!(&request.uid, &uid);

        let mut response = AdmissionResponse::from(&request);
        if denied {
            response = deny(response, StatusCode::FORBIDDEN, "denied");
        }
        response.uid = stale_uid;

        let encoded = encode_review(&request.uid, response).unwrap();
        let encoded: Value = serde_json::from_slice(&encoded).unwrap();
        prop_assert_eq!(encoded["response"]["uid"].as_str(), Some(uid.as_str()));
        prop_assert_eq!(encoded["response"]["allowed"].as_bool(), Some(!denied));
    }

    /// Property: any content type other than exactly application/json is rejected with 415.
    #[test]
    fn test_foreign_content_type_is_rejected(content_type in "[a-z]{1,12}/[a-z+.-]{1,16}") {
        prop_assume!(content_type != "application/json");
        let body = ReviewBuilder::new("uid", "CREATE").body();
        let err = decode_review(Some(&content_type), &body).unwrap_err();
        prop_assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}

#[test]
fn test_wire_config_map_carries_nulls() {
    let object = wire_config_map(&BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new(), true);
    assert_eq!(object["metadata"]["creationTimestamp"], json!(null));
    assert!(object["metadata"]["labels"].is_null());
}
