//! Type registry and object decoding.
//!
//! The [`Scheme`] is built once at startup and shared read-only afterwards.
//! It resolves a Rust type to its resource identities and backs the
//! [`Decoder`] that turns untyped object payloads into typed values.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use kube::core::{DynamicObject, GroupVersionKind};
use kube::Resource;

use super::webhook::Object;
use crate::error::{Error, Result};

/// Resource identities a type is registered under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeKinds {
    pub type_name: &'static str,
    pub kinds: Vec<GroupVersionKind>,
    pub unversioned: bool,
}

/// Registry of object types known to the webhook runtime
#[derive(Debug, Default)]
pub struct Scheme {
    types: HashMap<TypeId, TypeKinds>,
    known: HashMap<GroupVersionKind, TypeId>,
}

impl Scheme {
    /// Create an empty scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type under the identity it declares
    pub fn add<K>(&mut self) -> &mut Self
    where
        K: Resource<DynamicType = ()> + 'static,
    {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.add_kinds::<K>(vec![gvk], false)
    }

    /// Register a type under an explicit list of identities
    pub fn add_kinds<K: 'static>(
        &mut self,
        kinds: Vec<GroupVersionKind>,
        unversioned: bool,
    ) -> &mut Self {
        let id = TypeId::of::<K>();
        for gvk in &kinds {
            self.known.insert(gvk.clone(), id);
        }
        self.types
            .entry(id)
            .and_modify(|entry| {
                for gvk in &kinds {
                    if !entry.kinds.contains(gvk) {
                        entry.kinds.push(gvk.clone());
                    }
                }
                entry.unversioned |= unversioned;
            })
            .or_insert_with(|| TypeKinds {
                type_name: type_name::<K>(),
                kinds: kinds.clone(),
                unversioned,
            });
        self
    }

    /// Resolve the identities of `K`
    pub fn kinds_of<K: 'static>(&self) -> Result<&TypeKinds> {
        self.types
            .get(&TypeId::of::<K>())
            .ok_or_else(|| Error::UnregisteredType(type_name::<K>()))
    }

    /// Check whether an identity is known to this scheme
    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.known.contains_key(gvk)
    }

    fn type_of(&self, gvk: &GroupVersionKind) -> Option<TypeId> {
        self.known.get(gvk).copied()
    }
}

/// Resource identity declared by an object's `apiVersion` and `kind`
fn identity(obj: &DynamicObject) -> std::result::Result<GroupVersionKind, &'static str> {
    let types = obj
        .types
        .as_ref()
        .filter(|types| !types.kind.is_empty())
        .ok_or("Object 'Kind' is missing")?;
    if types.api_version.is_empty() {
        return Err("Object 'apiVersion' is missing");
    }
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Converts untyped object payloads into `K`.
///
/// A typed decoder checks the payload's identity against the scheme before
/// deserializing; an untyped decoder only requires identity to be present.
pub struct Decoder<K> {
    scheme: Option<Arc<Scheme>>,
    _marker: PhantomData<fn() -> K>,
}

impl<K: Object> Decoder<K> {
    /// Decoder for a concrete type registered in `scheme`
    pub fn typed(scheme: Arc<Scheme>) -> Self {
        Self {
            scheme: Some(scheme),
            _marker: PhantomData,
        }
    }

    /// Decoder accepting any kind
    pub fn untyped() -> Self {
        Self {
            scheme: None,
            _marker: PhantomData,
        }
    }

    /// Decode `obj`; `what` names the payload in error messages
    pub fn decode(&self, obj: &DynamicObject, what: &str) -> Result<K> {
        let wrap = |e: &dyn std::fmt::Display| {
            Error::ObjectDecode(format!("error decoding {what} from admission request: {e}"))
        };

        let gvk = identity(obj).map_err(|e| wrap(&e))?;

        if let Some(scheme) = &self.scheme {
            match scheme.type_of(&gvk) {
                None => {
                    return Err(wrap(&format!(
                        "no kind {:?} is registered for version {:?} in scheme",
                        gvk.kind,
                        gvk.api_version()
                    )));
                }
                Some(id) if id != TypeId::of::<K>() => {
                    return Err(Error::ObjectDecode(format!(
                        "error converting {what} from admission request to {}",
                        type_name::<K>()
                    )));
                }
                Some(_) => {}
            }
        }

        let value = serde_json::to_value(obj).map_err(|e| wrap(&e))?;
        serde_json::from_value(value).map_err(|e| wrap(&e))
    }

    /// Decode an optional payload
    pub fn decode_opt(&self, obj: Option<&DynamicObject>, what: &str) -> Result<Option<K>> {
        obj.map(|obj| self.decode(obj, what)).transpose()
    }
}
