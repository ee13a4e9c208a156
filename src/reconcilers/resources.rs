// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Create-or-patch policy for the fixed set of sub-resource kinds.
//!
//! Every sub-resource is carried as a [`SubResource`] variant. The variant
//! decides how drift is repaired:
//!
//! - **Pod** (seed master): created if absent, never patched
//! - **Service**: when any desired field differs, the whole desired object is sent
//! - **Everything else**: only the differing fields are sent
//!
//! # Diff Semantics
//!
//! The live object carries server-populated fields (status, defaults,
//! `resourceVersion`) that the desired object never sets. Comparison is
//! therefore one-sided: an object matches when every field the desired object
//! sets has the same value in the live one. Maps are compared key by key,
//! lists element by element with equal length, scalars by equality. A differing
//! list is replaced whole.

use crate::context::Context;
use crate::errors::ApiError;
use crate::metrics::record_resource_write;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info};

/// The sub-resource kinds managed for every cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubResourceKind {
    Pod,
    Deployment,
    StatefulSet,
    Service,
    Endpoints,
    ConfigMap,
}

/// How a live object is brought back to its desired shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Leave existing objects untouched.
    CreateOnly,
    /// Send the full desired object whenever it differs.
    ReplaceOnChange,
    /// Send only the differing fields.
    FieldDiff,
}

impl SubResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::Service => "Service",
            Self::Endpoints => "Endpoints",
            Self::ConfigMap => "ConfigMap",
        }
    }

    #[must_use]
    pub fn patch_strategy(self) -> PatchStrategy {
        match self {
            Self::Pod => PatchStrategy::CreateOnly,
            Self::Service => PatchStrategy::ReplaceOnChange,
            Self::Deployment | Self::StatefulSet | Self::Endpoints | Self::ConfigMap => {
                PatchStrategy::FieldDiff
            }
        }
    }
}

impl fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed sub-resource object, desired or observed.
#[derive(Clone, Debug)]
pub enum SubResource {
    Pod(Pod),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    Service(Service),
    Endpoints(Endpoints),
    ConfigMap(ConfigMap),
}

impl SubResource {
    #[must_use]
    pub fn kind(&self) -> SubResourceKind {
        match self {
            Self::Pod(_) => SubResourceKind::Pod,
            Self::Deployment(_) => SubResourceKind::Deployment,
            Self::StatefulSet(_) => SubResourceKind::StatefulSet,
            Self::Service(_) => SubResourceKind::Service,
            Self::Endpoints(_) => SubResourceKind::Endpoints,
            Self::ConfigMap(_) => SubResourceKind::ConfigMap,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Pod(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::StatefulSet(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::Endpoints(o) => &o.metadata,
            Self::ConfigMap(o) => &o.metadata,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    /// Serialize the wrapped object to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Serialization`] if the object cannot be serialized.
    pub fn to_value(&self) -> Result<Value, ApiError> {
        let result = match self {
            Self::Pod(o) => serde_json::to_value(o),
            Self::Deployment(o) => serde_json::to_value(o),
            Self::StatefulSet(o) => serde_json::to_value(o),
            Self::Service(o) => serde_json::to_value(o),
            Self::Endpoints(o) => serde_json::to_value(o),
            Self::ConfigMap(o) => serde_json::to_value(o),
        };
        result.map_err(|source| ApiError::Serialization {
            kind: self.kind().to_string(),
            source,
        })
    }
}

/// Outcome of applying one desired object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Patched,
    Unchanged,
}

/// True when every field set in `desired` has the same value in `actual`.
#[must_use]
pub fn is_subset(desired: &Value, actual: &Value) -> bool {
    match (desired, actual) {
        (Value::Object(d), Value::Object(a)) => d
            .iter()
            .all(|(k, dv)| a.get(k).is_some_and(|av| is_subset(dv, av))),
        (Value::Array(d), Value::Array(a)) => {
            d.len() == a.len() && d.iter().zip(a).all(|(dv, av)| is_subset(dv, av))
        }
        _ => desired == actual,
    }
}

/// Merge patch holding only the fields of `desired` that `actual` does not match.
///
/// Returns `None` when nothing differs.
#[must_use]
pub fn diff_patch(actual: &Value, desired: &Value) -> Option<Value> {
    match (desired, actual) {
        (Value::Object(d), Value::Object(a)) => {
            let mut patch = Map::new();
            for (key, dv) in d {
                let child = match a.get(key) {
                    Some(av) => diff_patch(av, dv),
                    None => Some(dv.clone()),
                };
                if let Some(child) = child {
                    patch.insert(key.clone(), child);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        _ if is_subset(desired, actual) => None,
        _ => Some(desired.clone()),
    }
}

/// Compute the patch that brings `actual` to `desired` under `strategy`.
///
/// Deeply equal objects never produce a patch.
#[must_use]
pub fn compute_patch(strategy: PatchStrategy, actual: &Value, desired: &Value) -> Option<Value> {
    if actual == desired {
        return None;
    }

    match strategy {
        PatchStrategy::CreateOnly => None,
        PatchStrategy::ReplaceOnChange => {
            (!is_subset(desired, actual)).then(|| desired.clone())
        }
        PatchStrategy::FieldDiff => diff_patch(actual, desired),
    }
}

/// Converge one sub-resource: create it when absent, patch it when it drifted.
///
/// The live object is looked up in the reflector cache by its derived name.
/// A create that races with another writer counts as success, and a patch
/// whose target vanished falls back to a create.
///
/// # Errors
///
/// Returns any other API or serialization error.
pub async fn apply_desired(
    ctx: &Context,
    namespace: &str,
    desired: SubResource,
) -> Result<ApplyOutcome, ApiError> {
    let kind = desired.kind();
    let name = desired.name();

    let Some(actual) = ctx.stores.get_sub_resource(kind, &name, namespace) else {
        return create_tolerating_race(ctx, namespace, &desired).await;
    };

    let patch = compute_patch(
        kind.patch_strategy(),
        &actual.to_value()?,
        &desired.to_value()?,
    );

    let Some(patch) = patch else {
        debug!(namespace = %namespace, name = %name, kind = %kind, "Resource up to date");
        return Ok(ApplyOutcome::Unchanged);
    };

    match ctx.api.patch(namespace, kind, &name, &patch).await {
        Ok(()) => {
            record_resource_write(kind.as_str(), "patched");
            info!(namespace = %namespace, name = %name, kind = %kind, "Patched drifted resource");
            Ok(ApplyOutcome::Patched)
        }
        Err(e) if e.is_not_found() => create_tolerating_race(ctx, namespace, &desired).await,
        Err(e) => Err(e),
    }
}

async fn create_tolerating_race(
    ctx: &Context,
    namespace: &str,
    desired: &SubResource,
) -> Result<ApplyOutcome, ApiError> {
    let kind = desired.kind();
    let name = desired.name();

    match ctx.api.create(namespace, desired).await {
        Ok(()) => {
            record_resource_write(kind.as_str(), "created");
            info!(namespace = %namespace, name = %name, kind = %kind, "Created resource");
            Ok(ApplyOutcome::Created)
        }
        Err(e) if e.is_already_exists() => {
            debug!(namespace = %namespace, name = %name, kind = %kind, "Resource already exists");
            Ok(ApplyOutcome::Unchanged)
        }
        Err(e) => Err(e),
    }
}

/// Delete a sub-resource by name, treating "not found" as success.
///
/// # Errors
///
/// Returns any API error other than not-found.
pub async fn delete_ignore_not_found(
    ctx: &Context,
    namespace: &str,
    kind: SubResourceKind,
    name: &str,
) -> Result<(), ApiError> {
    match ctx.api.delete(namespace, kind, name).await {
        Ok(()) => {
            record_resource_write(kind.as_str(), "deleted");
            info!(namespace = %namespace, name = %name, kind = %kind, "Deleted resource");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(namespace = %namespace, name = %name, kind = %kind, "Resource already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
