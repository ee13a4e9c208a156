// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Write path to the cluster API.
//!
//! Reads go through the reflector caches in [`crate::context::Stores`]; every
//! mutation goes through [`ClusterApi`]. Keeping writes behind a trait lets the
//! reconciler run against an in-memory fake in tests.

use crate::constants::{API_GROUP_VERSION, FIELD_MANAGER, KIND_REDIS_CLUSTER};
use crate::crd::RedisCluster;
use crate::errors::ApiError;
use crate::reconcilers::resources::{SubResource, SubResourceKind};
use crate::reconcilers::retry::retry_api_call;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

/// Mutating operations the reconciler needs from the cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a sub-resource verbatim.
    async fn create(&self, namespace: &str, resource: &SubResource) -> Result<(), ApiError>;

    /// Apply a strategic merge patch to a named sub-resource.
    async fn patch(
        &self,
        namespace: &str,
        kind: SubResourceKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ApiError>;

    /// Delete a named sub-resource, cascading to its dependents in the background.
    async fn delete(&self, namespace: &str, kind: SubResourceKind, name: &str)
        -> Result<(), ApiError>;

    /// Write `cluster.status` back and return the server's copy of the object.
    ///
    /// The write is conditional on `metadata.resourceVersion`, so a stale copy
    /// fails with [`ApiError::Conflict`].
    async fn update_status(&self, cluster: &RedisCluster) -> Result<RedisCluster, ApiError>;
}

/// [`ClusterApi`] backed by a live `kube::Client`.
#[derive(Clone)]
pub struct KubeApi {
    client: Client,
}

impl KubeApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn create_typed<K>(&self, namespace: &str, object: &K) -> Result<(), ApiError>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let kind = K::kind(&());
        let name = object.name_any();
        let operation = format!("create {kind} {namespace}/{name}");
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        retry_api_call(|| api.create(&params, object), &operation)
            .await
            .map(|_| debug!(namespace = %namespace, name = %name, kind = %kind, "Created resource"))
            .map_err(|e| ApiError::from_kube(e, &kind, &name, &operation))
    }

    async fn patch_typed<K>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ApiError>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let kind = K::kind(&());
        let operation = format!("patch {kind} {namespace}/{name}");
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::default();
        let body = Patch::Strategic(patch);

        retry_api_call(|| api.patch(name, &params, &body), &operation)
            .await
            .map(|_| debug!(namespace = %namespace, name = %name, kind = %kind, "Patched resource"))
            .map_err(|e| ApiError::from_kube(e, &kind, name, &operation))
    }

    async fn delete_typed<K>(&self, namespace: &str, name: &str) -> Result<(), ApiError>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let kind = K::kind(&());
        let operation = format!("delete {kind} {namespace}/{name}");
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams::background();

        retry_api_call(|| api.delete(name, &params), &operation)
            .await
            .map(|_| debug!(namespace = %namespace, name = %name, kind = %kind, "Deleted resource"))
            .map_err(|e| ApiError::from_kube(e, &kind, name, &operation))
    }
}

#[async_trait]
impl ClusterApi for KubeApi {
    async fn create(&self, namespace: &str, resource: &SubResource) -> Result<(), ApiError> {
        match resource {
            SubResource::Pod(o) => self.create_typed(namespace, o).await,
            SubResource::Deployment(o) => self.create_typed(namespace, o).await,
            SubResource::StatefulSet(o) => self.create_typed(namespace, o).await,
            SubResource::Service(o) => self.create_typed(namespace, o).await,
            SubResource::Endpoints(o) => self.create_typed(namespace, o).await,
            SubResource::ConfigMap(o) => self.create_typed(namespace, o).await,
        }
    }

    async fn patch(
        &self,
        namespace: &str,
        kind: SubResourceKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ApiError> {
        match kind {
            SubResourceKind::Pod => self.patch_typed::<Pod>(namespace, name, patch).await,
            SubResourceKind::Deployment => {
                self.patch_typed::<Deployment>(namespace, name, patch).await
            }
            SubResourceKind::StatefulSet => {
                self.patch_typed::<StatefulSet>(namespace, name, patch).await
            }
            SubResourceKind::Service => self.patch_typed::<Service>(namespace, name, patch).await,
            SubResourceKind::Endpoints => {
                self.patch_typed::<Endpoints>(namespace, name, patch).await
            }
            SubResourceKind::ConfigMap => {
                self.patch_typed::<ConfigMap>(namespace, name, patch).await
            }
        }
    }

    async fn delete(
        &self,
        namespace: &str,
        kind: SubResourceKind,
        name: &str,
    ) -> Result<(), ApiError> {
        match kind {
            SubResourceKind::Pod => self.delete_typed::<Pod>(namespace, name).await,
            SubResourceKind::Deployment => self.delete_typed::<Deployment>(namespace, name).await,
            SubResourceKind::StatefulSet => {
                self.delete_typed::<StatefulSet>(namespace, name).await
            }
            SubResourceKind::Service => self.delete_typed::<Service>(namespace, name).await,
            SubResourceKind::Endpoints => self.delete_typed::<Endpoints>(namespace, name).await,
            SubResourceKind::ConfigMap => self.delete_typed::<ConfigMap>(namespace, name).await,
        }
    }

    async fn update_status(&self, cluster: &RedisCluster) -> Result<RedisCluster, ApiError> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_default();
        let operation = format!("update status {KIND_REDIS_CLUSTER} {namespace}/{name}");
        let api: Api<RedisCluster> = Api::namespaced(self.client.clone(), &namespace);

        let body = status_patch(cluster);
        let params = PatchParams::default();
        let patch = Patch::Merge(&body);

        retry_api_call(|| api.patch_status(&name, &params, &patch), &operation)
            .await
            .map_err(|e| ApiError::from_kube(e, KIND_REDIS_CLUSTER, &name, &operation))
    }
}

/// Merge patch replacing the whole status of `cluster`.
///
/// Carries the resource version so a stale copy is rejected with a conflict.
/// Conditions and member lists are always present, empty ones included; a key
/// missing from a merge patch leaves the server value in place.
#[must_use]
pub fn status_patch(cluster: &RedisCluster) -> serde_json::Value {
    json!({
        "apiVersion": API_GROUP_VERSION,
        "kind": KIND_REDIS_CLUSTER,
        "metadata": {
            "name": cluster.name_any(),
            "resourceVersion": cluster.metadata.resource_version,
        },
        "status": cluster.status,
    })
}

#[cfg(test)]
#[path = "cluster_api_tests.rs"]
mod cluster_api_tests;
