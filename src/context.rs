// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciliation engine.
//!
//! The engine receives an `Arc<Context>` that contains:
//! - The cluster API write path
//! - The Sentinel master-discovery client
//! - Reflector stores for the custom resource and every sub-resource kind
//! - Runtime settings and the shutdown signal
//!
//! The stores are populated by the watch loops in [`crate::informers`] and are
//! read-only from the engine's point of view.

use crate::cluster_api::ClusterApi;
use crate::constants::{SEED_POLL_INITIAL_MILLIS, SEED_POLL_STEPS};
use crate::crd::RedisCluster;
use crate::labels::{OPERATOR_LABEL, ROLE_LABEL};
use crate::reconcilers::resources::{SubResource, SubResourceKind};
use crate::sentinel::MasterDiscovery;
use crate::shutdown::ShutdownSignal;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;

/// Shared context passed to the engine and its workers.
#[derive(Clone)]
pub struct Context {
    /// Cluster API write path
    pub api: Arc<dyn ClusterApi>,

    /// Sentinel-backed master discovery
    pub discovery: Arc<dyn MasterDiscovery>,

    /// Reflector stores for all watched kinds
    pub stores: Stores,

    pub settings: Settings,

    pub shutdown: ShutdownSignal,
}

/// Tunables of the reconcile pass.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Number of seed master readiness checks per pass
    pub seed_poll_steps: u32,

    /// Delay before the second readiness check
    pub seed_poll_initial: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed_poll_steps: SEED_POLL_STEPS,
            seed_poll_initial: Duration::from_millis(SEED_POLL_INITIAL_MILLIS),
        }
    }
}

/// Collection of all reflector stores.
///
/// Each store is populated by a dedicated reflector task and provides
/// in-memory access to resources without API calls.
#[derive(Clone)]
pub struct Stores {
    pub redis_clusters: Store<RedisCluster>,
    pub pods: Store<Pod>,
    pub deployments: Store<Deployment>,
    pub stateful_sets: Store<StatefulSet>,
    pub services: Store<Service>,
    pub endpoints: Store<Endpoints>,
    pub config_maps: Store<ConfigMap>,
}

impl Stores {
    /// Get a `RedisCluster` by name and namespace from the store.
    #[must_use]
    pub fn get_redis_cluster(&self, name: &str, namespace: &str) -> Option<Arc<RedisCluster>> {
        self.redis_clusters
            .get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_pod(&self, name: &str, namespace: &str) -> Option<Arc<Pod>> {
        self.pods.get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_deployment(&self, name: &str, namespace: &str) -> Option<Arc<Deployment>> {
        self.deployments.get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_stateful_set(&self, name: &str, namespace: &str) -> Option<Arc<StatefulSet>> {
        self.stateful_sets.get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_config_map(&self, name: &str, namespace: &str) -> Option<Arc<ConfigMap>> {
        self.config_maps.get(&ObjectRef::new(name).within(namespace))
    }

    /// Look up the live copy of a sub-resource by kind and derived name.
    #[must_use]
    pub fn get_sub_resource(
        &self,
        kind: SubResourceKind,
        name: &str,
        namespace: &str,
    ) -> Option<SubResource> {
        match kind {
            SubResourceKind::Pod => self
                .get_pod(name, namespace)
                .map(|o| SubResource::Pod((*o).clone())),
            SubResourceKind::Deployment => self
                .get_deployment(name, namespace)
                .map(|o| SubResource::Deployment((*o).clone())),
            SubResourceKind::StatefulSet => self
                .get_stateful_set(name, namespace)
                .map(|o| SubResource::StatefulSet((*o).clone())),
            SubResourceKind::Service => self
                .services
                .get(&ObjectRef::new(name).within(namespace))
                .map(|o| SubResource::Service((*o).clone())),
            SubResourceKind::Endpoints => self
                .endpoints
                .get(&ObjectRef::new(name).within(namespace))
                .map(|o| SubResource::Endpoints((*o).clone())),
            SubResourceKind::ConfigMap => self
                .get_config_map(name, namespace)
                .map(|o| SubResource::ConfigMap((*o).clone())),
        }
    }

    /// Pods of one role belonging to a cluster, sorted by name.
    #[must_use]
    pub fn pods_with_role(&self, cluster_name: &str, namespace: &str, role: &str) -> Vec<Arc<Pod>> {
        let mut pods: Vec<_> = self
            .pods
            .state()
            .into_iter()
            .filter(|pod| {
                let labels = pod.labels();
                pod.namespace().as_deref() == Some(namespace)
                    && labels.get(OPERATOR_LABEL).map(String::as_str) == Some(cluster_name)
                    && labels.get(ROLE_LABEL).map(String::as_str) == Some(role)
            })
            .collect();
        pods.sort_by_key(|pod| pod.name_any());
        pods
    }
}

/// True when the pod's `Ready` condition is `True`.
#[must_use]
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Pod IP, if assigned.
#[must_use]
pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
