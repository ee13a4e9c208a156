// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes for exercising the engine without a cluster.
//!
//! [`Harness`] wires a [`Context`] whose stores are fed through reflector
//! writers, whose API records every write, and whose Sentinel answers from
//! fixed values.

use crate::cluster_api::{status_patch, ClusterApi};
use crate::context::{Context, Settings, Stores};
use crate::crd::{ClusterPhase, ConditionType, RedisCluster, RedisClusterSpec, SentinelSpec, SlaveSpec};
use crate::errors::ApiError;
use crate::labels::{OPERATOR_LABEL, ROLE_LABEL};
use crate::reconcilers::resources::{SubResource, SubResourceKind};
use crate::sentinel::{DiscoveryError, MasterDiscovery, SentinelEndpoint};
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::runtime::reflector::{store, store::Writer, ObjectRef};
use kube::runtime::watcher::Event;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded write.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create {
        kind: SubResourceKind,
        name: String,
    },
    Patch {
        kind: SubResourceKind,
        name: String,
        patch: serde_json::Value,
    },
    Delete {
        kind: SubResourceKind,
        name: String,
    },
    UpdateStatus {
        phase: Option<ClusterPhase>,
        conditions: Vec<ConditionType>,
    },
}

/// Recording [`ClusterApi`].
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    created: Mutex<Vec<SubResource>>,
    clusters: Arc<Mutex<Writer<RedisCluster>>>,
    pods: Arc<Mutex<Writer<Pod>>>,
    /// IP a created pod is published with, as if it became ready immediately
    pub seed_ip: Mutex<Option<String>>,
    /// Every delete answers not-found
    pub delete_not_found: Mutex<bool>,
    /// Deletes of this kind fail with a conflict
    pub fail_delete: Mutex<Option<SubResourceKind>>,
    /// Creates of this kind fail
    pub fail_create: Mutex<Option<SubResourceKind>>,
    /// Status writes fail with a conflict
    pub fail_status: Mutex<bool>,
}

impl FakeApi {
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Sub-resource writes only, ignoring status updates.
    #[must_use]
    pub fn resource_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::UpdateStatus { .. }))
            .collect()
    }

    /// Phases written by status updates, in order.
    #[must_use]
    pub fn phases(&self) -> Vec<ClusterPhase> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateStatus { phase, .. } => phase,
                _ => None,
            })
            .collect()
    }

    /// Most recently created object of `kind` named `name`.
    #[must_use]
    pub fn created_object(&self, kind: SubResourceKind, name: &str) -> Option<SubResource> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.kind() == kind && r.name() == name)
            .cloned()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ClusterApi for FakeApi {
    async fn create(&self, _namespace: &str, resource: &SubResource) -> Result<(), ApiError> {
        let kind = resource.kind();
        let name = resource.name();
        self.record(Call::Create {
            kind,
            name: name.clone(),
        });

        if *self.fail_create.lock().unwrap() == Some(kind) {
            return Err(ApiError::Conflict {
                kind: kind.to_string(),
                name,
                message: "injected failure".into(),
            });
        }
        self.created.lock().unwrap().push(resource.clone());

        if let (SubResource::Pod(pod), Some(ip)) = (resource, self.seed_ip.lock().unwrap().clone()) {
            let published = with_ready_status(pod.clone(), &ip);
            self.pods
                .lock()
                .unwrap()
                .apply_watcher_event(&Event::Apply(published));
        }
        Ok(())
    }

    async fn patch(
        &self,
        _namespace: &str,
        kind: SubResourceKind,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ApiError> {
        self.record(Call::Patch {
            kind,
            name: name.to_string(),
            patch: patch.clone(),
        });
        Ok(())
    }

    async fn delete(
        &self,
        _namespace: &str,
        kind: SubResourceKind,
        name: &str,
    ) -> Result<(), ApiError> {
        self.record(Call::Delete {
            kind,
            name: name.to_string(),
        });
        if *self.fail_delete.lock().unwrap() == Some(kind) {
            return Err(ApiError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: "injected failure".into(),
            });
        }
        if *self.delete_not_found.lock().unwrap() {
            return Err(ApiError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn update_status(&self, cluster: &RedisCluster) -> Result<RedisCluster, ApiError> {
        let status = cluster.status.clone().unwrap_or_default();
        self.record(Call::UpdateStatus {
            phase: status.phase,
            conditions: status.conditions.iter().map(|c| c.r#type).collect(),
        });

        if *self.fail_status.lock().unwrap() {
            return Err(ApiError::Conflict {
                kind: "RedisCluster".into(),
                name: cluster.name_any(),
                message: "injected conflict".into(),
            });
        }

        // Merge the patch body into the stored status the way the API server does.
        let key = ObjectRef::new(&cluster.name_any()).within(&cluster.namespace().unwrap_or_default());
        let mut server_status = self
            .clusters
            .lock()
            .unwrap()
            .as_reader()
            .get(&key)
            .and_then(|stored| stored.status.clone())
            .map(|s| serde_json::to_value(s).unwrap())
            .unwrap_or(Value::Null);
        merge_patch(&mut server_status, &status_patch(cluster)["status"]);

        let mut updated = cluster.clone();
        updated.status = serde_json::from_value(server_status).unwrap();
        let version = updated
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        updated.metadata.resource_version = Some((version + 1).to_string());
        self.clusters
            .lock()
            .unwrap()
            .apply_watcher_event(&Event::Apply(updated.clone()));
        Ok(updated)
    }
}

/// Apply a JSON merge patch (RFC 7386) to `target`.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            if value.is_null() {
                existing.remove(key);
            } else {
                merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// [`MasterDiscovery`] answering from fixed values.
#[derive(Default)]
pub struct FakeDiscovery {
    pub master: Mutex<Option<String>>,
    pub replicas: Mutex<usize>,
}

#[async_trait]
impl MasterDiscovery for FakeDiscovery {
    async fn resolve_master(
        &self,
        _endpoint: &SentinelEndpoint,
        monitored_name: &str,
    ) -> Result<String, DiscoveryError> {
        self.master
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DiscoveryError::NoMaster {
                name: monitored_name.to_string(),
            })
    }

    async fn count_replicas(
        &self,
        _endpoint: &SentinelEndpoint,
        _monitored_name: &str,
    ) -> Result<usize, DiscoveryError> {
        Ok(*self.replicas.lock().unwrap())
    }
}

/// A context backed by fakes, plus the writers feeding its stores.
pub struct Harness {
    pub ctx: Arc<Context>,
    pub api: Arc<FakeApi>,
    pub discovery: Arc<FakeDiscovery>,
    clusters: Arc<Mutex<Writer<RedisCluster>>>,
    pods: Arc<Mutex<Writer<Pod>>>,
    endpoints: Writer<k8s_openapi::api::core::v1::Endpoints>,
    services: Writer<k8s_openapi::api::core::v1::Service>,
    deployments: Writer<k8s_openapi::api::apps::v1::Deployment>,
    stateful_sets: Writer<k8s_openapi::api::apps::v1::StatefulSet>,
    config_maps: Writer<k8s_openapi::api::core::v1::ConfigMap>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        let (redis_clusters, cluster_writer) = store::<RedisCluster>();
        let (pods, pod_writer) = store::<Pod>();
        let (deployments, deployment_writer) = store();
        let (stateful_sets, stateful_set_writer) = store();
        let (services, service_writer) = store();
        let (endpoints, endpoint_writer) = store();
        let (config_maps, config_map_writer) = store();

        let cluster_writer = Arc::new(Mutex::new(cluster_writer));
        let pod_writer = Arc::new(Mutex::new(pod_writer));
        let api = Arc::new(FakeApi {
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            clusters: Arc::clone(&cluster_writer),
            pods: Arc::clone(&pod_writer),
            seed_ip: Mutex::new(None),
            delete_not_found: Mutex::new(false),
            fail_delete: Mutex::new(None),
            fail_create: Mutex::new(None),
            fail_status: Mutex::new(false),
        });
        let discovery = Arc::new(FakeDiscovery::default());

        let ctx = Arc::new(Context {
            api: api.clone(),
            discovery: discovery.clone(),
            stores: Stores {
                redis_clusters,
                pods,
                deployments,
                stateful_sets,
                services,
                endpoints,
                config_maps,
            },
            settings: Settings {
                seed_poll_steps: 3,
                seed_poll_initial: Duration::from_millis(1),
            },
            shutdown: ShutdownSignal::new(),
        });

        Self {
            ctx,
            api,
            discovery,
            clusters: cluster_writer,
            pods: pod_writer,
            endpoints: endpoint_writer,
            services: service_writer,
            deployments: deployment_writer,
            stateful_sets: stateful_set_writer,
            config_maps: config_map_writer,
        }
    }

    pub fn apply_cluster(&mut self, cluster: RedisCluster) {
        self.clusters
            .lock()
            .unwrap()
            .apply_watcher_event(&Event::Apply(cluster));
    }

    pub fn delete_cluster(&mut self, cluster: RedisCluster) {
        self.clusters
            .lock()
            .unwrap()
            .apply_watcher_event(&Event::Delete(cluster));
    }

    pub fn apply_pod(&mut self, pod: Pod) {
        self.pods
            .lock()
            .unwrap()
            .apply_watcher_event(&Event::Apply(pod));
    }

    /// Feed every object created so far into the stores, as the watches would.
    pub fn publish_created(&mut self) {
        let created = self.api.created.lock().unwrap().clone();
        for resource in created {
            // the pod store already holds the published, ready copy
            if !matches!(resource, SubResource::Pod(_)) {
                self.apply_resource(resource);
            }
        }
    }

    pub fn apply_resource(&mut self, resource: SubResource) {
        match resource {
            SubResource::Pod(o) => self.apply_pod(o),
            SubResource::Endpoints(o) => self.endpoints.apply_watcher_event(&Event::Apply(o)),
            SubResource::Service(o) => self.services.apply_watcher_event(&Event::Apply(o)),
            SubResource::Deployment(o) => self.deployments.apply_watcher_event(&Event::Apply(o)),
            SubResource::ConfigMap(o) => self.config_maps.apply_watcher_event(&Event::Apply(o)),
            SubResource::StatefulSet(o) => self.stateful_sets.apply_watcher_event(&Event::Apply(o)),
        }
    }
}

/// A cluster as the API server would hand it out: no defaults applied.
#[must_use]
pub fn test_cluster(name: &str, namespace: &str) -> RedisCluster {
    let mut cluster = RedisCluster::new(
        name,
        RedisClusterSpec {
            sentinels: SentinelSpec {
                replicas: 3,
                quorum: 2,
                config_map_ref: String::new(),
            },
            slaves: SlaveSpec {
                replicas: 2,
                config_map_ref: String::new(),
            },
            ..Default::default()
        },
    );
    cluster.meta_mut().namespace = Some(namespace.to_string());
    cluster.meta_mut().uid = Some(format!("uid-{name}"));
    cluster.meta_mut().resource_version = Some("1".into());
    cluster.meta_mut().generation = Some(1);
    cluster
}

/// Mark a pod ready at `ip`.
#[must_use]
pub fn with_ready_status(mut pod: Pod, ip: &str) -> Pod {
    pod.status = Some(PodStatus {
        pod_ip: Some(ip.to_string()),
        conditions: Some(vec![PodCondition {
            type_: "Ready".into(),
            status: "True".into(),
            last_transition_time: Some(Time(k8s_openapi::jiff::Timestamp::now())),
            ..Default::default()
        }]),
        ..Default::default()
    });
    pod
}

/// A member pod of `cluster` with the given role and readiness.
#[must_use]
pub fn member_pod(cluster: &str, namespace: &str, name: &str, role: &str, ready: bool) -> Pod {
    let pod = Pod {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(BTreeMap::from([
                (OPERATOR_LABEL.to_string(), cluster.to_string()),
                (ROLE_LABEL.to_string(), role.to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    };
    if ready {
        with_ready_status(pod, "10.0.0.100")
    } else {
        pod
    }
}
