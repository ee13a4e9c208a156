// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builders for the sub-resources of a `RedisCluster`.
//!
//! Every builder is a pure function of the (defaulted) cluster: the same input
//! always yields a structurally identical object. Names follow one fixed
//! `<prefix>-<cluster>` template per kind, which is what lets the reconciler
//! look resources up by name instead of tracking them.
//!
//! | Builder | Kind | Name |
//! |---|---|---|
//! | [`build_seed_master_pod`] | `Pod` | `redis-master-<name>` |
//! | [`build_master_service`] | `Service` | `redis-master-<name>` |
//! | [`build_master_endpoints`] | `Endpoints` | `redis-master-<name>` |
//! | [`build_sentinel_config_map`] | `ConfigMap` | `sentinel-config-<name>` |
//! | [`build_sentinel_service`] | `Service` | `redis-sentinel-<name>` |
//! | [`build_sentinel_deployment`] | `Deployment` | `redis-sentinel-<name>` |
//! | [`build_slave_statefulset`] | `StatefulSet` | `redis-slave-<name>` |

use crate::constants::{
    ANTI_AFFINITY_WEIGHT, API_GROUP_VERSION, CONFIG_MOUNT_PATH, CONTAINER_MASTER,
    CONTAINER_SENTINEL, CONTAINER_SENTINEL_CONFIG_COPY, CONTAINER_SLAVE, DATA_MOUNT_PATH,
    DATA_VOLUME, KIND_REDIS_CLUSTER, MASTER_NAME_PREFIX, READINESS_INITIAL_DELAY_SECS,
    READINESS_PERIOD_SECS, REDIS_PORT, REDIS_PORT_NAME, SENTINEL_CONFIG_FILE,
    SENTINEL_CONFIG_VOLUME, SENTINEL_DOWN_AFTER_MILLIS, SENTINEL_FAILOVER_TIMEOUT_MILLIS,
    SENTINEL_NAME_PREFIX, SENTINEL_PARALLEL_SYNCS, SENTINEL_PORT, SENTINEL_PORT_NAME,
    SLAVE_NAME_PREFIX, SLAVE_STORAGE_VOLUME, TOPOLOGY_KEY_HOSTNAME,
};
use crate::crd::{default_sentinel_config_map, RedisCluster};
use crate::labels::{
    APP_LABEL, APP_REDIS, K8S_MANAGED_BY, MANAGED_BY_OPERATOR, OPERATOR_LABEL, ROLE_LABEL,
    ROLE_MASTER, ROLE_SENTINEL, ROLE_SLAVE,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, Pod, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec,
    Probe, Service, ServicePort, ServiceSpec, TCPSocketAction, Volume, VolumeMount,
    VolumeResourceRequirements, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

const SENTINEL_CONF_TEMPLATE: &str = include_str!("../templates/sentinel.conf.tmpl");

// ============================================================================
// Names
// ============================================================================

/// Name of the standalone seed master pod.
#[must_use]
pub fn master_pod_name(cluster_name: &str) -> String {
    format!("{MASTER_NAME_PREFIX}-{cluster_name}")
}

/// Name shared by the master service and its hand-managed endpoints.
#[must_use]
pub fn master_service_name(cluster_name: &str) -> String {
    format!("{MASTER_NAME_PREFIX}-{cluster_name}")
}

#[must_use]
pub fn sentinel_service_name(cluster_name: &str) -> String {
    format!("{SENTINEL_NAME_PREFIX}-{cluster_name}")
}

#[must_use]
pub fn sentinel_deployment_name(cluster_name: &str) -> String {
    format!("{SENTINEL_NAME_PREFIX}-{cluster_name}")
}

#[must_use]
pub fn slave_statefulset_name(cluster_name: &str) -> String {
    format!("{SLAVE_NAME_PREFIX}-{cluster_name}")
}

/// Name under which Sentinel monitors the cluster's master.
#[must_use]
pub fn monitored_name(cluster: &RedisCluster) -> String {
    cluster.name_any()
}

// ============================================================================
// Labels and Ownership
// ============================================================================

/// Selector labels for pods of one role. Used for service and workload selectors.
#[must_use]
pub fn selector_labels(cluster_name: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OPERATOR_LABEL.to_string(), cluster_name.to_string()),
        (APP_LABEL.to_string(), APP_REDIS.to_string()),
        (ROLE_LABEL.to_string(), role.to_string()),
    ])
}

/// Full label set for pods of one role.
///
/// User labels from `spec.pod.labels` are merged in first so the selector
/// labels always win.
#[must_use]
pub fn pod_labels(cluster: &RedisCluster, role: &str) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = cluster
        .spec
        .pod
        .as_ref()
        .map(|p| p.labels.clone())
        .unwrap_or_default();
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_OPERATOR.into());
    labels.extend(selector_labels(&cluster.name_any(), role));
    labels
}

/// Owner reference pointing back at the cluster, so the sub-resource is
/// garbage-collected with it.
#[must_use]
pub fn build_owner_references(cluster: &RedisCluster) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_REDIS_CLUSTER.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

fn object_meta(cluster: &RedisCluster, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(BTreeMap::from([
            (OPERATOR_LABEL.to_string(), cluster.name_any()),
            (K8S_MANAGED_BY.to_string(), MANAGED_BY_OPERATOR.to_string()),
        ])),
        owner_references: Some(build_owner_references(cluster)),
        ..Default::default()
    }
}

// ============================================================================
// Pod Template Pieces
// ============================================================================

fn redis_container(cluster: &RedisCluster, name: &str, port_name: &str, port: u16) -> Container {
    Container {
        name: name.to_string(),
        image: Some(cluster.spec.image()),
        ports: Some(vec![ContainerPort {
            name: Some(port_name.to_string()),
            container_port: i32::from(port),
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        readiness_probe: Some(tcp_readiness_probe(port)),
        ..Default::default()
    }
}

fn tcp_readiness_probe(port: u16) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(i32::from(port)),
            ..Default::default()
        }),
        initial_delay_seconds: Some(READINESS_INITIAL_DELAY_SECS),
        period_seconds: Some(READINESS_PERIOD_SECS),
        ..Default::default()
    }
}

/// Preferred hostname anti-affinity among pods of the same role, when
/// `spec.pod.antiAffinity` is set.
fn build_affinity(cluster: &RedisCluster, role: &str) -> Option<Affinity> {
    let enabled = cluster.spec.pod.as_ref().is_some_and(|p| p.anti_affinity);
    if !enabled {
        return None;
    }

    Some(Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: ANTI_AFFINITY_WEIGHT,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(selector_labels(&cluster.name_any(), role)),
                            ..Default::default()
                        }),
                        topology_key: TOPOLOGY_KEY_HOSTNAME.to_string(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn node_selector(cluster: &RedisCluster) -> Option<BTreeMap<String, String>> {
    cluster
        .spec
        .pod
        .as_ref()
        .filter(|p| !p.node_selector.is_empty())
        .map(|p| p.node_selector.clone())
}

fn pod_spec(cluster: &RedisCluster, role: &str, containers: Vec<Container>) -> PodSpec {
    PodSpec {
        containers,
        affinity: build_affinity(cluster, role),
        node_selector: node_selector(cluster),
        ..Default::default()
    }
}

// ============================================================================
// Seed Master
// ============================================================================

/// Standalone master used to bootstrap replication before Sentinel exists.
#[must_use]
pub fn build_seed_master_pod(cluster: &RedisCluster) -> Pod {
    let mut metadata = object_meta(cluster, master_pod_name(&cluster.name_any()));
    metadata.labels = Some(pod_labels(cluster, ROLE_MASTER));

    Pod {
        metadata,
        spec: Some(pod_spec(
            cluster,
            ROLE_MASTER,
            vec![redis_container(
                cluster,
                CONTAINER_MASTER,
                REDIS_PORT_NAME,
                REDIS_PORT,
            )],
        )),
        ..Default::default()
    }
}

// ============================================================================
// Master Service and Endpoints
// ============================================================================

/// Selector-less service in front of the current master.
///
/// Its endpoints are written by the operator (see [`build_master_endpoints`])
/// so that the address always follows Sentinel's view of the master.
#[must_use]
pub fn build_master_service(cluster: &RedisCluster) -> Service {
    Service {
        metadata: object_meta(cluster, master_service_name(&cluster.name_any())),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            ports: Some(vec![ServicePort {
                name: Some(REDIS_PORT_NAME.into()),
                protocol: Some("TCP".into()),
                port: i32::from(REDIS_PORT),
                target_port: Some(IntOrString::Int(i32::from(REDIS_PORT))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Endpoints of the master service, pointing at `master_ip`.
#[must_use]
pub fn build_master_endpoints(cluster: &RedisCluster, master_ip: &str) -> Endpoints {
    Endpoints {
        metadata: object_meta(cluster, master_service_name(&cluster.name_any())),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: master_ip.to_string(),
                ..Default::default()
            }]),
            ports: Some(vec![EndpointPort {
                name: Some(REDIS_PORT_NAME.into()),
                port: i32::from(REDIS_PORT),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }
}

// ============================================================================
// Sentinel
// ============================================================================

/// Render `sentinel.conf` for a cluster.
#[must_use]
pub fn build_sentinel_config(cluster: &RedisCluster) -> String {
    let name = monitored_name(cluster);
    SENTINEL_CONF_TEMPLATE
        .replace("{{DATA_DIR}}", DATA_MOUNT_PATH)
        .replace("{{NAME}}", &name)
        .replace("{{MASTER_HOST}}", &master_service_name(&cluster.name_any()))
        .replace("{{PORT}}", &REDIS_PORT.to_string())
        .replace("{{QUORUM}}", &cluster.spec.sentinels.quorum.to_string())
        .replace("{{DOWN_AFTER_MILLIS}}", &SENTINEL_DOWN_AFTER_MILLIS.to_string())
        .replace("{{PARALLEL_SYNCS}}", &SENTINEL_PARALLEL_SYNCS.to_string())
        .replace(
            "{{FAILOVER_TIMEOUT_MILLIS}}",
            &SENTINEL_FAILOVER_TIMEOUT_MILLIS.to_string(),
        )
}

/// Operator-generated config map holding `sentinel.conf`.
///
/// Always named `sentinel-config-<name>`; a user-supplied `configMapRef` is
/// mounted by the deployment but never generated.
#[must_use]
pub fn build_sentinel_config_map(cluster: &RedisCluster) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(cluster, default_sentinel_config_map(&cluster.name_any())),
        data: Some(BTreeMap::from([(
            SENTINEL_CONFIG_FILE.to_string(),
            build_sentinel_config(cluster),
        )])),
        ..Default::default()
    }
}

/// True when the cluster mounts the config map the operator generates.
#[must_use]
pub fn uses_generated_sentinel_config(cluster: &RedisCluster) -> bool {
    cluster.spec.sentinels.config_map_ref == default_sentinel_config_map(&cluster.name_any())
}

#[must_use]
pub fn build_sentinel_service(cluster: &RedisCluster) -> Service {
    Service {
        metadata: object_meta(cluster, sentinel_service_name(&cluster.name_any())),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".into()),
            ports: Some(vec![ServicePort {
                name: Some(SENTINEL_PORT_NAME.into()),
                protocol: Some("TCP".into()),
                port: i32::from(SENTINEL_PORT),
                target_port: Some(IntOrString::Int(i32::from(SENTINEL_PORT))),
                ..Default::default()
            }]),
            selector: Some(selector_labels(&cluster.name_any(), ROLE_SENTINEL)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Sentinel deployment.
///
/// Sentinel rewrites its config file at runtime, so an init container copies
/// the read-only config map projection into a writable `emptyDir` first.
#[must_use]
pub fn build_sentinel_deployment(cluster: &RedisCluster) -> Deployment {
    let name = cluster.name_any();
    let config_path = format!("{CONFIG_MOUNT_PATH}/{SENTINEL_CONFIG_FILE}");
    let data_path = format!("{DATA_MOUNT_PATH}/{SENTINEL_CONFIG_FILE}");

    let volume_mounts = vec![
        VolumeMount {
            name: SENTINEL_CONFIG_VOLUME.into(),
            mount_path: CONFIG_MOUNT_PATH.into(),
            ..Default::default()
        },
        VolumeMount {
            name: DATA_VOLUME.into(),
            mount_path: DATA_MOUNT_PATH.into(),
            ..Default::default()
        },
    ];

    let mut sentinel = redis_container(cluster, CONTAINER_SENTINEL, SENTINEL_PORT_NAME, SENTINEL_PORT);
    sentinel.args = Some(vec![data_path.clone(), "--sentinel".into()]);
    sentinel.volume_mounts = Some(volume_mounts.clone());

    let copy_config = Container {
        name: CONTAINER_SENTINEL_CONFIG_COPY.into(),
        image: Some(cluster.spec.image()),
        command: Some(vec!["cp".into(), config_path, data_path]),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    let mut template_spec = pod_spec(cluster, ROLE_SENTINEL, vec![sentinel]);
    template_spec.init_containers = Some(vec![copy_config]);
    template_spec.volumes = Some(vec![
        Volume {
            name: SENTINEL_CONFIG_VOLUME.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: cluster.spec.sentinels.config_map_ref.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: DATA_VOLUME.into(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ]);

    Deployment {
        metadata: object_meta(cluster, sentinel_deployment_name(&name)),
        spec: Some(DeploymentSpec {
            replicas: Some(cluster.spec.sentinels.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name, ROLE_SENTINEL)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels(cluster, ROLE_SENTINEL)),
                    ..Default::default()
                }),
                spec: Some(template_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// Slaves
// ============================================================================

/// Replica stateful set. Every replica follows the master service, whose
/// endpoints track the Sentinel-discovered master.
#[must_use]
pub fn build_slave_statefulset(cluster: &RedisCluster) -> StatefulSet {
    let name = cluster.name_any();
    let statefulset_name = slave_statefulset_name(&name);

    let mut slave = redis_container(cluster, CONTAINER_SLAVE, REDIS_PORT_NAME, REDIS_PORT);
    slave.args = Some(vec![
        "--slaveof".into(),
        master_service_name(&name),
        REDIS_PORT.to_string(),
    ]);
    slave.volume_mounts = Some(vec![VolumeMount {
        name: SLAVE_STORAGE_VOLUME.into(),
        mount_path: DATA_MOUNT_PATH.into(),
        ..Default::default()
    }]);

    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(SLAVE_STORAGE_VOLUME.into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".into()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(cluster.spec.storage().to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: object_meta(cluster, statefulset_name.clone()),
        spec: Some(StatefulSetSpec {
            service_name: Some(statefulset_name),
            replicas: Some(cluster.spec.slaves.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name, ROLE_SLAVE)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels(cluster, ROLE_SLAVE)),
                    ..Default::default()
                }),
                spec: Some(pod_spec(cluster, ROLE_SLAVE, vec![slave])),
            },
            volume_claim_templates: Some(vec![claim]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

