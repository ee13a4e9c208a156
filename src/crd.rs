// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for Redis Sentinel clusters.
//!
//! A [`RedisCluster`] declares one master, a Sentinel quorum and a set of
//! replicas ("slaves"). The operator bootstraps a standalone seed master, lets
//! Sentinel take over master discovery, and keeps every generated sub-resource
//! converged with the declared spec.
//!
//! This module also owns the status bookkeeping: phase transitions and the
//! bounded condition history.
//!
//! # Example: Declaring a Cluster
//!
//! ```rust,no_run
//! use redis_sentinel_operator::crd::{RedisClusterSpec, SentinelSpec, SlaveSpec};
//!
//! let spec = RedisClusterSpec {
//!     sentinels: SentinelSpec {
//!         replicas: 3,
//!         quorum: 2,
//!         config_map_ref: String::new(),
//!     },
//!     slaves: SlaveSpec {
//!         replicas: 2,
//!         config_map_ref: String::new(),
//!     },
//!     base_image: String::new(),
//!     version: String::new(),
//!     paused: false,
//!     pod: None,
//! };
//!
//! let spec = spec.apply_defaults("cache1");
//! assert_eq!(spec.sentinels.config_map_ref, "sentinel-config-cache1");
//! ```

use crate::constants::{
    DEFAULT_BASE_IMAGE, DEFAULT_STORAGE_SIZE, DEFAULT_VERSION, MAX_CONDITIONS,
    SENTINEL_CONFIG_NAME_PREFIX,
};
use crate::labels::{APP_LABEL, RESERVED_LABEL_PREFIX};
use chrono::Utc;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel quorum settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentinelSpec {
    /// Number of sentinel processes. Should be odd so failover votes cannot tie.
    #[serde(default)]
    pub replicas: i32,

    /// Number of sentinels that must agree before a master is considered down.
    #[serde(default)]
    pub quorum: i32,

    /// Config map holding `sentinel.conf`.
    ///
    /// Defaults to `sentinel-config-<cluster>`, which the operator generates and
    /// keeps in sync. Any other name is treated as user-managed.
    #[serde(default)]
    pub config_map_ref: String,
}

/// Replica settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlaveSpec {
    /// Number of replicas attached to the current master.
    #[serde(default)]
    pub replicas: i32,

    /// Reserved for a replica config map. Currently informational.
    #[serde(default)]
    pub config_map_ref: String,
}

/// Scheduling and storage policy applied to every generated pod.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodPolicy {
    /// Extra labels merged into every pod template.
    ///
    /// `app` and any `redis_`-prefixed key are reserved by the operator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Node labels a pod's node must carry to be eligible.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Prefer spreading pods of the same role across nodes.
    #[serde(default)]
    pub anti_affinity: bool,

    /// Storage request for each slave's persistent volume (e.g. "1Gi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

/// `RedisCluster` declares a Sentinel-managed Redis topology.
///
/// # Example
///
/// ```yaml
/// apiVersion: redis.operator.io/v1
/// kind: RedisCluster
/// metadata:
///   name: cache1
///   namespace: default
/// spec:
///   sentinels:
///     replicas: 3
///     quorum: 2
///   slaves:
///     replicas: 2
///   pod:
///     antiAffinity: true
///     storage: 5Gi
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "redis.operator.io",
    version = "v1",
    kind = "RedisCluster",
    namespaced,
    shortname = "redis",
    doc = "RedisCluster declares one Redis master, a Sentinel quorum monitoring it, and a set of replicas. The master address is discovered through Sentinel rather than fixed configuration.",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Master","type":"string","jsonPath":".status.masterAddress"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "RedisClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    /// Sentinel quorum settings.
    #[serde(default)]
    pub sentinels: SentinelSpec,

    /// Replica settings.
    #[serde(default)]
    pub slaves: SlaveSpec,

    /// Container image repository. Defaults to `redis`.
    #[serde(default)]
    pub base_image: String,

    /// Container image tag. Defaults to `4.0-alpine`.
    #[serde(default)]
    pub version: String,

    /// Suspend reconciliation of this cluster.
    #[serde(default)]
    pub paused: bool,

    /// Optional pod policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodPolicy>,
}

/// Errors raised by [`RedisClusterSpec::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("spec: pod labels contain reserved label '{key}'")]
    ReservedPodLabel { key: String },
}

impl RedisClusterSpec {
    /// Return a copy of this spec with every empty field defaulted.
    ///
    /// Applying defaults to an already-defaulted spec returns it unchanged.
    #[must_use]
    pub fn apply_defaults(&self, cluster_name: &str) -> Self {
        let mut spec = self.clone();

        if spec.base_image.is_empty() {
            spec.base_image = DEFAULT_BASE_IMAGE.to_string();
        }
        if spec.version.is_empty() {
            spec.version = DEFAULT_VERSION.to_string();
        }
        if spec.sentinels.config_map_ref.is_empty() {
            spec.sentinels.config_map_ref = default_sentinel_config_map(cluster_name);
        }

        let pod = spec.pod.get_or_insert_with(PodPolicy::default);
        if pod.storage.as_deref().is_none_or(str::is_empty) {
            pod.storage = Some(DEFAULT_STORAGE_SIZE.to_string());
        }

        spec
    }

    /// Reject pod labels that would collide with the operator's selectors.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::ReservedPodLabel`] naming the first offending key.
    pub fn validate(&self) -> Result<(), SpecError> {
        let Some(pod) = &self.pod else {
            return Ok(());
        };

        match pod
            .labels
            .keys()
            .find(|k| k.as_str() == APP_LABEL || k.starts_with(RESERVED_LABEL_PREFIX))
        {
            Some(key) => Err(SpecError::ReservedPodLabel { key: key.clone() }),
            None => Ok(()),
        }
    }

    /// True when a nonzero, even sentinel count is requested.
    #[must_use]
    pub fn has_even_sentinels(&self) -> bool {
        self.sentinels.replicas != 0 && self.sentinels.replicas % 2 == 0
    }

    /// Container image reference built from `baseImage` and `version`.
    #[must_use]
    pub fn image(&self) -> String {
        format!("{}:{}", self.base_image, self.version)
    }

    /// Storage request for slave volumes.
    #[must_use]
    pub fn storage(&self) -> &str {
        self.pod
            .as_ref()
            .and_then(|p| p.storage.as_deref())
            .unwrap_or(DEFAULT_STORAGE_SIZE)
    }
}

/// Name of the operator-generated sentinel config map for a cluster.
#[must_use]
pub fn default_sentinel_config_map(cluster_name: &str) -> String {
    format!("{SENTINEL_CONFIG_NAME_PREFIX}-{cluster_name}")
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle phase reported in `status.phase`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClusterPhase {
    Creating,
    Stopping,
    Running,
    Failed,
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "Creating",
            Self::Stopping => "Stopping",
            Self::Running => "Running",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle transitions recorded in the condition history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    AddingSeedMaster,
    RemovingSeedMaster,
    AddingSentinel,
    RemovingSentinel,
    AddingSlave,
    RemovingSlave,
    Ready,
}

impl ConditionType {
    /// Human-readable reason recorded alongside this condition type.
    #[must_use]
    pub fn default_reason(self) -> &'static str {
        match self {
            Self::AddingSeedMaster => "Adding the Redis Seed Master",
            Self::RemovingSeedMaster => "Removing the Redis Seed Master",
            Self::AddingSentinel => "Adding a Redis sentinel",
            Self::RemovingSentinel => "Removing a Redis sentinel",
            Self::AddingSlave => "Adding a Redis slave",
            Self::RemovingSlave => "Removing a Redis slave",
            Self::Ready => "Server ready",
        }
    }
}

/// One entry of the condition history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    pub r#type: ConditionType,

    #[serde(default)]
    pub reason: String,

    /// When this entry was appended (RFC3339 format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Ready and unready member pod names for one role.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MembersStatus {
    #[serde(default)]
    pub ready: Vec<String>,
    #[serde(default)]
    pub unready: Vec<String>,
}

/// `RedisCluster` status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,

    /// Most recent lifecycle transitions, oldest first, at most ten entries.
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,

    #[serde(default)]
    pub slaves: MembersStatus,

    #[serde(default)]
    pub sentinels: MembersStatus,

    /// Master address resolved during the last successful pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_address: Option<String>,
}

impl RedisClusterStatus {
    pub fn set_phase(&mut self, phase: ClusterPhase) {
        self.phase = Some(phase);
    }

    /// Append a condition to the history.
    ///
    /// A condition equal in type and reason to the most recent entry is not
    /// appended again. Once the history holds ten entries the oldest is evicted.
    pub fn mark_condition(&mut self, condition_type: ConditionType, reason: &str) {
        if self
            .conditions
            .last()
            .is_some_and(|last| last.r#type == condition_type && last.reason == reason)
        {
            return;
        }

        if self.conditions.len() >= MAX_CONDITIONS {
            let overflow = self.conditions.len() + 1 - MAX_CONDITIONS;
            self.conditions.drain(..overflow);
        }

        self.conditions.push(ClusterCondition {
            r#type: condition_type,
            reason: reason.to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
        });
    }

    /// Append a condition using its default reason.
    pub fn mark(&mut self, condition_type: ConditionType) {
        self.mark_condition(condition_type, condition_type.default_reason());
    }

    /// Type of the most recent condition, if any.
    #[must_use]
    pub fn last_condition(&self) -> Option<ConditionType> {
        self.conditions.last().map(|c| c.r#type)
    }
}
