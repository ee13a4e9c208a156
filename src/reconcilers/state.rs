// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-cluster reconciliation state held by the engine.
//!
//! The state wraps a private, defaulted copy of the cluster together with the
//! two flags of the seed state machine. It lives only in memory: after a
//! restart every cluster starts again from "seeding".

use crate::crd::{RedisCluster, RedisClusterStatus};
use kube::ResourceExt;
use tracing::warn;

/// Reconciliation state of one cluster key.
#[derive(Clone, Debug)]
pub struct ClusterState {
    /// Working copy of the cluster with defaults applied. Never the cached instance.
    pub cluster: RedisCluster,

    /// False while the seed master still has to be brought up (or brought up again).
    pub seed_master_process_complete: bool,

    /// Set once the seed pod has been removed after Sentinel took over.
    pub seed_master_deleted: bool,

    /// Master address resolved by the most recent pass.
    pub master_address: Option<String>,

    observed_generation: Option<i64>,

    /// Status as last seen on the server, for write suppression.
    persisted_status: Option<RedisClusterStatus>,
}

impl ClusterState {
    /// Fresh state for a cluster seen for the first time by this process.
    #[must_use]
    pub fn new(observed: &RedisCluster) -> Self {
        Self {
            cluster: with_defaults(observed),
            seed_master_process_complete: false,
            seed_master_deleted: false,
            master_address: None,
            observed_generation: observed.metadata.generation,
            persisted_status: observed.status.clone(),
        }
    }

    /// Replace the working copy with a newer observation.
    ///
    /// Defaults are only re-applied when the spec generation changed; otherwise
    /// the previously defaulted spec is kept.
    pub fn refresh(&mut self, observed: &RedisCluster) {
        let spec = if observed.metadata.generation == self.observed_generation {
            self.cluster.spec.clone()
        } else {
            self.observed_generation = observed.metadata.generation;
            with_defaults(observed).spec
        };

        self.cluster = RedisCluster {
            metadata: observed.metadata.clone(),
            spec,
            status: observed.status.clone(),
        };
        self.persisted_status = observed.status.clone();
    }

    /// True when the working status differs from what the server holds.
    #[must_use]
    pub fn status_changed(&self) -> bool {
        self.cluster.status != self.persisted_status
    }

    /// Adopt the server's copy after a successful status write, keeping the
    /// defaulted spec.
    pub fn accept_server_copy(&mut self, updated: RedisCluster) {
        self.cluster.metadata = updated.metadata;
        self.cluster.status = updated.status;
        self.persisted_status = self.cluster.status.clone();
    }

    pub fn status_mut(&mut self) -> &mut RedisClusterStatus {
        self.cluster.status.get_or_insert_with(RedisClusterStatus::default)
    }
}

fn with_defaults(observed: &RedisCluster) -> RedisCluster {
    let name = observed.name_any();
    let spec = observed.spec.apply_defaults(&name);
    if spec.has_even_sentinels() {
        warn!(
            namespace = %observed.namespace().unwrap_or_default(),
            name = %name,
            replicas = spec.sentinels.replicas,
            "Sentinel replica count is even; failover votes may tie"
        );
    }

    RedisCluster {
        metadata: observed.metadata.clone(),
        spec,
        status: observed.status.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ClusterPhase, ConditionType};
    use crate::test_support::test_cluster;

    #[test]
    fn test_new_state_applies_defaults_and_starts_seeding() {
        let observed = test_cluster("cache1", "default");
        let state = ClusterState::new(&observed);

        assert!(!state.seed_master_process_complete);
        assert!(!state.seed_master_deleted);
        assert_eq!(state.cluster.spec.base_image, "redis");
        assert_eq!(state.cluster.spec.sentinels.config_map_ref, "sentinel-config-cache1");
        // cached object is untouched
        assert!(observed.spec.base_image.is_empty());
    }

    #[test]
    fn test_refresh_keeps_flags() {
        let observed = test_cluster("cache1", "default");
        let mut state = ClusterState::new(&observed);
        state.seed_master_process_complete = true;
        state.seed_master_deleted = true;

        state.refresh(&observed);

        assert!(state.seed_master_process_complete);
        assert!(state.seed_master_deleted);
    }

    #[test]
    fn test_refresh_reapplies_defaults_on_new_generation() {
        let mut observed = test_cluster("cache1", "default");
        let mut state = ClusterState::new(&observed);

        observed.spec.version = "5.0".into();
        observed.metadata.generation = Some(2);
        state.refresh(&observed);

        assert_eq!(state.cluster.spec.version, "5.0");
        assert_eq!(state.cluster.spec.base_image, "redis");
    }

    #[test]
    fn test_refresh_same_generation_keeps_defaulted_spec() {
        let observed = test_cluster("cache1", "default");
        let mut state = ClusterState::new(&observed);
        let before = state.cluster.spec.clone();

        let mut newer = observed.clone();
        newer.metadata.resource_version = Some("7".into());
        state.refresh(&newer);

        assert_eq!(state.cluster.spec, before);
        assert_eq!(state.cluster.metadata.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_refresh_takes_observed_status() {
        let mut observed = test_cluster("cache1", "default");
        let mut state = ClusterState::new(&observed);

        let mut status = RedisClusterStatus::default();
        status.set_phase(ClusterPhase::Running);
        status.mark(ConditionType::Ready);
        observed.status = Some(status.clone());
        state.refresh(&observed);

        assert_eq!(state.cluster.status, Some(status));
    }

    #[test]
    fn test_status_changed_tracks_server_copy() {
        let observed = test_cluster("cache1", "default");
        let mut state = ClusterState::new(&observed);
        assert!(!state.status_changed());

        state.status_mut().mark(ConditionType::AddingSeedMaster);
        assert!(state.status_changed());

        let mut server = state.cluster.clone();
        server.metadata.resource_version = Some("2".into());
        server.spec = RedisCluster::new("ignored", Default::default()).spec;
        state.accept_server_copy(server);

        assert!(!state.status_changed());
        assert_eq!(state.cluster.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(state.cluster.spec.base_image, "redis");
    }

    #[test]
    fn test_status_mut_creates_empty_status() {
        let mut state = ClusterState::new(&test_cluster("cache1", "default"));
        assert!(state.cluster.status.is_none());
        state.status_mut().set_phase(ClusterPhase::Creating);
        assert_eq!(
            state.cluster.status.as_ref().and_then(|s| s.phase),
            Some(ClusterPhase::Creating)
        );
    }
}
