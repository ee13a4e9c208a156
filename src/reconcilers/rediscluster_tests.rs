// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `rediscluster.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_support::{test_cluster, Call, Harness};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    const SENTINEL: (ConditionType, ConditionType) =
        (ConditionType::AddingSentinel, ConditionType::RemovingSentinel);

    #[test]
    fn test_scaling_condition() {
        assert_eq!(
            scaling_condition(ApplyOutcome::Created, None, 3, SENTINEL),
            Some(ConditionType::AddingSentinel)
        );
        assert_eq!(
            scaling_condition(ApplyOutcome::Patched, Some(3), 5, SENTINEL),
            Some(ConditionType::AddingSentinel)
        );
        assert_eq!(
            scaling_condition(ApplyOutcome::Patched, Some(5), 3, SENTINEL),
            Some(ConditionType::RemovingSentinel)
        );
        assert_eq!(
            scaling_condition(ApplyOutcome::Unchanged, Some(3), 3, SENTINEL),
            None
        );
        assert_eq!(scaling_condition(ApplyOutcome::Patched, None, 3, SENTINEL), None);
    }

    fn seeded_state(cluster: &RedisCluster) -> ClusterState {
        let mut state = ClusterState::new(cluster);
        state.seed_master_process_complete = true;
        state.seed_master_deleted = true;
        state
    }

    fn with_replicas(harness: &Harness) {
        *harness.discovery.master.lock().unwrap() = Some("10.0.0.7".into());
        *harness.discovery.replicas.lock().unwrap() = 2;
    }

    #[tokio::test]
    async fn test_custom_sentinel_config_is_never_written() {
        let mut harness = Harness::new();
        with_replicas(&harness);
        let mut cluster = test_cluster("cache1", "default");
        cluster.spec.sentinels.config_map_ref = "my-sentinel-conf".into();
        harness.apply_resource(SubResource::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("my-sentinel-conf".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            ..Default::default()
        }));
        let mut state = seeded_state(&cluster);

        reconcile_redis_cluster(&harness.ctx, &mut state).await.unwrap();

        assert!(!harness.api.resource_calls().iter().any(|c| matches!(
            c,
            Call::Create { kind: SubResourceKind::ConfigMap, .. }
                | Call::Patch { kind: SubResourceKind::ConfigMap, .. }
        )));
    }

    #[tokio::test]
    async fn test_missing_custom_sentinel_config_fails_pass() {
        let harness = Harness::new();
        with_replicas(&harness);
        let mut cluster = test_cluster("cache1", "default");
        cluster.spec.sentinels.config_map_ref = "my-sentinel-conf".into();
        let mut state = seeded_state(&cluster);

        let err = reconcile_redis_cluster(&harness.ctx, &mut state)
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("my-sentinel-conf"));
        // steps after the config map are not attempted
        assert!(!harness.api.resource_calls().iter().any(|c| matches!(
            c,
            Call::Create { kind: SubResourceKind::Deployment, .. }
        )));
    }

    #[tokio::test]
    async fn test_failing_step_aborts_remaining_steps() {
        let harness = Harness::new();
        with_replicas(&harness);
        *harness.api.fail_create.lock().unwrap() = Some(SubResourceKind::Service);
        let mut state = seeded_state(&test_cluster("cache1", "default"));

        assert!(reconcile_redis_cluster(&harness.ctx, &mut state).await.is_err());

        let created: Vec<_> = harness
            .api
            .resource_calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            created,
            vec![SubResourceKind::Endpoints, SubResourceKind::Service]
        );
    }

    #[tokio::test]
    async fn test_scaling_sentinels_marks_condition() {
        let mut harness = Harness::new();
        with_replicas(&harness);
        let cluster = test_cluster("cache1", "default");
        let mut state = seeded_state(&cluster);
        reconcile_redis_cluster(&harness.ctx, &mut state).await.unwrap();
        harness.publish_created();

        state.cluster.spec.sentinels.replicas = 5;
        reconcile_redis_cluster(&harness.ctx, &mut state).await.unwrap();

        assert_eq!(
            state.cluster.status.as_ref().and_then(|s| s.last_condition()),
            Some(ConditionType::AddingSentinel)
        );
        assert!(harness.api.resource_calls().iter().any(|c| matches!(
            c,
            Call::Patch { kind: SubResourceKind::Deployment, .. }
        )));
    }

    #[tokio::test]
    async fn test_seed_poll_stops_on_shutdown() {
        let harness = Harness::new();
        harness.ctx.shutdown.trigger();

        let err = wait_for_seed_master(&harness.ctx, "default", "redis-master-cache1")
            .await
            .unwrap_err();

        assert!(matches!(err, SeedError::Interrupted { .. }));
    }

    #[tokio::test]
    async fn test_delete_cluster_resources_aborts_on_error() {
        let harness = Harness::new();
        *harness.api.fail_delete.lock().unwrap() = Some(SubResourceKind::StatefulSet);

        let err = delete_cluster_resources(&harness.ctx, "default", "cache1")
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("redis-slave-cache1"));
        assert_eq!(harness.api.calls().len(), 3);
    }
}
