// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::ConditionType;
    use crate::test_support::{member_pod, test_cluster, Call, Harness};

    #[tokio::test]
    async fn test_report_phase_writes_and_adopts_server_copy() {
        let harness = Harness::new();
        let mut state = ClusterState::new(&test_cluster("cache1", "default"));

        report_phase(&harness.ctx, &mut state, ClusterPhase::Creating)
            .await
            .unwrap();

        assert_eq!(harness.api.phases(), vec![ClusterPhase::Creating]);
        assert_eq!(state.cluster.metadata.resource_version.as_deref(), Some("2"));
        assert!(!state.status_changed());
        // spec keeps its defaults
        assert_eq!(state.cluster.spec.base_image, "redis");
    }

    #[tokio::test]
    async fn test_report_phase_skips_unchanged_status() {
        let harness = Harness::new();
        let mut state = ClusterState::new(&test_cluster("cache1", "default"));

        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();
        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();

        assert_eq!(harness.api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_report_phase_writes_new_condition() {
        let harness = Harness::new();
        let mut state = ClusterState::new(&test_cluster("cache1", "default"));

        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();
        state.status_mut().mark(ConditionType::Ready);
        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();

        let calls = harness.api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            Call::UpdateStatus {
                phase: Some(ClusterPhase::Running),
                conditions: vec![ConditionType::Ready],
            }
        );
    }

    #[tokio::test]
    async fn test_report_phase_records_master_and_members() {
        let mut harness = Harness::new();
        harness.apply_pod(member_pod("cache1", "default", "redis-sentinel-cache1-a", ROLE_SENTINEL, true));
        harness.apply_pod(member_pod("cache1", "default", "redis-slave-cache1-0", ROLE_SLAVE, true));
        harness.apply_pod(member_pod("cache1", "default", "redis-slave-cache1-1", ROLE_SLAVE, false));

        let mut state = ClusterState::new(&test_cluster("cache1", "default"));
        state.master_address = Some("10.0.0.5".into());
        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();

        let status = state.cluster.status.unwrap();
        assert_eq!(status.master_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(status.sentinels.ready, vec!["redis-sentinel-cache1-a"]);
        assert_eq!(status.slaves.ready, vec!["redis-slave-cache1-0"]);
        assert_eq!(status.slaves.unready, vec!["redis-slave-cache1-1"]);
    }

    #[tokio::test]
    async fn test_report_phase_surfaces_conflict() {
        let harness = Harness::new();
        *harness.api.fail_status.lock().unwrap() = true;
        let mut state = ClusterState::new(&test_cluster("cache1", "default"));

        let err = report_phase(&harness.ctx, &mut state, ClusterPhase::Failed)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("default/cache1"));
        assert!(state.status_changed());
    }

    #[tokio::test]
    async fn test_report_phase_clears_member_that_went_unready() {
        let mut harness = Harness::new();
        harness.apply_cluster(test_cluster("cache1", "default"));
        harness.apply_pod(member_pod("cache1", "default", "redis-slave-cache1-0", ROLE_SLAVE, true));

        let mut state = ClusterState::new(&test_cluster("cache1", "default"));
        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();

        harness.apply_pod(member_pod("cache1", "default", "redis-slave-cache1-0", ROLE_SLAVE, false));
        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();

        let status = state.cluster.status.clone().unwrap();
        assert!(status.slaves.ready.is_empty());
        assert_eq!(status.slaves.unready, vec!["redis-slave-cache1-0"]);
        assert!(!state.status_changed());

        // the server copy matches, so the next pass has nothing to write
        report_phase(&harness.ctx, &mut state, ClusterPhase::Running)
            .await
            .unwrap();
        assert_eq!(harness.api.calls().len(), 2);
    }
}

