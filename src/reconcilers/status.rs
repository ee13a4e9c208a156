// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status reporting for `RedisCluster` resources.
//!
//! [`report_phase`] is the only writer of `status`. It sets the phase, fills
//! the member lists from the pod cache, and sends the status back to the API
//! server. The server's answer replaces the working copy so the next write
//! carries the new `resourceVersion`.
//!
//! A write whose content matches what the server already holds is skipped.
//! Steady-state passes therefore produce no status updates, and no watch
//! events that would trigger yet another pass.

use crate::context::{is_pod_ready, Context};
use crate::crd::{ClusterPhase, MembersStatus};
use crate::labels::{ROLE_SENTINEL, ROLE_SLAVE};
use crate::reconcilers::state::ClusterState;
use anyhow::{Context as _, Result};
use kube::ResourceExt;
use tracing::debug;

/// Set `phase` on the working copy and persist the status if it changed.
///
/// # Errors
///
/// Returns the status write error, including optimistic-concurrency conflicts.
pub async fn report_phase(ctx: &Context, state: &mut ClusterState, phase: ClusterPhase) -> Result<()> {
    let namespace = state.cluster.namespace().unwrap_or_default();
    let name = state.cluster.name_any();

    let sentinels = members_status(ctx, &name, &namespace, ROLE_SENTINEL);
    let slaves = members_status(ctx, &name, &namespace, ROLE_SLAVE);
    let master_address = state.master_address.clone();

    let status = state.status_mut();
    status.set_phase(phase);
    status.sentinels = sentinels;
    status.slaves = slaves;
    if master_address.is_some() {
        status.master_address = master_address;
    }

    if !state.status_changed() {
        debug!(namespace = %namespace, name = %name, phase = %phase, "Status unchanged, skipping update");
        return Ok(());
    }

    let updated = ctx
        .api
        .update_status(&state.cluster)
        .await
        .with_context(|| format!("failed to update status of {namespace}/{name} to {phase}"))?;
    state.accept_server_copy(updated);

    debug!(namespace = %namespace, name = %name, phase = %phase, "Updated status");
    Ok(())
}

/// Ready and unready pod names of one role.
#[must_use]
pub fn members_status(ctx: &Context, cluster_name: &str, namespace: &str, role: &str) -> MembersStatus {
    let mut members = MembersStatus::default();
    for pod in ctx.stores.pods_with_role(cluster_name, namespace, role) {
        if is_pod_ready(&pod) {
            members.ready.push(pod.name_any());
        } else {
            members.unready.push(pod.name_any());
        }
    }
    members
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
