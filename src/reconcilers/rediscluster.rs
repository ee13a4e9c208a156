// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! One reconcile pass for a `RedisCluster`.
//!
//! # Seed State Machine
//!
//! ```text
//!             seed pod ready
//!  SEEDING ─────────────────▶ SEEDED ──┐ master and replicas resolved
//!     ▲                         │  ◀───┘
//!     └─────────────────────────┘
//!      lookup failed or zero replicas
//! ```
//!
//! - **Seeding**: a standalone master pod is created and polled until it is
//!   Ready with an IP. That IP is this pass's master address.
//! - **Seeded**: Sentinel is asked for the master and its replica count. On
//!   success the seed pod is removed; on failure the state falls back to
//!   seeding for the next pass and this pass stops without touching anything.
//!
//! With a master address known, the remaining sub-resources are converged in
//! a fixed order. The first failing step aborts the pass.

use crate::context::{is_pod_ready, pod_ip, Context};
use crate::crd::{default_sentinel_config_map, ConditionType, RedisCluster};
use crate::errors::ApiError;
use crate::metrics::record_seed_regression;
use crate::redis_resources::{
    build_master_endpoints, build_master_service, build_seed_master_pod,
    build_sentinel_config_map, build_sentinel_deployment, build_sentinel_service,
    build_slave_statefulset, master_pod_name, master_service_name, monitored_name,
    sentinel_deployment_name, sentinel_service_name, slave_statefulset_name,
    uses_generated_sentinel_config,
};
use crate::reconcilers::resources::{
    apply_desired, delete_ignore_not_found, ApplyOutcome, SubResource, SubResourceKind,
};
use crate::reconcilers::retry::seed_poll_backoff;
use crate::reconcilers::state::ClusterState;
use crate::sentinel::{DiscoveryError, SentinelEndpoint};
use anyhow::{Context as _, Result};
use kube::ResourceExt;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures of the seed master bootstrap.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("seed master pod {namespace}/{name} not ready after {attempts} checks")]
    NotReady {
        namespace: String,
        name: String,
        attempts: u32,
    },

    #[error("shutdown requested while waiting for seed master pod {namespace}/{name}")]
    Interrupted { namespace: String, name: String },
}

/// Run one reconcile pass over `state`.
///
/// # Errors
///
/// Returns the first failing step. A master-discovery failure also resets the
/// state to seeding before returning.
pub async fn reconcile_redis_cluster(ctx: &Context, state: &mut ClusterState) -> Result<()> {
    let namespace = state.cluster.namespace().unwrap_or_default();
    let name = state.cluster.name_any();

    let master_ip = if state.seed_master_process_complete {
        discover_master(ctx, state, &namespace, &name).await?
    } else {
        seed_master(ctx, state, &namespace, &name).await?
    };
    debug!(namespace = %namespace, name = %name, master = %master_ip, "Resolved master address");
    state.master_address = Some(master_ip.clone());

    let cluster = state.cluster.clone();

    apply_desired(
        ctx,
        &namespace,
        SubResource::Endpoints(build_master_endpoints(&cluster, &master_ip)),
    )
    .await
    .context("failed to reconcile master endpoints")?;

    apply_desired(
        ctx,
        &namespace,
        SubResource::Service(build_master_service(&cluster)),
    )
    .await
    .context("failed to reconcile master service")?;

    reconcile_sentinel_config(ctx, &cluster, &namespace, &name).await?;

    apply_desired(
        ctx,
        &namespace,
        SubResource::Service(build_sentinel_service(&cluster)),
    )
    .await
    .context("failed to reconcile sentinel service")?;

    let live_sentinels = ctx
        .stores
        .get_deployment(&sentinel_deployment_name(&name), &namespace)
        .and_then(|d| d.spec.as_ref().and_then(|s| s.replicas));
    let outcome = apply_desired(
        ctx,
        &namespace,
        SubResource::Deployment(build_sentinel_deployment(&cluster)),
    )
    .await
    .context("failed to reconcile sentinel deployment")?;
    if let Some(condition) = scaling_condition(
        outcome,
        live_sentinels,
        cluster.spec.sentinels.replicas,
        (ConditionType::AddingSentinel, ConditionType::RemovingSentinel),
    ) {
        state.status_mut().mark(condition);
    }

    let live_slaves = ctx
        .stores
        .get_stateful_set(&slave_statefulset_name(&name), &namespace)
        .and_then(|s| s.spec.as_ref().and_then(|s| s.replicas));
    let outcome = apply_desired(
        ctx,
        &namespace,
        SubResource::StatefulSet(build_slave_statefulset(&cluster)),
    )
    .await
    .context("failed to reconcile slave statefulset")?;
    if let Some(condition) = scaling_condition(
        outcome,
        live_slaves,
        cluster.spec.slaves.replicas,
        (ConditionType::AddingSlave, ConditionType::RemovingSlave),
    ) {
        state.status_mut().mark(condition);
    }

    Ok(())
}

/// Condition describing a replica change, if there was one.
fn scaling_condition(
    outcome: ApplyOutcome,
    live: Option<i32>,
    desired: i32,
    (adding, removing): (ConditionType, ConditionType),
) -> Option<ConditionType> {
    if outcome == ApplyOutcome::Created {
        return Some(adding);
    }
    match desired.cmp(&live?) {
        Ordering::Greater => Some(adding),
        Ordering::Less => Some(removing),
        Ordering::Equal => None,
    }
}

async fn reconcile_sentinel_config(
    ctx: &Context,
    cluster: &RedisCluster,
    namespace: &str,
    name: &str,
) -> Result<()> {
    if uses_generated_sentinel_config(cluster) {
        apply_desired(
            ctx,
            namespace,
            SubResource::ConfigMap(build_sentinel_config_map(cluster)),
        )
        .await
        .context("failed to reconcile sentinel config map")?;
        return Ok(());
    }

    let config_map = &cluster.spec.sentinels.config_map_ref;
    if ctx.stores.get_config_map(config_map, namespace).is_none() {
        return Err(ApiError::NotFound {
            kind: SubResourceKind::ConfigMap.to_string(),
            name: config_map.clone(),
        })
        .with_context(|| format!("sentinel config map referenced by {namespace}/{name} is missing"));
    }
    Ok(())
}

/// Bring up the standalone seed master and wait for its address.
async fn seed_master(
    ctx: &Context,
    state: &mut ClusterState,
    namespace: &str,
    name: &str,
) -> Result<String> {
    let pod_name = master_pod_name(name);

    apply_desired(
        ctx,
        namespace,
        SubResource::Pod(build_seed_master_pod(&state.cluster)),
    )
    .await
    .context("failed to create seed master pod")?;
    state.status_mut().mark(ConditionType::AddingSeedMaster);

    info!(namespace = %namespace, name = %name, pod = %pod_name, "Waiting for seed master");
    let ip = wait_for_seed_master(ctx, namespace, &pod_name).await?;

    state.seed_master_process_complete = true;
    info!(namespace = %namespace, name = %name, ip = %ip, "Seed master ready");
    Ok(ip)
}

/// Poll the pod cache until the seed pod is Ready with an IP.
///
/// Bounded by the configured number of checks and interrupted by shutdown.
async fn wait_for_seed_master(
    ctx: &Context,
    namespace: &str,
    pod_name: &str,
) -> Result<String, SeedError> {
    let steps = ctx.settings.seed_poll_steps.max(1);
    let mut backoff = seed_poll_backoff(ctx.settings.seed_poll_initial);

    for attempt in 1..=steps {
        if let Some(pod) = ctx.stores.get_pod(pod_name, namespace) {
            if is_pod_ready(&pod) {
                if let Some(ip) = pod_ip(&pod) {
                    return Ok(ip.to_string());
                }
            }
        }

        if attempt == steps {
            break;
        }

        let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
        debug!(namespace = %namespace, pod = %pod_name, attempt, retry_after = ?delay, "Seed master not ready yet");
        tokio::select! {
            biased;
            () = ctx.shutdown.wait() => {
                return Err(SeedError::Interrupted {
                    namespace: namespace.to_string(),
                    name: pod_name.to_string(),
                });
            }
            () = tokio::time::sleep(delay) => {}
        }
    }

    Err(SeedError::NotReady {
        namespace: namespace.to_string(),
        name: pod_name.to_string(),
        attempts: steps,
    })
}

/// Ask Sentinel for the master; fall back to seeding if it cannot vouch for one.
async fn discover_master(
    ctx: &Context,
    state: &mut ClusterState,
    namespace: &str,
    name: &str,
) -> Result<String> {
    let endpoint = SentinelEndpoint::for_cluster(&state.cluster);
    let monitored = monitored_name(&state.cluster);

    let address = match query_sentinel(ctx, &endpoint, &monitored).await {
        Ok(address) => address,
        Err(e) => {
            warn!(
                namespace = %namespace,
                name = %name,
                endpoint = %endpoint,
                error = %e,
                "Sentinel cannot vouch for a master, falling back to seeding"
            );
            state.seed_master_process_complete = false;
            record_seed_regression(namespace, name);
            return Err(e).context("master discovery failed");
        }
    };

    if let Err(e) =
        delete_ignore_not_found(ctx, namespace, SubResourceKind::Pod, &master_pod_name(name)).await
    {
        state.seed_master_deleted = false;
        return Err(e).context("failed to delete seed master pod");
    }
    if !state.seed_master_deleted {
        state.status_mut().mark(ConditionType::RemovingSeedMaster);
        state.seed_master_deleted = true;
    }

    Ok(address)
}

async fn query_sentinel(
    ctx: &Context,
    endpoint: &SentinelEndpoint,
    monitored: &str,
) -> Result<String, DiscoveryError> {
    let address = ctx.discovery.resolve_master(endpoint, monitored).await?;
    let replicas = ctx.discovery.count_replicas(endpoint, monitored).await?;
    if replicas == 0 {
        return Err(DiscoveryError::NoReplicas {
            name: monitored.to_string(),
        });
    }
    Ok(address)
}

/// Explicitly delete every derived sub-resource of a cluster.
///
/// Owner references already let the garbage collector do this; deleting by
/// derived name covers objects whose owner reference was lost. Not-found is
/// ignored per object, any other error aborts.
///
/// # Errors
///
/// Returns the first delete that failed for a reason other than not-found.
pub async fn delete_cluster_resources(ctx: &Context, namespace: &str, name: &str) -> Result<()> {
    let targets = [
        (SubResourceKind::Pod, master_pod_name(name)),
        (SubResourceKind::Deployment, sentinel_deployment_name(name)),
        (SubResourceKind::StatefulSet, slave_statefulset_name(name)),
        (SubResourceKind::Service, sentinel_service_name(name)),
        (SubResourceKind::Service, master_service_name(name)),
        (SubResourceKind::Endpoints, master_service_name(name)),
        (SubResourceKind::ConfigMap, default_sentinel_config_map(name)),
    ];

    for (kind, resource_name) in targets {
        delete_ignore_not_found(ctx, namespace, kind, &resource_name)
            .await
            .with_context(|| format!("failed to delete {kind} {namespace}/{resource_name}"))?;
    }

    info!(namespace = %namespace, name = %name, "Deleted cluster sub-resources");
    Ok(())
}

#[cfg(test)]
#[path = "rediscluster_tests.rs"]
mod rediscluster_tests;
