// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The reconciliation engine: work queue consumers and per-key state.
//!
//! Watch loops enqueue [`ObjectKey`]s; each worker takes one key at a time,
//! runs [`Engine::process_key`], and acknowledges it. A failed key is re-added
//! with per-key exponential backoff, a successful one has its backoff reset.
//!
//! # Per-Key State
//!
//! The engine owns one [`ClusterState`] per key. A worker checks the state out
//! of the map for the duration of a pass and checks it back in afterwards.
//! Since the queue never hands the same key to two workers at once, the state
//! of a key is never touched concurrently.

use crate::constants::KIND_REDIS_CLUSTER;
use crate::context::Context;
use crate::crd::{ClusterPhase, ConditionType, RedisCluster};
use crate::errors::aggregate;
use crate::metrics::{
    record_reconciliation_error, record_reconciliation_requeue, record_reconciliation_success,
    set_queue_depth,
};
use crate::queue::WorkQueue;
use crate::reconcilers::rediscluster::{delete_cluster_resources, reconcile_redis_cluster};
use crate::reconcilers::state::ClusterState;
use crate::reconcilers::status::report_phase;
use anyhow::Result;
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Queue key identifying one `RedisCluster`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object, `None` for cluster-scoped ones.
    #[must_use]
    pub fn for_object<K: ResourceExt>(obj: &K) -> Option<Self> {
        Some(Self::new(obj.namespace()?, obj.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Queue consumer driving every `RedisCluster` towards its declared topology.
pub struct Engine {
    ctx: Arc<Context>,
    queue: Arc<WorkQueue<ObjectKey>>,
    states: Mutex<HashMap<ObjectKey, ClusterState>>,
}

impl Engine {
    #[must_use]
    pub fn new(ctx: Arc<Context>, queue: Arc<WorkQueue<ObjectKey>>) -> Self {
        Self {
            ctx,
            queue,
            states: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Schedule `key` for reconciliation. A key already pending is not duplicated.
    pub fn enqueue(&self, key: ObjectKey) {
        self.queue.add(key);
        set_queue_depth(self.queue.len());
    }

    /// Drain the queue until it shuts down.
    pub async fn run_worker(self: Arc<Self>, worker_id: usize) {
        info!(worker = worker_id, "Worker started");

        while let Some(key) = self.queue.get().await {
            set_queue_depth(self.queue.len());
            let start = Instant::now();

            match self.process_key(&key).await {
                Ok(()) => {
                    record_reconciliation_success(KIND_REDIS_CLUSTER, start.elapsed());
                    self.queue.forget(&key);
                }
                Err(e) => {
                    error!(
                        worker = worker_id,
                        key = %key,
                        requeues = self.queue.num_requeues(&key),
                        error = %format!("{e:#}"),
                        "Reconciliation failed, requeueing with backoff"
                    );
                    record_reconciliation_error(KIND_REDIS_CLUSTER, start.elapsed());
                    record_reconciliation_requeue(KIND_REDIS_CLUSTER, "error");
                    self.queue.add_rate_limited(key.clone());
                }
            }

            self.queue.done(&key);
        }

        info!(worker = worker_id, "Worker stopped");
    }

    /// Run one pass for `key`.
    ///
    /// # Errors
    ///
    /// Returns the reconcile error, the status write error, or both aggregated.
    pub async fn process_key(&self, key: &ObjectKey) -> Result<()> {
        let Some(cached) = self.ctx.stores.get_redis_cluster(&key.name, &key.namespace) else {
            info!(key = %key, "RedisCluster not found, removing sub-resources");
            self.drop_state(key);
            return delete_cluster_resources(&self.ctx, &key.namespace, &key.name).await;
        };
        // Work on a private copy; the cached instance is shared with the reflector.
        let observed: RedisCluster = (*cached).clone();

        if observed.metadata.deletion_timestamp.is_some() {
            return self.stop_cluster(key, &observed).await;
        }

        if observed.spec.paused {
            debug!(key = %key, "RedisCluster is paused, skipping");
            return Ok(());
        }

        if let Err(e) = observed.spec.validate() {
            warn!(key = %key, error = %e, "Rejecting invalid RedisCluster spec");
            // A cluster never reconciled keeps no state, so its first valid pass reports Creating.
            let tracked = self.states().contains_key(key);
            let mut state = self.checkout_or_new(key, &observed);
            let status = report_phase(&self.ctx, &mut state, ClusterPhase::Failed).await;
            if tracked {
                self.checkin(key.clone(), state);
            }
            return aggregate(Err(e.into()), status);
        }

        match self.checkout(key) {
            None => self.first_pass(key, &observed).await,
            Some(state) => self.next_pass(key, &observed, state).await,
        }
    }

    async fn first_pass(&self, key: &ObjectKey, observed: &RedisCluster) -> Result<()> {
        info!(key = %key, "Reconciling new RedisCluster");
        let mut state = ClusterState::new(observed);

        // Without a recorded Creating phase the next pass starts over from here.
        report_phase(&self.ctx, &mut state, ClusterPhase::Creating).await?;

        let result = reconcile_redis_cluster(&self.ctx, &mut state).await;
        let phase = if result.is_ok() {
            ClusterPhase::Running
        } else {
            ClusterPhase::Failed
        };
        let status = report_phase(&self.ctx, &mut state, phase).await;

        self.checkin(key.clone(), state);
        aggregate(result, status)
    }

    async fn next_pass(
        &self,
        key: &ObjectKey,
        observed: &RedisCluster,
        mut state: ClusterState,
    ) -> Result<()> {
        state.refresh(observed);

        let result = reconcile_redis_cluster(&self.ctx, &mut state).await;
        let phase = if result.is_ok() {
            state.status_mut().mark(ConditionType::Ready);
            ClusterPhase::Running
        } else {
            ClusterPhase::Failed
        };
        let status = report_phase(&self.ctx, &mut state, phase).await;

        self.checkin(key.clone(), state);
        aggregate(result, status)
    }

    /// Report `Stopping` and clean up a cluster that is being deleted.
    async fn stop_cluster(&self, key: &ObjectKey, observed: &RedisCluster) -> Result<()> {
        info!(key = %key, "RedisCluster is being deleted");
        let mut state = self.checkout_or_new(key, observed);

        if let Err(e) = report_phase(&self.ctx, &mut state, ClusterPhase::Stopping).await {
            debug!(key = %key, error = %format!("{e:#}"), "Could not report Stopping phase");
        }

        delete_cluster_resources(&self.ctx, &key.namespace, &key.name).await
    }

    fn states(&self) -> MutexGuard<'_, HashMap<ObjectKey, ClusterState>> {
        self.states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn checkout(&self, key: &ObjectKey) -> Option<ClusterState> {
        self.states().remove(key)
    }

    fn checkout_or_new(&self, key: &ObjectKey, observed: &RedisCluster) -> ClusterState {
        match self.checkout(key) {
            Some(mut state) => {
                state.refresh(observed);
                state
            }
            None => ClusterState::new(observed),
        }
    }

    fn checkin(&self, key: ObjectKey, state: ClusterState) {
        self.states().insert(key, state);
    }

    fn drop_state(&self, key: &ObjectKey) {
        if self.states().remove(key).is_some() {
            debug!(key = %key, "Dropped reconciliation state");
        }
    }

    /// Snapshot of a key's state, for inspection.
    #[must_use]
    pub fn state(&self, key: &ObjectKey) -> Option<ClusterState> {
        self.states().get(key).cloned()
    }

    /// Install state for a key, replacing any existing entry.
    pub fn set_state(&self, key: ObjectKey, state: ClusterState) {
        self.checkin(key, state);
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
