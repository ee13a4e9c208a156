// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for `RedisCluster` resources.
//!
//! # Reconciliation Architecture
//!
//! 1. **Watch** - [`crate::informers`] keep the caches warm and enqueue keys
//! 2. **Dequeue** - [`engine::Engine`] workers take one key at a time
//! 3. **Reconcile** - [`rediscluster`] runs the seed state machine and
//!    converges every sub-resource through [`resources::apply_desired`]
//! 4. **Status** - [`status::report_phase`] persists phase and conditions
//!
//! # Modules
//!
//! - [`engine`] - queue consumers and per-key state ownership
//! - [`rediscluster`] - one reconcile pass and explicit cleanup
//! - [`resources`] - create-or-patch policy per sub-resource kind
//! - [`retry`] - backoff for API writes and the seed readiness poll
//! - [`state`] - in-memory seed state per cluster
//! - [`status`] - status writes with change suppression

pub mod engine;
pub mod rediscluster;
pub mod resources;
pub mod retry;
pub mod state;
pub mod status;

pub use engine::{Engine, ObjectKey};
pub use rediscluster::{delete_cluster_resources, reconcile_redis_cluster};
