// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Redis Sentinel Operator for Kubernetes
//!
//! Runs Redis master/replica topologies with Sentinel-managed failover, driven
//! by a single `RedisCluster` custom resource.
//!
//! ## Overview
//!
//! A cluster is bootstrapped from a temporary *seed master* pod. Once the
//! replica `StatefulSet` and the Sentinel `Deployment` are up, Sentinel owns
//! master election and the operator only follows it:
//!
//! 1. Create the seed master pod and wait for it to become ready
//! 2. Point the master `Endpoints` at the seed pod, create the services, the
//!    Sentinel config, the Sentinel deployment and the replica statefulset
//! 3. On later passes ask Sentinel for the current master, retarget the
//!    master `Endpoints` and delete the seed pod
//!
//! If Sentinel ever stops giving a credible answer the cluster falls back to
//! seeding.
//!
//! ## Modules
//!
//! - [`crd`] - The `RedisCluster` custom resource and its status types
//! - [`redis_resources`] - Builders for every derived Kubernetes object
//! - [`reconcilers`] - Work queue consumer, per-cluster state machine and diffing
//! - [`informers`] - Watch loops feeding the reflector caches and the queue
//! - [`sentinel`] - Master discovery over the Sentinel protocol
//! - [`cluster_api`] - Narrow write interface to the Kubernetes API
//! - [`metrics`] - Prometheus metrics and the `/metrics` endpoint
//!
//! ## Example
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
//!     ..Default::default()
//! };
//! assert!(spec.validate().is_ok());
//! ```

pub mod cluster_api;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod informers;
pub mod labels;
pub mod metrics;
pub mod queue;
pub mod reconcilers;
pub mod redis_resources;
pub mod sentinel;
pub mod shutdown;

#[cfg(test)]
mod errors_tests;
#[cfg(test)]
mod test_support;
