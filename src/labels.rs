// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label constants stamped on every resource created by the operator.
//!
//! Selectors for services, deployments and stateful sets are built from these keys,
//! so changing a value here re-targets live workloads.

// ============================================================================
// Operator Labels
// ============================================================================

/// Carries the owning `RedisCluster` name
pub const OPERATOR_LABEL: &str = "redis_operator";

/// Application label shared by all generated pods
pub const APP_LABEL: &str = "app";

/// Value of [`APP_LABEL`]
pub const APP_REDIS: &str = "redis";

/// Distinguishes master, sentinel and slave pods
pub const ROLE_LABEL: &str = "role";

/// Prefix reserved for operator labels; user pod labels may not use it
pub const RESERVED_LABEL_PREFIX: &str = "redis_";

// ============================================================================
// Role Values
// ============================================================================

/// Role of the seed master pod
pub const ROLE_MASTER: &str = "master";

/// Role of sentinel pods
pub const ROLE_SENTINEL: &str = "sentinel";

/// Role of slave pods
pub const ROLE_SLAVE: &str = "slave";

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for [`K8S_MANAGED_BY`]
pub const MANAGED_BY_OPERATOR: &str = "redis-sentinel-operator";
