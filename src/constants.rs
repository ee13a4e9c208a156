// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Redis Sentinel operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `RedisCluster` CRD
pub const API_GROUP: &str = "redis.operator.io";

/// API version for the `RedisCluster` CRD
pub const API_VERSION: &str = "v1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "redis.operator.io/v1";

/// Kind name for `RedisCluster` resource
pub const KIND_REDIS_CLUSTER: &str = "RedisCluster";

// ============================================================================
// Redis Protocol Constants
// ============================================================================

/// Port served by every Redis data container (seed master and slaves)
pub const REDIS_PORT: u16 = 6379;

/// Port served by Sentinel processes
pub const SENTINEL_PORT: u16 = 26379;

/// Service port name for Redis data traffic
pub const REDIS_PORT_NAME: &str = "redis";

/// Service port name for Sentinel traffic
pub const SENTINEL_PORT_NAME: &str = "sentinel";

// ============================================================================
// Derived Resource Names
// ============================================================================

/// Prefix for the seed master pod, the master service and the master endpoints
pub const MASTER_NAME_PREFIX: &str = "redis-master";

/// Prefix for the sentinel service and the sentinel deployment
pub const SENTINEL_NAME_PREFIX: &str = "redis-sentinel";

/// Prefix for the slave stateful set
pub const SLAVE_NAME_PREFIX: &str = "redis-slave";

/// Prefix for the generated sentinel config map
pub const SENTINEL_CONFIG_NAME_PREFIX: &str = "sentinel-config";

/// Name of the volume claim template attached to every slave
pub const SLAVE_STORAGE_VOLUME: &str = "slave-persistent-storage";

/// Volume holding the sentinel config map projection
pub const SENTINEL_CONFIG_VOLUME: &str = "sentinel-config";

/// Writable volume sentinels rewrite their config into
pub const DATA_VOLUME: &str = "data";

/// Mount path of configuration projections
pub const CONFIG_MOUNT_PATH: &str = "/usr/local/etc/redis";

/// Redis working directory inside every container
pub const DATA_MOUNT_PATH: &str = "/data";

/// Key of the sentinel configuration file inside the config map
pub const SENTINEL_CONFIG_FILE: &str = "sentinel.conf";

// ============================================================================
// Container Names
// ============================================================================

/// Container name of the seed master pod
pub const CONTAINER_MASTER: &str = "redis-master";

/// Container name inside the sentinel deployment
pub const CONTAINER_SENTINEL: &str = "redis-sentinel";

/// Init container that copies the read-only sentinel config into the data volume
pub const CONTAINER_SENTINEL_CONFIG_COPY: &str = "copy-sentinel-config";

/// Container name inside the slave stateful set
pub const CONTAINER_SLAVE: &str = "redis-slave";

// ============================================================================
// Spec Defaults
// ============================================================================

/// Image repository used when `spec.baseImage` is empty
pub const DEFAULT_BASE_IMAGE: &str = "redis";

/// Image tag used when `spec.version` is empty
pub const DEFAULT_VERSION: &str = "4.0-alpine";

/// Slave volume size used when `spec.pod.storage` is absent
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

// ============================================================================
// Scheduling Constants
// ============================================================================

/// Topology key used for preferred pod anti-affinity
pub const TOPOLOGY_KEY_HOSTNAME: &str = "kubernetes.io/hostname";

/// Weight of the preferred anti-affinity term
pub const ANTI_AFFINITY_WEIGHT: i32 = 100;

/// Seconds before the first readiness probe of a Redis container
pub const READINESS_INITIAL_DELAY_SECS: i32 = 5;

/// Seconds between readiness probes of a Redis container
pub const READINESS_PERIOD_SECS: i32 = 5;

// ============================================================================
// Sentinel Configuration
// ============================================================================

/// Milliseconds without a reply before a sentinel marks the master down
pub const SENTINEL_DOWN_AFTER_MILLIS: u64 = 30_000;

/// Number of slaves reconfigured in parallel after a failover
pub const SENTINEL_PARALLEL_SYNCS: u32 = 1;

/// Failover timeout in milliseconds
pub const SENTINEL_FAILOVER_TIMEOUT_MILLIS: u64 = 180_000;

/// Connection timeout when dialing the sentinel service (seconds)
pub const SENTINEL_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Per-command timeout for sentinel queries (seconds)
pub const SENTINEL_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Connection-level reconnect attempts for a sentinel query
pub const SENTINEL_MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ============================================================================
// Status Constants
// ============================================================================

/// Maximum number of entries kept in `status.conditions`
pub const MAX_CONDITIONS: usize = 10;

// ============================================================================
// Seed Master Polling
// ============================================================================

/// Number of readiness checks before giving up on the seed master pod
pub const SEED_POLL_STEPS: u32 = 10;

/// Delay before the second readiness check (milliseconds)
pub const SEED_POLL_INITIAL_MILLIS: u64 = 500;

/// Growth factor between readiness checks
pub const SEED_POLL_FACTOR: f64 = 1.5;

/// Upper bound on the delay between readiness checks (seconds)
pub const SEED_POLL_MAX_INTERVAL_SECS: u64 = 10;

// ============================================================================
// Work Queue Constants
// ============================================================================

/// Base delay for the first rate-limited requeue of a key (milliseconds)
pub const QUEUE_BASE_DELAY_MILLIS: u64 = 5;

/// Maximum delay for a rate-limited requeue (seconds)
pub const QUEUE_MAX_DELAY_SECS: u64 = 1000;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Default interval between full resyncs of every cached cluster (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default number of worker loops draining the queue
pub const DEFAULT_WORKERS: usize = 1;

/// Default port for the metrics and health endpoint
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Number of Tokio worker threads for the operator runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Field manager reported on every write
pub const FIELD_MANAGER: &str = "redis-sentinel-operator";
