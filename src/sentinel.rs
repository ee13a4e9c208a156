// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Master discovery through the Sentinel quorum.
//!
//! Once the seed master has been handed over, the operator never trusts its
//! own idea of where the master lives. Each pass asks Sentinel instead:
//!
//! - `SENTINEL get-master-addr-by-name <name>` yields the current master address
//! - `SENTINEL slaves <name>` lists attached replicas; zero means the topology
//!   has not converged and the answer is not yet credible
//!
//! Retries here are connection-level only. Whether a failed lookup sends the
//! cluster back to seeding is decided by the reconciler.

use crate::constants::{
    SENTINEL_COMMAND_TIMEOUT_SECS, SENTINEL_CONNECT_TIMEOUT_SECS, SENTINEL_MAX_RECONNECT_ATTEMPTS,
    SENTINEL_PORT,
};
use crate::crd::RedisCluster;
use crate::redis_resources::sentinel_service_name;
use async_trait::async_trait;
use fred::prelude::*;
use fred::types::config::ReconnectPolicy;
use kube::ResourceExt;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Delay between connection-level reconnect attempts (milliseconds)
const RECONNECT_DELAY_MILLIS: u32 = 1000;

/// Errors that can occur while querying Sentinel.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to connect to sentinel at {endpoint}: {source}")]
    Connection {
        endpoint: SentinelEndpoint,
        #[source]
        source: fred::error::Error,
    },

    #[error("sentinel command failed: {0}")]
    Command(#[from] fred::error::Error),

    #[error("sentinel has no master registered under '{name}'")]
    NoMaster { name: String },

    #[error("sentinel reports no replicas attached to '{name}'")]
    NoReplicas { name: String },

    #[error("malformed sentinel reply: {0}")]
    MalformedReply(String),
}

/// Address of the sentinel service of one cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentinelEndpoint {
    pub host: String,
    pub port: u16,
}

impl SentinelEndpoint {
    /// Sentinel service endpoint for a cluster, resolved through cluster DNS.
    #[must_use]
    pub fn for_cluster(cluster: &RedisCluster) -> Self {
        let namespace = cluster.namespace().unwrap_or_default();
        Self {
            host: format!("{}.{namespace}.svc", sentinel_service_name(&cluster.name_any())),
            port: SENTINEL_PORT,
        }
    }
}

impl fmt::Display for SentinelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Master discovery capability consumed by the reconciler.
#[async_trait]
pub trait MasterDiscovery: Send + Sync {
    /// Current master address for `monitored_name`.
    async fn resolve_master(
        &self,
        endpoint: &SentinelEndpoint,
        monitored_name: &str,
    ) -> Result<String, DiscoveryError>;

    /// Number of replicas Sentinel knows to be attached to `monitored_name`.
    async fn count_replicas(
        &self,
        endpoint: &SentinelEndpoint,
        monitored_name: &str,
    ) -> Result<usize, DiscoveryError>;
}

/// [`MasterDiscovery`] speaking the Sentinel protocol through `fred`.
///
/// A short-lived connection is opened per query; sentinel pods come and go
/// with the deployment, so pooled connections would mostly be stale.
#[derive(Clone, Debug)]
pub struct SentinelDiscovery {
    connection_timeout: Duration,
    command_timeout: Duration,
    max_reconnect_attempts: u32,
}

impl Default for SentinelDiscovery {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(SENTINEL_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(SENTINEL_COMMAND_TIMEOUT_SECS),
            max_reconnect_attempts: SENTINEL_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl SentinelDiscovery {
    async fn connect(&self, endpoint: &SentinelEndpoint) -> Result<Client, DiscoveryError> {
        let config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(endpoint.host.as_str(), endpoint.port),
            },
            ..Default::default()
        };

        let connection_timeout = self.connection_timeout;
        let command_timeout = self.command_timeout;
        let client = Builder::from_config(config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = connection_timeout;
            })
            .set_policy(ReconnectPolicy::new_constant(
                self.max_reconnect_attempts,
                RECONNECT_DELAY_MILLIS,
            ))
            .build()
            .map_err(|source| DiscoveryError::Connection {
                endpoint: endpoint.clone(),
                source,
            })?;

        client
            .init()
            .await
            .map_err(|source| DiscoveryError::Connection {
                endpoint: endpoint.clone(),
                source,
            })?;

        Ok(client)
    }

    async fn sentinel_command(
        &self,
        endpoint: &SentinelEndpoint,
        args: Vec<&str>,
    ) -> Result<Value, DiscoveryError> {
        let client = self.connect(endpoint).await?;
        let reply = client.custom(fred::cmd!("SENTINEL"), args).await;
        if let Err(e) = client.quit().await {
            debug!(endpoint = %endpoint, error = %e, "Failed to close sentinel connection");
        }
        Ok(reply?)
    }
}

#[async_trait]
impl MasterDiscovery for SentinelDiscovery {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn resolve_master(
        &self,
        endpoint: &SentinelEndpoint,
        monitored_name: &str,
    ) -> Result<String, DiscoveryError> {
        let reply = self
            .sentinel_command(endpoint, vec!["get-master-addr-by-name", monitored_name])
            .await?;
        parse_master_addr(reply, monitored_name)
    }

    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn count_replicas(
        &self,
        endpoint: &SentinelEndpoint,
        monitored_name: &str,
    ) -> Result<usize, DiscoveryError> {
        let reply = self
            .sentinel_command(endpoint, vec!["slaves", monitored_name])
            .await?;
        count_replica_entries(reply)
    }
}

/// Extract the master IP from a `get-master-addr-by-name` reply (`[ip, port]`).
///
/// # Errors
///
/// [`DiscoveryError::NoMaster`] for a nil reply, [`DiscoveryError::MalformedReply`]
/// for anything that is not a non-empty address array.
pub fn parse_master_addr(reply: Value, monitored_name: &str) -> Result<String, DiscoveryError> {
    match reply {
        Value::Null => Err(DiscoveryError::NoMaster {
            name: monitored_name.to_string(),
        }),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_string)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| {
                DiscoveryError::MalformedReply(format!(
                    "expected [ip, port] for '{monitored_name}', got {items:?}"
                ))
            }),
        other => Err(DiscoveryError::MalformedReply(format!(
            "expected [ip, port] for '{monitored_name}', got {other:?}"
        ))),
    }
}

/// Count replica descriptors in a `SENTINEL slaves` reply.
///
/// # Errors
///
/// [`DiscoveryError::MalformedReply`] when the reply is not a list.
pub fn count_replica_entries(reply: Value) -> Result<usize, DiscoveryError> {
    match reply {
        Value::Null => Ok(0),
        Value::Array(items) => Ok(items.len()),
        other => Err(DiscoveryError::MalformedReply(format!(
            "expected replica list, got {other:?}"
        ))),
    }
}

#[cfg(test)]
#[path = "sentinel_tests.rs"]
mod sentinel_tests;
