// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for cluster API writes and status reporting.
//!
//! Cluster API failures are classified once, when they leave the client, so the
//! reconciler can absorb the ones that are safe to absorb (not-found on delete,
//! already-exists on create) without inspecting HTTP codes itself.

use thiserror::Error;

/// Errors returned by the cluster API write path.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The named object does not exist (HTTP 404)
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Create raced with another writer (HTTP 409, reason `AlreadyExists`)
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Optimistic concurrency failure (HTTP 409 on update)
    #[error("conflict writing {kind} '{name}': {message}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Message returned by the API server
        message: String,
    },

    /// A desired object or patch could not be serialized
    #[error("failed to serialize {kind}: {source}")]
    Serialization {
        /// Resource kind
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Any other client or server failure
    #[error("{operation} failed: {source}")]
    Kube {
        /// Operation being performed (e.g. "create Pod default/redis-master-cache1")
        operation: String,
        #[source]
        source: kube::Error,
    },
}

impl ApiError {
    /// Classify a `kube::Error` raised while operating on `kind`/`name`.
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &str, name: &str, operation: &str) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: ae.message.clone(),
            },
            _ => Self::Kube {
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// A failed reconcile pass whose status write failed as well.
///
/// Both causes are rendered so neither is lost, but the pair still counts as a
/// single failure for the queue's retry accounting.
#[derive(Error, Debug)]
#[error("reconcile failed: {reconcile:#}; status update failed: {status:#}")]
pub struct StatusAggregateError {
    pub reconcile: anyhow::Error,
    pub status: anyhow::Error,
}

/// Combine a reconcile outcome with the outcome of the status write that
/// followed it.
///
/// # Errors
///
/// Returns whichever of the two failed, or a [`StatusAggregateError`] when both did.
pub fn aggregate(
    reconcile: anyhow::Result<()>,
    status: anyhow::Result<()>,
) -> anyhow::Result<()> {
    match (reconcile, status) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(reconcile), Err(status)) => Err(StatusAggregateError { reconcile, status }.into()),
    }
}
