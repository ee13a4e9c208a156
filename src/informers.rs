// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch loops feeding the reflector caches and the work queue.
//!
//! One reflector runs per watched kind. Every object a watch touches (applied
//! or deleted) is mapped to the key of the `RedisCluster` it belongs to and
//! enqueued. Sub-resources are watched through the operator's own label only,
//! so unrelated objects never reach the cache.
//!
//! A separate resync loop periodically enqueues every cached cluster, which
//! repairs drift the watches could not see (e.g. a Sentinel failover).

use crate::constants::{API_GROUP_VERSION, KIND_REDIS_CLUSTER};
use crate::context::Stores;
use crate::crd::RedisCluster;
use crate::labels::OPERATOR_LABEL;
use crate::queue::WorkQueue;
use crate::reconcilers::ObjectKey;
use crate::shutdown::ShutdownSignal;
use anyhow::{Context as _, Result};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};
use kube::runtime::reflector::{self, store::Writer, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Key of the cluster owning `obj`.
///
/// The controller owner reference wins; objects created by intermediate
/// controllers (pods of the sentinel deployment) fall back to the operator label.
#[must_use]
pub fn owning_cluster_key<K: Resource>(obj: &K) -> Option<ObjectKey> {
    let namespace = obj.namespace()?;

    let owner = obj
        .owner_references()
        .iter()
        .find(|o| o.kind == KIND_REDIS_CLUSTER && o.api_version == API_GROUP_VERSION)
        .map(|o| o.name.clone());

    owner
        .or_else(|| obj.labels().get(OPERATOR_LABEL).cloned())
        .map(|name| ObjectKey::new(namespace, name))
}

/// Running watch loops and the caches they populate.
pub struct Informers {
    pub stores: Stores,
    pub handles: Vec<JoinHandle<()>>,
}

impl Informers {
    /// Start one watch loop per kind.
    ///
    /// `namespace` restricts every watch to one namespace; `None` watches all.
    #[must_use]
    pub fn start(
        client: &Client,
        namespace: Option<&str>,
        queue: &Arc<WorkQueue<ObjectKey>>,
        shutdown: &ShutdownSignal,
    ) -> Self {
        let all = watcher::Config::default();
        let owned = watcher::Config::default().labels(OPERATOR_LABEL);
        let mut handles = Vec::new();

        let (redis_clusters, writer) = reflector::store::<RedisCluster>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            all.clone(),
            writer,
            queue,
            shutdown,
            |c: &RedisCluster| ObjectKey::for_object(c),
        ));

        let (pods, writer) = reflector::store::<Pod>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            owned.clone(),
            writer,
            queue,
            shutdown,
            owning_cluster_key,
        ));

        let (deployments, writer) = reflector::store::<Deployment>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            owned.clone(),
            writer,
            queue,
            shutdown,
            owning_cluster_key,
        ));

        let (stateful_sets, writer) = reflector::store::<StatefulSet>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            owned.clone(),
            writer,
            queue,
            shutdown,
            owning_cluster_key,
        ));

        let (services, writer) = reflector::store::<Service>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            owned.clone(),
            writer,
            queue,
            shutdown,
            owning_cluster_key,
        ));

        let (endpoints, writer) = reflector::store::<Endpoints>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            owned,
            writer,
            queue,
            shutdown,
            owning_cluster_key,
        ));

        // User-managed sentinel config maps carry no operator label.
        let (config_maps, writer) = reflector::store::<ConfigMap>();
        handles.push(spawn_watch(
            scoped_api(client, namespace),
            all,
            writer,
            queue,
            shutdown,
            owning_cluster_key,
        ));

        Self {
            stores: Stores {
                redis_clusters,
                pods,
                deployments,
                stateful_sets,
                services,
                endpoints,
                config_maps,
            },
            handles,
        }
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn spawn_watch<K, F>(
    api: Api<K>,
    config: watcher::Config,
    writer: Writer<K>,
    queue: &Arc<WorkQueue<ObjectKey>>,
    shutdown: &ShutdownSignal,
    key_of: F,
) -> JoinHandle<()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&K) -> Option<ObjectKey> + Send + 'static,
{
    let queue = Arc::clone(queue);
    let shutdown = shutdown.clone();
    let kind = K::kind(&()).to_string();

    tokio::spawn(async move {
        let stream = reflector::reflector(writer, watcher(api, config))
            .default_backoff()
            .touched_objects();
        let mut stream = std::pin::pin!(stream);
        info!(kind = %kind, "Watch started");

        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                event = stream.next() => match event {
                    Some(Ok(obj)) => {
                        if let Some(key) = key_of(&obj) {
                            debug!(kind = %kind, name = %obj.name_any(), key = %key, "Enqueueing from watch event");
                            queue.add(key);
                        }
                    }
                    Some(Err(e)) => warn!(kind = %kind, error = %e, "Watch error, backing off"),
                    None => {
                        warn!(kind = %kind, "Watch stream ended");
                        break;
                    }
                },
            }
        }

        info!(kind = %kind, "Watch stopped");
    })
}

/// Block until every cache has completed its initial list.
///
/// # Errors
///
/// Returns an error if a watch loop exited before its cache became ready.
pub async fn wait_for_caches(stores: &Stores) -> Result<()> {
    wait_ready(&stores.redis_clusters, "RedisCluster").await?;
    wait_ready(&stores.pods, "Pod").await?;
    wait_ready(&stores.deployments, "Deployment").await?;
    wait_ready(&stores.stateful_sets, "StatefulSet").await?;
    wait_ready(&stores.services, "Service").await?;
    wait_ready(&stores.endpoints, "Endpoints").await?;
    wait_ready(&stores.config_maps, "ConfigMap").await?;
    info!("All caches synced");
    Ok(())
}

async fn wait_ready<K>(store: &Store<K>, kind: &str) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store
        .wait_until_ready()
        .await
        .with_context(|| format!("{kind} watch stopped before its cache synced"))
}

/// Enqueue every cached cluster each `interval` until shutdown.
pub async fn run_resync(
    clusters: Store<RedisCluster>,
    queue: Arc<WorkQueue<ObjectKey>>,
    interval: Duration,
    shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; the initial list already enqueued everything.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.wait() => break,
            _ = ticker.tick() => {
                let cached = clusters.state();
                debug!(count = cached.len(), "Periodic resync");
                for cluster in cached {
                    if let Some(key) = ObjectKey::for_object(cluster.as_ref()) {
                        queue.add(key);
                    }
                }
            }
        }
    }
}
