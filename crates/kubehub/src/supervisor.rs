//! One long-running watch loop per requested resource.
//!
//! Loops share nothing but the event handler and the shutdown token. Within a
//! loop, events are normalized and handed to the handler one at a time, in
//! stream order. A handler error is fatal: the token is cancelled so every
//! other loop stops between events, and the error is returned from [`WatchSupervisor::run`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::ResourceExt;
use kubewatch_core::{ConfigurationError, DeliveryError, EventHandler, EventKind, WatchEvent};
use metrics::counter;
use rustc_hash::FxHashSet;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::{PrototypeVisitor, ResourceDescriptor, ResourceRegistry, WatchedObject};
use crate::source::{Change, ChangeStream, WatchSource};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("fatal delivery failure: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("watch loop for {resource} panicked")]
    LoopAborted { resource: &'static str },
    #[error("watch loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct WatchSupervisor<S> {
    source: Arc<S>,
    handler: Arc<dyn EventHandler>,
    namespace: Option<String>,
    resources: Vec<&'static ResourceDescriptor>,
}

impl<S: WatchSource> WatchSupervisor<S> {
    /// Resolve every requested name. Any unknown name fails the whole set, so
    /// nothing is watched on a misconfiguration.
    pub fn new<N: AsRef<str>>(
        registry: &ResourceRegistry,
        names: &[N],
        namespace: Option<String>,
        source: Arc<S>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, ConfigurationError> {
        let mut resources: Vec<&'static ResourceDescriptor> = Vec::with_capacity(names.len());
        for name in names {
            let descriptor = registry.lookup(name.as_ref())?;
            if resources.iter().any(|d| d.name == descriptor.name) {
                warn!(resource = descriptor.name, "resource requested twice; watching once");
                continue;
            }
            resources.push(descriptor);
        }
        Ok(Self { source, handler, namespace, resources })
    }

    pub fn resources(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.iter().map(|d| d.name)
    }

    /// Run all loops until `shutdown` fires, a fatal delivery error occurs, or
    /// every change stream ends.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RunError> {
        let mut loops = JoinSet::new();
        for &descriptor in &self.resources {
            let fut = descriptor.dispatch(SpawnLoop {
                source: Arc::clone(&self.source),
                handler: Arc::clone(&self.handler),
                namespace: self.namespace.as_deref(),
                shutdown: shutdown.clone(),
            });
            let resource = descriptor.name;
            loops.spawn(async move {
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!(resource, sink = e.sink(), error = %e, "delivery failed; stopping all watch loops");
                        Err(RunError::Delivery(e))
                    }
                    Err(_) => {
                        error!(resource, "watch loop panicked; stopping all watch loops");
                        Err(RunError::LoopAborted { resource })
                    }
                }
            });
        }

        let mut first_err: Option<RunError> = None;
        while let Some(joined) = loops.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => RunError::Join(e),
            };
            shutdown.cancel();
            first_err.get_or_insert(err);
        }
        info!("all watch loops stopped");
        first_err.map_or(Ok(()), Err)
    }
}

struct SpawnLoop<'a, S> {
    source: Arc<S>,
    handler: Arc<dyn EventHandler>,
    namespace: Option<&'a str>,
    shutdown: CancellationToken,
}

impl<S: WatchSource> PrototypeVisitor for SpawnLoop<'_, S> {
    type Output = BoxFuture<'static, Result<(), DeliveryError>>;

    fn visit<K: WatchedObject>(self, descriptor: &'static ResourceDescriptor) -> Self::Output {
        let stream = self.source.watch::<K>(descriptor, self.namespace);
        info!(resource = descriptor.name, api = descriptor.surface.api_version(), ns = ?self.namespace, "watching for new resources");
        let handler = self.handler;
        let shutdown = self.shutdown;
        Box::pin(async move { run_loop(descriptor.name, stream, handler.as_ref(), &shutdown).await })
    }
}

fn object_key<K: WatchedObject>(obj: &K) -> String {
    match obj.uid() {
        Some(uid) => uid,
        None => format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any()),
    }
}

/// Drive one change stream.
///
/// The baseline listing (and any later re-list) only seeds the set of known
/// objects and is never delivered. `Applied` for an unknown object is an add;
/// `Applied` for a known one is an update and is not delivered.
pub async fn run_loop<K: WatchedObject>(
    resource: &'static str,
    mut stream: ChangeStream<K>,
    handler: &dyn EventHandler,
    shutdown: &CancellationToken,
) -> Result<(), DeliveryError> {
    let mut known: FxHashSet<String> = FxHashSet::default();
    loop {
        let change = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(resource, "shutdown requested; leaving watch loop");
                return Ok(());
            }
            next = stream.next() => match next {
                Some(change) => change,
                None => {
                    warn!(resource, "change stream ended");
                    return Ok(());
                }
            },
        };

        let event = match change {
            Change::Restarted(objects) => {
                known = objects.iter().map(object_key).collect();
                debug!(resource, count = known.len(), "baseline synchronised; not delivered");
                continue;
            }
            Change::Applied(obj) => {
                if !known.insert(object_key(&obj)) {
                    continue;
                }
                WatchEvent { resource, kind: EventKind::Added, payload: obj }
            }
            Change::Deleted(obj) => {
                known.remove(&object_key(&obj));
                WatchEvent { resource, kind: EventKind::Deleted, payload: obj }
            }
        };

        let kind = event.kind;
        match event.into_canonical() {
            Ok(canonical) => {
                counter!("kubewatch_events_total", 1u64, "resource" => resource, "kind" => kind.as_str());
                handler.handle(canonical).await?;
            }
            Err(e) => error!(resource, kind = kind.as_str(), error = %e, "dropping event that cannot be encoded"),
        }
    }
}
