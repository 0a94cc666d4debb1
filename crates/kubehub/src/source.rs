//! Change streams feeding the watch loops.

use futures::{stream::BoxStream, StreamExt};
use kube::{
    api::Api,
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client,
};
use tracing::{debug, warn};

use crate::registry::{ResourceDescriptor, WatchedObject};

/// One notification from a change stream.
#[derive(Debug, Clone)]
pub enum Change<K> {
    Applied(K),
    Deleted(K),
    /// Full listing of current state: the initial baseline, or a re-list after desync.
    Restarted(Vec<K>),
}

pub type ChangeStream<K> = BoxStream<'static, Change<K>>;

/// Produces an endless change stream for one resource.
///
/// Implementations own reconnects: transient failures are retried internally
/// and never show up as items.
pub trait WatchSource: Send + Sync + 'static {
    fn watch<K: WatchedObject>(&self, resource: &'static ResourceDescriptor, namespace: Option<&str>) -> ChangeStream<K>;
}

/// Watch source backed by the kube runtime watcher.
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Watcher configuration for one resource.
///
/// A namespace filter on a namespaced resource becomes a server-side field
/// selector; cluster-scoped resources ignore it. Resync stays off: the watcher
/// only re-lists when the stream desyncs.
pub fn watch_config(resource: &ResourceDescriptor, namespace: Option<&str>) -> watcher::Config {
    let config = watcher::Config::default();
    match namespace {
        Some(ns) if resource.namespaced => config.fields(&format!("metadata.namespace={ns}")),
        Some(ns) => {
            debug!(resource = resource.name, ns, "cluster-scoped resource; namespace filter ignored");
            config
        }
        None => config,
    }
}

impl WatchSource for KubeSource {
    fn watch<K: WatchedObject>(&self, resource: &'static ResourceDescriptor, namespace: Option<&str>) -> ChangeStream<K> {
        let api: Api<K> = Api::all_with(self.client.clone(), &());
        let name = resource.name;
        watcher::watcher(api, watch_config(resource, namespace))
            .default_backoff()
            .filter_map(move |ev| async move {
                match ev {
                    Ok(Event::Applied(o)) => Some(Change::Applied(o)),
                    Ok(Event::Deleted(o)) => Some(Change::Deleted(o)),
                    Ok(Event::Restarted(list)) => Some(Change::Restarted(list)),
                    Err(e) => {
                        warn!(resource = name, error = %e, "watch stream error; retrying with backoff");
                        None
                    }
                }
            })
            .boxed()
    }
}
