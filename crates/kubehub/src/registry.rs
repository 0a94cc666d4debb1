//! Static table of watchable resources.
//!
//! Each entry ties a command-line resource name to the API surface that serves
//! it and to the typed `k8s-openapi` object its watch payloads decode into.

use std::fmt::Debug;

use k8s_openapi::api::{apps, autoscaling, batch, core, networking};
use kube::Resource;
use kubewatch_core::UnknownResource;
use serde::{de::DeserializeOwned, Serialize};

/// API group/version a resource is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiSurface {
    CoreV1,
    AppsV1,
    AutoscalingV2,
    BatchV1,
    NetworkingV1,
}

impl ApiSurface {
    pub fn api_version(self) -> &'static str {
        match self {
            ApiSurface::CoreV1 => "v1",
            ApiSurface::AppsV1 => "apps/v1",
            ApiSurface::AutoscalingV2 => "autoscaling/v2",
            ApiSurface::BatchV1 => "batch/v1",
            ApiSurface::NetworkingV1 => "networking.k8s.io/v1",
        }
    }
}

/// Decode type of a resource's watch payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prototype {
    ConfigMap,
    Endpoints,
    Event,
    LimitRange,
    PersistentVolumeClaim,
    PersistentVolume,
    Pod,
    PodTemplate,
    ReplicationController,
    ResourceQuota,
    Secret,
    ServiceAccount,
    Service,
    Deployment,
    HorizontalPodAutoscaler,
    Ingress,
    Job,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: &'static str,
    pub surface: ApiSurface,
    pub prototype: Prototype,
    /// Cluster-scoped resources ignore the namespace filter.
    pub namespaced: bool,
}

/// Bounds every typed object must satisfy to flow through a watch loop.
pub trait WatchedObject:
    Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
}

impl<K> WatchedObject for K where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
}

/// Generic code that is instantiated with the prototype type of a descriptor.
pub trait PrototypeVisitor {
    type Output;
    fn visit<K: WatchedObject>(self, descriptor: &'static ResourceDescriptor) -> Self::Output;
}

impl ResourceDescriptor {
    /// Call `visitor` with this descriptor's typed prototype.
    pub fn dispatch<V: PrototypeVisitor>(&'static self, visitor: V) -> V::Output {
        match self.prototype {
            Prototype::ConfigMap => visitor.visit::<core::v1::ConfigMap>(self),
            Prototype::Endpoints => visitor.visit::<core::v1::Endpoints>(self),
            Prototype::Event => visitor.visit::<core::v1::Event>(self),
            Prototype::LimitRange => visitor.visit::<core::v1::LimitRange>(self),
            Prototype::PersistentVolumeClaim => visitor.visit::<core::v1::PersistentVolumeClaim>(self),
            Prototype::PersistentVolume => visitor.visit::<core::v1::PersistentVolume>(self),
            Prototype::Pod => visitor.visit::<core::v1::Pod>(self),
            Prototype::PodTemplate => visitor.visit::<core::v1::PodTemplate>(self),
            Prototype::ReplicationController => visitor.visit::<core::v1::ReplicationController>(self),
            Prototype::ResourceQuota => visitor.visit::<core::v1::ResourceQuota>(self),
            Prototype::Secret => visitor.visit::<core::v1::Secret>(self),
            Prototype::ServiceAccount => visitor.visit::<core::v1::ServiceAccount>(self),
            Prototype::Service => visitor.visit::<core::v1::Service>(self),
            Prototype::Deployment => visitor.visit::<apps::v1::Deployment>(self),
            Prototype::HorizontalPodAutoscaler => visitor.visit::<autoscaling::v2::HorizontalPodAutoscaler>(self),
            Prototype::Ingress => visitor.visit::<networking::v1::Ingress>(self),
            Prototype::Job => visitor.visit::<batch::v1::Job>(self),
        }
    }
}

const fn entry(name: &'static str, surface: ApiSurface, prototype: Prototype, namespaced: bool) -> ResourceDescriptor {
    ResourceDescriptor { name, surface, prototype, namespaced }
}

static BUILTIN: [ResourceDescriptor; 17] = [
    // core/v1
    entry("configMaps", ApiSurface::CoreV1, Prototype::ConfigMap, true),
    entry("endpoints", ApiSurface::CoreV1, Prototype::Endpoints, true),
    entry("events", ApiSurface::CoreV1, Prototype::Event, true),
    entry("limitranges", ApiSurface::CoreV1, Prototype::LimitRange, true),
    entry("persistentvolumeclaims", ApiSurface::CoreV1, Prototype::PersistentVolumeClaim, true),
    entry("persistentvolumes", ApiSurface::CoreV1, Prototype::PersistentVolume, false),
    entry("pods", ApiSurface::CoreV1, Prototype::Pod, true),
    entry("podtemplates", ApiSurface::CoreV1, Prototype::PodTemplate, true),
    entry("replicationcontrollers", ApiSurface::CoreV1, Prototype::ReplicationController, true),
    entry("resourcequotas", ApiSurface::CoreV1, Prototype::ResourceQuota, true),
    entry("secrets", ApiSurface::CoreV1, Prototype::Secret, true),
    entry("serviceaccounts", ApiSurface::CoreV1, Prototype::ServiceAccount, true),
    entry("services", ApiSurface::CoreV1, Prototype::Service, true),
    // successors of extensions/v1beta1
    entry("deployments", ApiSurface::AppsV1, Prototype::Deployment, true),
    entry("horizontalpodautoscalers", ApiSurface::AutoscalingV2, Prototype::HorizontalPodAutoscaler, true),
    entry("ingresses", ApiSurface::NetworkingV1, Prototype::Ingress, true),
    entry("jobs", ApiSurface::BatchV1, Prototype::Job, true),
];

/// Immutable lookup over the supported resources. Cheap to copy and share.
#[derive(Debug, Clone, Copy)]
pub struct ResourceRegistry {
    entries: &'static [ResourceDescriptor],
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ResourceRegistry {
    pub fn builtin() -> Self {
        Self { entries: &BUILTIN }
    }

    pub fn lookup(&self, name: &str) -> Result<&'static ResourceDescriptor, UnknownResource> {
        self.iter()
            .find(|d| d.name == name)
            .ok_or_else(|| UnknownResource(name.to_string()))
    }

    /// Supported names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.iter().map(|d| d.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ResourceDescriptor> {
        let entries: &'static [ResourceDescriptor] = self.entries;
        entries.iter()
    }
}
