//! kubewatch kubehub – resource registry and watch supervision

#![forbid(unsafe_code)]

pub mod client;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use client::connect;
pub use registry::{ApiSurface, Prototype, PrototypeVisitor, ResourceDescriptor, ResourceRegistry, WatchedObject};
pub use source::{watch_config, Change, ChangeStream, KubeSource, WatchSource};
pub use supervisor::{run_loop, RunError, WatchSupervisor};
