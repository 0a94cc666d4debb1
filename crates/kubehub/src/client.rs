//! Cluster client construction.

use std::path::Path;

use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use kubewatch_core::ConfigurationError;
use tracing::info;

/// Build a client from `kubeconfig` when given, otherwise from the in-cluster
/// service account, then check the API server answers.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client, ConfigurationError> {
    let config = match kubeconfig {
        Some(path) => {
            info!(file = %path.display(), "running out-of-cluster using kubeconfig");
            let kc = Kubeconfig::read_from(path).map_err(cluster_err)?;
            Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default()).await.map_err(cluster_err)?
        }
        None => {
            info!("running in-cluster using environment variables");
            Config::incluster().map_err(cluster_err)?
        }
    };
    let client = Client::try_from(config).map_err(cluster_err)?;
    let version = client.apiserver_version().await.map_err(cluster_err)?;
    info!(server = %version.git_version, "connected to API server");
    Ok(client)
}

fn cluster_err(e: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::Cluster(e.to_string())
}
