// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster client creation from a synthesized kubeconfig

use crate::error::{DeployError, Result};
use crate::types::KubeConfig;
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client,
};
use tracing::{debug, instrument};

/// Create an authenticated Kubernetes client for the cluster in `kubeconfig`.
///
/// The kubeconfig is parsed in memory; nothing is written to disk.
#[instrument(skip(kubeconfig), fields(kubeconfig = %kubeconfig.name()))]
pub async fn create_client(kubeconfig: &KubeConfig) -> Result<Client> {
    let rendered = kubeconfig.to_yaml()?;

    let parsed: Kubeconfig = serde_yaml::from_str(&rendered)
        .map_err(|e| DeployError::ClientError(format!("Failed to parse kubeconfig: {}", e)))?;

    let options = KubeConfigOptions {
        context: Some(kubeconfig.name().to_string()),
        ..Default::default()
    };

    let client_config = kube::Config::from_custom_kubeconfig(parsed, &options)
        .await
        .map_err(|e| DeployError::ClientError(format!("Failed to create config: {}", e)))?;

    debug!("Client configured for {}", client_config.cluster_url);

    Client::try_from(client_config)
        .map_err(|e| DeployError::ClientError(format!("Failed to create client: {}", e)))
}
