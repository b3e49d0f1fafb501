// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubeconfig synthesis from cluster metadata

use crate::constants::KUBECONFIG_NAME_PREFIX;
use crate::error::{DeployError, Result};
use crate::types::{AccessToken, ClusterCredentials, ClusterMetadata, KubeConfig};
use base64::Engine;
use tracing::debug;

/// Build the single-cluster kubeconfig for `cluster` in `project_id`.
///
/// Pure data transformation; fails with `InvalidClusterMetadata` when the
/// endpoint or CA data is missing or malformed, or the token is empty.
pub fn synthesize(
    project_id: &str,
    cluster: &ClusterMetadata,
    token: AccessToken,
) -> Result<KubeConfig> {
    let server = server_url(&cluster.endpoint)?;
    let ca_data = validate_ca_data(&cluster.ca_certificate)?;

    if token.is_empty() {
        return Err(DeployError::InvalidClusterMetadata(
            "access token is empty".to_string(),
        ));
    }

    let name = kubeconfig_name(project_id, &cluster.zone, &cluster.name);
    debug!("Synthesized kubeconfig {} for server {}", name, server);

    Ok(KubeConfig::new(
        name,
        ClusterCredentials {
            server,
            ca_data,
            token,
        },
    ))
}

/// Stable name shared by the cluster, user and context entries
pub fn kubeconfig_name(project_id: &str, zone: &str, cluster_name: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        KUBECONFIG_NAME_PREFIX, project_id, zone, cluster_name
    )
}

/// Turn the endpoint reported by the container API into an https URL
fn server_url(endpoint: &str) -> Result<url::Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(DeployError::InvalidClusterMetadata(
            "cluster endpoint is missing".to_string(),
        ));
    }

    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };

    let url: url::Url = candidate.parse().map_err(|e| {
        DeployError::InvalidClusterMetadata(format!("invalid cluster endpoint '{}': {}", endpoint, e))
    })?;

    if url.scheme() != "https" || url.host_str().is_none() {
        return Err(DeployError::InvalidClusterMetadata(format!(
            "cluster endpoint '{}' is not an https host",
            endpoint
        )));
    }

    Ok(url)
}

/// The CA stays base64 in the kubeconfig, but it has to decode to something
fn validate_ca_data(ca_certificate: &str) -> Result<String> {
    let ca = ca_certificate.trim();
    if ca.is_empty() {
        return Err(DeployError::InvalidClusterMetadata(
            "cluster CA certificate is missing".to_string(),
        ));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(ca)
        .map_err(|e| {
            DeployError::InvalidClusterMetadata(format!("cluster CA certificate is not base64: {}", e))
        })?;

    if decoded.is_empty() {
        return Err(DeployError::InvalidClusterMetadata(
            "cluster CA certificate is empty".to_string(),
        ));
    }

    Ok(ca.to_string())
}
