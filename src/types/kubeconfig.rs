// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Single-purpose kubeconfig: one cluster, one token user, one current context.

use crate::error::{DeployError, Result};
use crate::types::cluster::ClusterCredentials;
use serde::Serialize;
use std::fmt;
use zeroize::Zeroizing;

/// Credential bundle granting access to exactly one cluster.
///
/// The single cluster/user/context triple is enforced by the type: there is no
/// way to add a second entry, and the context is always the current one.
#[derive(Clone)]
pub struct KubeConfig {
    name: String,
    credentials: ClusterCredentials,
}

impl KubeConfig {
    pub(crate) fn new(name: String, credentials: ClusterCredentials) -> Self {
        Self { name, credentials }
    }

    /// Name shared by the cluster, user and context entries
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &url::Url {
        &self.credentials.server
    }

    pub fn ca_data(&self) -> &str {
        &self.credentials.ca_data
    }

    pub fn credentials(&self) -> &ClusterCredentials {
        &self.credentials
    }

    /// Render as kubeconfig YAML. The result holds the bearer token and is
    /// wiped from memory when dropped.
    pub fn to_yaml(&self) -> Result<Zeroizing<String>> {
        serde_yaml::to_string(&self.document())
            .map(Zeroizing::new)
            .map_err(|e| DeployError::InvalidClusterMetadata(format!("Failed to render kubeconfig: {}", e)))
    }

    fn document(&self) -> Document<'_> {
        let name = self.name.as_str();
        Document {
            api_version: "v1",
            kind: "Config",
            clusters: vec![NamedCluster {
                name,
                cluster: ClusterEntry {
                    server: self.credentials.server.as_str(),
                    certificate_authority_data: &self.credentials.ca_data,
                },
            }],
            users: vec![NamedUser {
                name,
                user: UserEntry {
                    token: self.credentials.token.expose(),
                },
            }],
            contexts: vec![NamedContext {
                name,
                context: ContextEntry {
                    cluster: name,
                    user: name,
                },
            }],
            current_context: name,
        }
    }
}

impl fmt::Debug for KubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeConfig")
            .field("name", &self.name)
            .field("server", &self.credentials.server.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Document<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'a str,
    kind: &'a str,
    clusters: Vec<NamedCluster<'a>>,
    users: Vec<NamedUser<'a>>,
    contexts: Vec<NamedContext<'a>>,
    current_context: &'a str,
}

#[derive(Serialize)]
struct NamedCluster<'a> {
    name: &'a str,
    cluster: ClusterEntry<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry<'a> {
    server: &'a str,
    certificate_authority_data: &'a str,
}

#[derive(Serialize)]
struct NamedUser<'a> {
    name: &'a str,
    user: UserEntry<'a>,
}

#[derive(Serialize)]
struct UserEntry<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct NamedContext<'a> {
    name: &'a str,
    context: ContextEntry<'a>,
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    cluster: &'a str,
    user: &'a str,
}
