// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Interfaces of the services a deployment depends on.

use crate::error::CollaboratorError;
use crate::kubernetes::create_client;
use crate::types::{AccessToken, ClusterMetadata, KubeConfig};
use async_trait::async_trait;
use kube::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Turns an opaque credential identifier into a bearer token
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, credentials_id: &str) -> Result<AccessToken, CollaboratorError>;
}

/// Looks up the endpoint and CA certificate of a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterMetadataSource: Send + Sync {
    async fn get_cluster(
        &self,
        project: &str,
        zone: &str,
        cluster: &str,
    ) -> Result<ClusterMetadata, CollaboratorError>;
}

/// Projects and zones visible to a credential, used for pre-flight checks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<String>, CollaboratorError>;

    async fn list_zones(&self, project: &str) -> Result<Vec<String>, CollaboratorError>;

    /// Project configured as the credential's default, if any
    async fn default_project(&self) -> Result<Option<String>, CollaboratorError>;
}

/// Builds the API client the rollout verifier polls through
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &KubeConfig) -> crate::error::Result<Client>;
}

/// Connects with an in-memory client built from the synthesized kubeconfig
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeconfigConnector;

#[async_trait]
impl ClusterConnector for KubeconfigConnector {
    async fn connect(&self, kubeconfig: &KubeConfig) -> crate::error::Result<Client> {
        create_client(kubeconfig).await
    }
}

/// Connector that hands out a prepared client regardless of kubeconfig
#[derive(Clone)]
pub struct FixedConnector {
    client: Client,
}

impl FixedConnector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterConnector for FixedConnector {
    async fn connect(&self, _kubeconfig: &KubeConfig) -> crate::error::Result<Client> {
        Ok(self.client.clone())
    }
}

struct CacheEntry<T> {
    credentials_id: String,
    client: Arc<T>,
}

/// Holds the client handle for the most recently used credential.
///
/// Asking for a different credential id drops the cached handle and creates
/// a new one.
pub struct ClientCache<T> {
    inner: Mutex<Option<CacheEntry<T>>>,
}

impl<T> ClientCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub async fn get_or_insert_with<F>(&self, credentials_id: &str, create: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let mut inner = self.inner.lock().await;

        if let Some(entry) = inner.as_ref() {
            if entry.credentials_id == credentials_id {
                return entry.client.clone();
            }
            debug!("Credential changed, replacing cached client");
        }

        let client = Arc::new(create());
        *inner = Some(CacheEntry {
            credentials_id: credentials_id.to_string(),
            client: client.clone(),
        });
        client
    }

    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }

    /// Credential id of the cached client
    pub async fn cached_id(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|entry| entry.credentials_id.clone())
    }
}

impl<T> Default for ClientCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
