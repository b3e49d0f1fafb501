// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Collaborators backed by the gcloud CLI.
//!
//! The credential identifier is the gcloud account the commands run as, so
//! any account known to `gcloud auth list` can be used.

use crate::deploy::collaborators::{
    ClientCache, ClusterMetadataSource, CredentialResolver, ProjectCatalog,
};
use crate::error::{CollaboratorError, ToolError};
use crate::kubectl::CommandInvocation;
use crate::types::{AccessToken, ClusterMetadata};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// gcloud invocations on behalf of one account
#[derive(Clone, Debug)]
pub struct GcloudClient {
    binary: PathBuf,
    account: String,
}

impl GcloudClient {
    pub fn new(binary: impl Into<PathBuf>, account: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Run gcloud as the bound account; stdout is wiped from memory on drop
    async fn gcloud(
        &self,
        args: &[&str],
        secret_output: bool,
    ) -> Result<Zeroizing<String>, ToolError> {
        let mut argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        argv.push(format!("--account={}", self.account));
        argv.push("--quiet".to_string());

        let mut invocation = CommandInvocation::new(&self.binary, std::env::temp_dir(), argv);
        if secret_output {
            invocation = invocation.without_output_logging();
        }

        let output = invocation.execute(&CancellationToken::new()).await?;
        Ok(Zeroizing::new(output.stdout))
    }
}

#[async_trait]
impl CredentialResolver for GcloudClient {
    #[instrument(skip(self))]
    async fn resolve(&self, credentials_id: &str) -> Result<AccessToken, CollaboratorError> {
        if credentials_id != self.account {
            return Err(CollaboratorError::CredentialNotFound(format!(
                "client is bound to a different account than '{}'",
                credentials_id
            )));
        }

        let stdout = self
            .gcloud(&["auth", "print-access-token"], true)
            .await
            .map_err(classify_auth_error)?;

        let token = AccessToken::new(stdout.trim());
        if token.is_empty() {
            return Err(CollaboratorError::AuthFailure(
                "gcloud returned an empty access token".to_string(),
            ));
        }
        Ok(token)
    }
}

#[async_trait]
impl ClusterMetadataSource for GcloudClient {
    #[instrument(skip(self))]
    async fn get_cluster(
        &self,
        project: &str,
        zone: &str,
        cluster: &str,
    ) -> Result<ClusterMetadata, CollaboratorError> {
        let zone_arg = format!("--zone={}", zone);
        let project_arg = format!("--project={}", project);
        let stdout = self
            .gcloud(
                &[
                    "container",
                    "clusters",
                    "describe",
                    cluster,
                    &zone_arg,
                    &project_arg,
                    "--format=json",
                ],
                false,
            )
            .await
            .map_err(classify_describe_error)?;

        parse_cluster_description(&stdout, zone)
    }
}

#[async_trait]
impl ProjectCatalog for GcloudClient {
    async fn list_projects(&self) -> Result<Vec<String>, CollaboratorError> {
        let stdout = self
            .gcloud(&["projects", "list", "--format=value(projectId)"], false)
            .await
            .map_err(api_error)?;
        Ok(parse_lines(&stdout))
    }

    async fn list_zones(&self, project: &str) -> Result<Vec<String>, CollaboratorError> {
        let project_arg = format!("--project={}", project);
        let stdout = self
            .gcloud(
                &["compute", "zones", "list", &project_arg, "--format=value(name)"],
                false,
            )
            .await
            .map_err(api_error)?;
        Ok(parse_lines(&stdout))
    }

    async fn default_project(&self) -> Result<Option<String>, CollaboratorError> {
        let stdout = self
            .gcloud(&["config", "get-value", "project"], false)
            .await
            .map_err(api_error)?;

        let project = stdout.trim();
        if project.is_empty() || project == "(unset)" {
            Ok(None)
        } else {
            Ok(Some(project.to_string()))
        }
    }
}

/// Hands out one `GcloudClient` per credential id, replacing it on change
pub struct GcloudClientFactory {
    binary: PathBuf,
    cache: ClientCache<GcloudClient>,
}

impl GcloudClientFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cache: ClientCache::new(),
        }
    }

    pub async fn client(&self, credentials_id: &str) -> Arc<GcloudClient> {
        self.cache
            .get_or_insert_with(credentials_id, || {
                debug!("Creating gcloud client for a new credential");
                GcloudClient::new(&self.binary, credentials_id)
            })
            .await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterDescription {
    name: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    master_auth: Option<MasterAuth>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterAuth {
    #[serde(default)]
    cluster_ca_certificate: Option<String>,
}

/// Missing endpoint or CA data is passed through empty so synthesis rejects it
fn parse_cluster_description(json: &str, zone: &str) -> Result<ClusterMetadata, CollaboratorError> {
    let description: ClusterDescription = serde_json::from_str(json)
        .map_err(|e| CollaboratorError::Api(format!("unexpected cluster description: {}", e)))?;

    Ok(ClusterMetadata {
        name: description.name,
        zone: description.location.unwrap_or_else(|| zone.to_string()),
        endpoint: description.endpoint.unwrap_or_default(),
        ca_certificate: description
            .master_auth
            .and_then(|auth| auth.cluster_ca_certificate)
            .unwrap_or_default(),
    })
}

fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn classify_auth_error(error: ToolError) -> CollaboratorError {
    match &error {
        ToolError::NonZeroExit { stderr_tail, .. } => {
            let stderr = stderr_tail.to_ascii_lowercase();
            if stderr.contains("no credentialed accounts") || stderr.contains("not found") {
                CollaboratorError::CredentialNotFound(stderr_tail.clone())
            } else {
                CollaboratorError::AuthFailure(stderr_tail.clone())
            }
        }
        _ => CollaboratorError::AuthFailure(error.to_string()),
    }
}

fn classify_describe_error(error: ToolError) -> CollaboratorError {
    match &error {
        ToolError::NonZeroExit { stderr_tail, .. }
            if stderr_tail.contains("NOT_FOUND") || stderr_tail.contains("was not found") =>
        {
            CollaboratorError::ClusterNotFound(stderr_tail.clone())
        }
        _ => api_error(error),
    }
}

fn api_error(error: ToolError) -> CollaboratorError {
    match error {
        ToolError::NonZeroExit { stderr_tail, .. } => CollaboratorError::Api(stderr_tail),
        other => CollaboratorError::Api(other.to_string()),
    }
}
