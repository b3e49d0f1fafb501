// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::verify::VerificationFailure;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Credential authentication failed for '{credentials_id}': {source}")]
    CredentialAuthFailure {
        credentials_id: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Cluster lookup failed for {project}/{zone}/{cluster}: {source}")]
    ClusterResolutionFailure {
        project: String,
        zone: String,
        cluster: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Invalid cluster metadata: {0}")]
    InvalidClusterMetadata(String),

    #[error("kubectl invocation failed: {0}")]
    ToolInvocationFailure(#[from] ToolError),

    #[error("Rollout verification timed out: {0}")]
    VerificationTimeout(VerificationFailure),

    #[error("Rollout verification failed: {0}")]
    VerificationTargetError(VerificationFailure),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to build cluster client: {0}")]
    ClientError(String),

    #[error("Post-apply stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Deployment cancelled")]
    Cancelled,
}

impl From<VerificationFailure> for DeployError {
    fn from(failure: VerificationFailure) -> Self {
        if failure.all_timed_out() {
            DeployError::VerificationTimeout(failure)
        } else {
            DeployError::VerificationTargetError(failure)
        }
    }
}

/// Failures of the external cluster-management tool
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("'{tool}' was not found on PATH")]
    NotFound { tool: String },

    #[error("'{command}' exited with {}: {stderr_tail}", describe_exit(.exit_code))]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("'{command}' did not finish within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("'{command}' was cancelled")]
    Cancelled { command: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Failures reported by the credential store and cluster metadata service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, DeployError>;
