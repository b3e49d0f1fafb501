// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{env as vars, verify, APPLY_TIMEOUT_SECS, GCLOUD, KUBECTL};
use crate::error::{DeployError, Result as DeployResult};
use crate::kubernetes::manifests::check_relative_pattern;
use crate::verify::{PollPolicy, VerificationTarget};
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// What to deploy and how to check it, validated at construction
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub project_id: String,
    pub cluster_name: String,
    pub credentials_id: String,
    pub zone: String,
    /// File, directory or glob relative to the workspace
    pub manifest_pattern: String,
    pub verify_deployments: bool,
    pub verify_services: bool,
    /// Verified in addition to the targets found in the manifests
    pub verify_targets: Vec<VerificationTarget>,
    pub verify_timeout: Duration,
    pub poll_policy: PollPolicy,
    pub apply_timeout: Option<Duration>,
}

impl DeployConfig {
    pub fn new(
        project_id: impl Into<String>,
        cluster_name: impl Into<String>,
        credentials_id: impl Into<String>,
        zone: impl Into<String>,
        manifest_pattern: impl Into<String>,
    ) -> DeployResult<Self> {
        let config = Self {
            project_id: project_id.into(),
            cluster_name: cluster_name.into(),
            credentials_id: credentials_id.into(),
            zone: zone.into(),
            manifest_pattern: manifest_pattern.into(),
            verify_deployments: false,
            verify_services: false,
            verify_targets: Vec::new(),
            verify_timeout: Duration::from_secs(verify::TIMEOUT_SECS),
            poll_policy: PollPolicy::default(),
            apply_timeout: Some(Duration::from_secs(APPLY_TIMEOUT_SECS)),
        };

        for (field, value) in [
            ("project id", &config.project_id),
            ("cluster name", &config.cluster_name),
            ("credentials id", &config.credentials_id),
            ("zone", &config.zone),
        ] {
            if value.trim().is_empty() {
                return Err(DeployError::InvalidConfig(format!("{} is required", field)));
            }
        }
        check_relative_pattern(&config.manifest_pattern)?;

        Ok(config)
    }

    pub fn with_verification(mut self, deployments: bool, services: bool) -> Self {
        self.verify_deployments = deployments;
        self.verify_services = services;
        self
    }

    pub fn with_targets(mut self, targets: Vec<VerificationTarget>) -> Self {
        self.verify_targets = targets;
        self
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_apply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.apply_timeout = timeout;
        self
    }

    pub fn verification_enabled(&self) -> bool {
        self.verify_deployments || self.verify_services || !self.verify_targets.is_empty()
    }
}

/// Runtime configuration of the binary, loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub deploy: DeployConfig,
    pub workspace: PathBuf,
    pub kubectl: PathBuf,
    pub gcloud: PathBuf,
    /// Parent directory of the per-invocation kubeconfig files
    pub scratch_dir: PathBuf,
    /// kubectl subcommand line run after verification
    pub post_apply_command: Option<Vec<String>>,
    pub preflight: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("{} environment variable not set", key))
        };

        let targets = lookup(vars::VERIFY_TARGETS)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| t.parse::<VerificationTarget>())
                    .collect::<DeployResult<Vec<_>>>()
            })
            .transpose()
            .context("invalid verification targets")?
            .unwrap_or_default();

        let poll_interval = seconds(&lookup, vars::POLL_INTERVAL_SECS, verify::POLL_INTERVAL_SECS)?;
        let poll_max = seconds(&lookup, vars::POLL_MAX_INTERVAL_SECS, verify::POLL_MAX_INTERVAL_SECS)?;
        let apply_timeout = seconds(&lookup, vars::APPLY_TIMEOUT_SECS, APPLY_TIMEOUT_SECS)?;

        let deploy = DeployConfig::new(
            required(vars::PROJECT_ID)?,
            required(vars::CLUSTER_NAME)?,
            required(vars::CREDENTIALS_ID)?,
            required(vars::ZONE)?,
            required(vars::MANIFEST_PATTERN)?,
        )?
        .with_verification(
            flag(&lookup, vars::VERIFY_DEPLOYMENTS, false)?,
            flag(&lookup, vars::VERIFY_SERVICES, false)?,
        )
        .with_targets(targets)
        .with_verify_timeout(seconds(&lookup, vars::VERIFY_TIMEOUT_SECS, verify::TIMEOUT_SECS)?)
        .with_poll_policy(PollPolicy::new(poll_interval, poll_max))
        // 0 disables the limit
        .with_apply_timeout((!apply_timeout.is_zero()).then_some(apply_timeout));

        let workspace = match lookup(vars::WORKSPACE) {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir().context("cannot determine the current directory")?,
        };

        let post_apply_command = lookup(vars::POST_APPLY_COMMAND)
            .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|words| !words.is_empty());

        Ok(Config {
            deploy,
            workspace,
            kubectl: lookup(vars::KUBECTL_PATH).unwrap_or_else(|| KUBECTL.to_string()).into(),
            gcloud: lookup(vars::GCLOUD_PATH).unwrap_or_else(|| GCLOUD.to_string()).into(),
            scratch_dir: lookup(vars::SCRATCH_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("gke-deploy")),
            post_apply_command,
            preflight: flag(&lookup, vars::PREFLIGHT, true)?,
        })
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be true or false, got '{}'", key, value)),
        None => Ok(default),
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number of seconds, got '{}'", key, value))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
