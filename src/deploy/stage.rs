// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Steps that run after a successful apply and verification.

use crate::error::{DeployError, Result};
use crate::kubectl::KubectlRunner;
use crate::types::KubeConfig;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything a post-apply stage may use
pub struct StageContext<'a> {
    pub kubeconfig: &'a KubeConfig,
    pub workspace: &'a Path,
    pub runner: &'a KubectlRunner,
    pub cancel: &'a CancellationToken,
}

/// A step appended after verification, sharing the deployment's kubeconfig
#[async_trait]
pub trait PostApplyStage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &StageContext<'_>) -> Result<()>;
}

/// Runs one kubectl subcommand against the deployed cluster
#[derive(Clone, Debug)]
pub struct KubectlStage {
    name: String,
    subcommand: String,
    args: Vec<String>,
}

impl KubectlStage {
    pub fn new(subcommand: impl Into<String>, args: Vec<String>) -> Self {
        let subcommand = subcommand.into();
        Self {
            name: format!("kubectl {}", subcommand),
            subcommand,
            args,
        }
    }

    /// Build from a split command line such as `["rollout", "status", "deployment/web"]`
    pub fn from_command_line(words: &[String]) -> Option<Self> {
        let (subcommand, args) = words.split_first()?;
        Some(Self::new(subcommand.clone(), args.to_vec()))
    }
}

#[async_trait]
impl PostApplyStage for KubectlStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
        let output = ctx
            .runner
            .run(ctx.kubeconfig, ctx.workspace, &self.subcommand, &self.args, ctx.cancel)
            .await
            .map_err(|e| DeployError::Stage {
                stage: self.name.clone(),
                message: e.to_string(),
            })?;

        info!("Stage '{}' finished with {} warning(s)", self.name, output.warnings.len());
        Ok(())
    }
}
