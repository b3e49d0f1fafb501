// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gke_deploy::config::Config;
use gke_deploy::deploy::{preflight, DeployStep, GcloudClientFactory, KubectlStage};
use gke_deploy::kubectl::KubectlRunner;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting GKE deploy");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: project={} cluster={} zone={} manifests={}",
        config.deploy.project_id,
        config.deploy.cluster_name,
        config.deploy.zone,
        config.deploy.manifest_pattern
    );

    let factory = GcloudClientFactory::new(&config.gcloud);
    let gcloud = factory.client(&config.deploy.credentials_id).await;

    if config.preflight {
        preflight(gcloud.as_ref(), &config.deploy)
            .await
            .context("pre-flight checks failed")?;
    }

    let runner = KubectlRunner::new(&config.kubectl, &config.scratch_dir);
    let mut step = DeployStep::new(config.deploy.clone(), gcloud.clone(), gcloud, runner);
    if let Some(stage) = config
        .post_apply_command
        .as_deref()
        .and_then(KubectlStage::from_command_line)
    {
        step = step.with_stage(Box::new(stage));
    }

    // Cancel the deployment on Ctrl-C; in-flight kubectl is killed and cleaned up
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling deployment");
            trigger.cancel();
        }
    });

    match step.perform(&config.workspace, &cancel).await {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                warn!("{}", warning);
            }
            info!(
                "Deployed {} manifest(s) to {}",
                outcome.manifests.len(),
                outcome.kubeconfig_name
            );
            Ok(())
        }
        Err(e) => {
            error!("Deployment failed: {}", e);
            Err(e.into())
        }
    }
}
