// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pre-flight checks that the configured project and zone are reachable with the credential.

use crate::config::DeployConfig;
use crate::deploy::collaborators::ProjectCatalog;
use crate::error::{DeployError, Result};
use tracing::{info, instrument};

/// Fail unless `project` is visible to the credential
#[instrument(skip(catalog))]
pub async fn check_project(catalog: &dyn ProjectCatalog, project: &str) -> Result<()> {
    let projects = catalog.list_projects().await.map_err(|e| {
        DeployError::InvalidConfig(format!("could not verify project '{}': {}", project, e))
    })?;

    if projects.iter().any(|p| p == project) {
        return Ok(());
    }

    let hint = match catalog.default_project().await {
        Ok(Some(default)) if default != project => format!(" (credential default is '{}')", default),
        _ => String::new(),
    };

    Err(DeployError::InvalidConfig(format!(
        "project '{}' is not accessible with the configured credential{}",
        project, hint
    )))
}

/// Fail unless `zone` exists in `project`; zone names compare case-insensitively
#[instrument(skip(catalog))]
pub async fn check_zone(catalog: &dyn ProjectCatalog, project: &str, zone: &str) -> Result<()> {
    let zones = catalog.list_zones(project).await.map_err(|e| {
        DeployError::InvalidConfig(format!("could not verify zone '{}': {}", zone, e))
    })?;

    if zones.iter().any(|z| z.eq_ignore_ascii_case(zone)) {
        Ok(())
    } else {
        Err(DeployError::InvalidConfig(format!(
            "zone '{}' does not exist in project '{}'",
            zone, project
        )))
    }
}

/// Run every pre-flight check for `config`
pub async fn preflight(catalog: &dyn ProjectCatalog, config: &DeployConfig) -> Result<()> {
    check_project(catalog, &config.project_id).await?;
    check_zone(catalog, &config.project_id, &config.zone).await?;
    info!("Pre-flight checks passed");
    Ok(())
}
