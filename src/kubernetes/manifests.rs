// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Manifest lookup in the build workspace and discovery of the workloads they declare.

use crate::constants::DEFAULT_NAMESPACE;
use crate::error::{DeployError, Result};
use crate::verify::VerificationTarget;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Reject patterns that are absolute or climb out of the workspace
pub fn check_relative_pattern(pattern: &str) -> Result<()> {
    let path = Path::new(pattern);
    if pattern.trim().is_empty() {
        return Err(DeployError::InvalidConfig(
            "manifest pattern must not be empty".to_string(),
        ));
    }
    if path.is_absolute() || pattern.starts_with('/') {
        return Err(DeployError::InvalidConfig(format!(
            "manifest pattern '{}' must be relative to the workspace",
            pattern
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(DeployError::InvalidConfig(format!(
            "manifest pattern '{}' must not leave the workspace",
            pattern
        )));
    }
    Ok(())
}

/// Resolve a manifest file, directory or glob relative to `workspace`.
///
/// A directory or file resolves to itself; a glob resolves to every matching
/// file in sorted order. Nothing matching is an error.
#[instrument(skip(workspace))]
pub fn resolve_manifests(workspace: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    check_relative_pattern(pattern)?;

    let direct = workspace.join(pattern);
    if direct.exists() {
        debug!("Manifest pattern '{}' names {}", pattern, direct.display());
        return Ok(vec![direct]);
    }

    // Only the pattern part may contain wildcards
    let root = glob::Pattern::escape(&workspace.to_string_lossy());
    let full_pattern = Path::new(&root).join(pattern);
    let entries = glob::glob(&full_pattern.to_string_lossy()).map_err(|e| {
        DeployError::Manifest(format!("invalid manifest pattern '{}': {}", pattern, e))
    })?;

    let mut matches = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            DeployError::Manifest(format!("cannot read {}: {}", e.path().display(), e))
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();

    if matches.is_empty() {
        return Err(DeployError::Manifest(format!(
            "no manifests match '{}' in {}",
            pattern,
            workspace.display()
        )));
    }

    info!("Resolved {} manifest(s) for '{}'", matches.len(), pattern);
    Ok(matches)
}

/// Collect the Deployments and Services declared by the given manifests.
///
/// Directories contribute their top-level `.yaml`, `.yml` and `.json` files,
/// the same set kubectl applies for them.
pub fn discover_targets(
    manifests: &[PathBuf],
    deployments: bool,
    services: bool,
) -> Result<Vec<VerificationTarget>> {
    let mut targets = Vec::new();
    if !deployments && !services {
        return Ok(targets);
    }

    for path in manifest_files(manifests)? {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;

        for target in targets_in_document_stream(&content)
            .map_err(|e| DeployError::Manifest(format!("{}: {}", path.display(), e)))?
        {
            let wanted = match target {
                VerificationTarget::Deployment { .. } => deployments,
                VerificationTarget::Service { .. } => services,
            };
            if wanted && !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    debug!("Discovered {} verification target(s)", targets.len());
    Ok(targets)
}

/// Append `extra` targets not already present, keeping first-seen order
pub fn merge_targets(
    mut targets: Vec<VerificationTarget>,
    extra: &[VerificationTarget],
) -> Vec<VerificationTarget> {
    for target in extra {
        if !targets.contains(target) {
            targets.push(target.clone());
        }
    }
    targets
}

fn manifest_files(manifests: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in manifests {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|e| DeployError::Manifest(format!("cannot list {}: {}", path.display(), e)))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_manifest_file(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml") | Some("json")
    )
}

fn targets_in_document_stream(
    content: &str,
) -> std::result::Result<Vec<VerificationTarget>, serde_yaml::Error> {
    let mut targets = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document)?;
        collect_targets(&value, &mut targets);
    }
    Ok(targets)
}

fn collect_targets(value: &Value, targets: &mut Vec<VerificationTarget>) {
    let kind = value.get("kind").and_then(Value::as_str);

    if kind == Some("List") {
        if let Some(items) = value.get("items").and_then(Value::as_sequence) {
            for item in items {
                collect_targets(item, targets);
            }
        }
        return;
    }

    let metadata = value.get("metadata");
    let Some(name) = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
    else {
        return;
    };
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAMESPACE);

    match kind {
        Some("Deployment") => targets.push(VerificationTarget::deployment(namespace, name)),
        Some("Service") => targets.push(VerificationTarget::service(namespace, name)),
        _ => {}
    }
}
