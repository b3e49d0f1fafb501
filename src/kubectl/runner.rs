// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! kubectl execution with a per-invocation kubeconfig file

use crate::constants::KUBECONFIG_ENV;
use crate::error::ToolError;
use crate::kubectl::invocation::{CommandInvocation, CommandOutput};
use crate::types::KubeConfig;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Runs kubectl against one cluster.
///
/// Every call materializes the kubeconfig into its own owner-only file under
/// `scratch_dir`, points `KUBECONFIG` at it, and removes it before returning,
/// whatever the outcome.
#[derive(Clone, Debug)]
pub struct KubectlRunner {
    binary: PathBuf,
    scratch_dir: PathBuf,
    timeout: Option<Duration>,
}

impl KubectlRunner {
    pub fn new(binary: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: scratch_dir.into(),
            timeout: None,
        }
    }

    /// Kill kubectl when a single invocation takes longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// `kubectl apply -f <manifest>` for every manifest path
    pub async fn apply(
        &self,
        kubeconfig: &KubeConfig,
        working_dir: &Path,
        manifests: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ToolError> {
        let args: Vec<String> = manifests
            .iter()
            .flat_map(|m| ["-f".to_string(), m.display().to_string()])
            .collect();

        self.run(kubeconfig, working_dir, "apply", &args, cancel).await
    }

    /// Run `kubectl <subcommand> <args...>` in `working_dir`
    #[instrument(skip(self, kubeconfig, args, cancel), fields(kubeconfig = %kubeconfig.name()))]
    pub async fn run(
        &self,
        kubeconfig: &KubeConfig,
        working_dir: &Path,
        subcommand: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ToolError> {
        let program = which::which(&self.binary).map_err(|_| ToolError::NotFound {
            tool: self.binary.display().to_string(),
        })?;

        let file = EphemeralKubeconfig::write(&self.scratch_dir, kubeconfig)?;

        let argv: Vec<String> = std::iter::once(subcommand.to_string())
            .chain(args.iter().cloned())
            .collect();
        let mut invocation = CommandInvocation::new(program, working_dir, argv)
            .env(KUBECONFIG_ENV, file.path().as_os_str());
        if let Some(timeout) = self.timeout {
            invocation = invocation.with_timeout(timeout);
        }

        info!("Running {}", invocation.display_command());
        let result = invocation.execute(cancel).await;

        finish(result, file.remove())
    }
}

/// Combine the command result with the outcome of removing the kubeconfig.
///
/// A cleanup failure never replaces a command failure; after a successful
/// command it is carried as a warning.
fn finish(
    result: Result<CommandOutput, ToolError>,
    cleanup: io::Result<()>,
) -> Result<CommandOutput, ToolError> {
    match (result, cleanup) {
        (Ok(output), Ok(())) => Ok(output),
        (Ok(mut output), Err(e)) => {
            let message = format!("failed to remove ephemeral kubeconfig: {}", e);
            warn!("{}", message);
            output.warnings.push(message);
            Ok(output)
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(e)) => {
            warn!("failed to remove ephemeral kubeconfig: {}", e);
            Err(err)
        }
    }
}

/// Kubeconfig file that lives for one invocation.
///
/// Dropping it (including during a panic) also deletes the file; `remove`
/// exists to observe deletion errors.
struct EphemeralKubeconfig {
    file: NamedTempFile,
}

impl EphemeralKubeconfig {
    fn write(dir: &Path, kubeconfig: &KubeConfig) -> Result<Self, ToolError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            ToolError::Io(format!("failed to create scratch dir {}: {}", dir.display(), e))
        })?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!("kubeconfig-{}-", std::process::id()))
            .suffix(".yaml")
            .tempfile_in(dir)
            .map_err(|e| ToolError::Io(format!("failed to create ephemeral kubeconfig: {}", e)))?;

        // Tighten permissions before any secret is written
        restrict_permissions(file.path())
            .map_err(|e| ToolError::Io(format!("failed to restrict kubeconfig permissions: {}", e)))?;

        let rendered = kubeconfig
            .to_yaml()
            .map_err(|e| ToolError::Io(e.to_string()))?;

        file.write_all(rendered.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| ToolError::Io(format!("failed to write ephemeral kubeconfig: {}", e)))?;

        Ok(Self { file })
    }

    fn path(&self) -> &Path {
        self.file.path()
    }

    fn remove(self) -> io::Result<()> {
        self.file.close()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
