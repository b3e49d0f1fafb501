// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The deploy step: credentials, cluster lookup, kubeconfig, apply, verify, post-apply stages.

use crate::config::DeployConfig;
use crate::deploy::collaborators::{
    ClusterConnector, ClusterMetadataSource, CredentialResolver, KubeconfigConnector,
};
use crate::deploy::stage::{PostApplyStage, StageContext};
use crate::error::{CollaboratorError, DeployError, Result, ToolError};
use crate::kubectl::{CommandOutput, KubectlRunner};
use crate::kubernetes::{discover_targets, merge_targets, resolve_manifests, synthesize};
use crate::verify::{RolloutVerifier, VerificationReport, VerificationTarget};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// What a successful deployment did
#[derive(Debug)]
pub struct DeployOutcome {
    pub kubeconfig_name: String,
    pub manifests: Vec<PathBuf>,
    pub apply: CommandOutput,
    /// `None` when verification was disabled or found nothing to check
    pub verification: Option<VerificationReport>,
    pub warnings: Vec<String>,
}

pub struct DeployStep {
    config: DeployConfig,
    resolver: Arc<dyn CredentialResolver>,
    clusters: Arc<dyn ClusterMetadataSource>,
    connector: Arc<dyn ClusterConnector>,
    runner: KubectlRunner,
    stages: Vec<Box<dyn PostApplyStage>>,
}

impl DeployStep {
    pub fn new(
        config: DeployConfig,
        resolver: Arc<dyn CredentialResolver>,
        clusters: Arc<dyn ClusterMetadataSource>,
        runner: KubectlRunner,
    ) -> Self {
        let runner = match config.apply_timeout {
            Some(timeout) => runner.with_timeout(timeout),
            None => runner,
        };

        Self {
            config,
            resolver,
            clusters,
            connector: Arc::new(KubeconfigConnector),
            runner,
            stages: Vec::new(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ClusterConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Append a stage; stages run in the order they were added
    pub fn with_stage(mut self, stage: Box<dyn PostApplyStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Deploy the manifests matched in `workspace` and verify the rollout.
    ///
    /// Fails on the first fatal problem; a failed verification reports every
    /// target that did not become ready.
    #[instrument(
        skip(self, workspace, cancel),
        fields(
            project = %self.config.project_id,
            cluster = %self.config.cluster_name,
            zone = %self.config.zone
        )
    )]
    pub async fn perform(&self, workspace: &Path, cancel: &CancellationToken) -> Result<DeployOutcome> {
        let config = &self.config;
        info!(
            "GKE deploying, project: {} cluster: {} zone: {}",
            config.project_id, config.cluster_name, config.zone
        );

        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            token = self.resolver.resolve(&config.credentials_id) => {
                token.map_err(|source| DeployError::CredentialAuthFailure {
                    credentials_id: config.credentials_id.clone(),
                    source,
                })?
            }
        };

        if token.is_empty() {
            return Err(DeployError::CredentialAuthFailure {
                credentials_id: config.credentials_id.clone(),
                source: CollaboratorError::AuthFailure(
                    "credential resolved to an empty access token".to_string(),
                ),
            });
        }

        let cluster = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            cluster = self.clusters.get_cluster(&config.project_id, &config.zone, &config.cluster_name) => {
                cluster.map_err(|source| DeployError::ClusterResolutionFailure {
                    project: config.project_id.clone(),
                    zone: config.zone.clone(),
                    cluster: config.cluster_name.clone(),
                    source,
                })?
            }
        };

        let kubeconfig = synthesize(&config.project_id, &cluster, token)?;
        let manifests = resolve_manifests(workspace, &config.manifest_pattern)?;
        let targets = self.verification_targets(&manifests)?;

        let apply = self
            .runner
            .apply(&kubeconfig, workspace, &manifests, cancel)
            .await
            .map_err(|e| match e {
                ToolError::Cancelled { .. } => DeployError::Cancelled,
                other => DeployError::ToolInvocationFailure(other),
            })?;
        let mut warnings = apply.warnings.clone();

        let verification = if targets.is_empty() {
            if config.verification_enabled() {
                let message = "verification enabled but the manifests declare no matching targets";
                warn!("{}", message);
                warnings.push(message.to_string());
            }
            None
        } else {
            let client = self.connector.connect(&kubeconfig).await?;
            let verifier = RolloutVerifier::new(client, config.poll_policy.clone());

            match verifier.verify(&targets, config.verify_timeout, cancel).await {
                Ok(report) => Some(report),
                Err(failure) if failure.is_cancelled() || cancel.is_cancelled() => {
                    return Err(DeployError::Cancelled)
                }
                Err(failure) => return Err(failure.into()),
            }
        };

        let ctx = StageContext {
            kubeconfig: &kubeconfig,
            workspace,
            runner: &self.runner,
            cancel,
        };
        for stage in &self.stages {
            if cancel.is_cancelled() {
                return Err(DeployError::Cancelled);
            }
            info!("Running post-apply stage '{}'", stage.name());
            stage.run(&ctx).await?;
        }

        info!("Deployment to {} finished", kubeconfig.name());
        Ok(DeployOutcome {
            kubeconfig_name: kubeconfig.name().to_string(),
            manifests,
            apply,
            verification,
            warnings,
        })
    }

    fn verification_targets(&self, manifests: &[PathBuf]) -> Result<Vec<VerificationTarget>> {
        let config = &self.config;
        if !config.verification_enabled() {
            return Ok(Vec::new());
        }

        let discovered = discover_targets(
            manifests,
            config.verify_deployments,
            config.verify_services,
        )?;
        Ok(merge_targets(discovered, &config.verify_targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::collaborators::{
        FixedConnector, MockClusterMetadataSource, MockCredentialResolver,
    };
    use crate::test_utils::{deployment_json, dir_entries, MockService};
    use crate::types::{AccessToken, ClusterMetadata};
    use crate::verify::{PollPolicy, TargetOutcome};
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DEPLOYMENT_PATH: &str = "/apis/apps/v1/namespaces/default/deployments/web";

    const APP: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: web
          image: nginx
"#;

    fn cluster() -> ClusterMetadata {
        ClusterMetadata {
            name: "c".to_string(),
            zone: "z".to_string(),
            endpoint: "35.1.2.3".to_string(),
            ca_certificate: "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCg==".to_string(),
        }
    }

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("k8s")).unwrap();
        std::fs::write(dir.path().join("k8s/app.yaml"), APP).unwrap();
        dir
    }

    fn config() -> DeployConfig {
        DeployConfig::new("p", "c", "ci", "z", "k8s/*.yaml")
            .unwrap()
            .with_verification(true, false)
            .with_verify_timeout(Duration::from_secs(10))
            .with_poll_policy(PollPolicy::new(
                Duration::from_millis(10),
                Duration::from_millis(20),
            ))
    }

    fn resolver_ok() -> MockCredentialResolver {
        let mut resolver = MockCredentialResolver::new();
        resolver
            .expect_resolve()
            .with(eq("ci"))
            .times(1)
            .returning(|_| Ok(AccessToken::new("ya29.token")));
        resolver
    }

    fn clusters_ok() -> MockClusterMetadataSource {
        let mut clusters = MockClusterMetadataSource::new();
        clusters
            .expect_get_cluster()
            .with(eq("p"), eq("z"), eq("c"))
            .times(1)
            .returning(|_, _, _| Ok(cluster()));
        clusters
    }

    struct CountingStage {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PostApplyStage for CountingStage {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
            assert_eq!(ctx.kubeconfig.name(), "gke_p_z_c");
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_credential_failure_spawns_nothing() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let workspace = workspace();
        let kubectl = bin.path().join("kubectl");

        let mut resolver = MockCredentialResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Err(CollaboratorError::AuthFailure("invalid_grant".to_string())));
        let mut clusters = MockClusterMetadataSource::new();
        clusters.expect_get_cluster().times(0);

        let step = DeployStep::new(
            config(),
            Arc::new(resolver),
            Arc::new(clusters),
            KubectlRunner::new(&kubectl, scratch.path()),
        );

        match step.perform(workspace.path(), &CancellationToken::new()).await {
            Err(DeployError::CredentialAuthFailure { credentials_id, source }) => {
                assert_eq!(credentials_id, "ci");
                assert_eq!(source, CollaboratorError::AuthFailure("invalid_grant".to_string()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!bin.path().join("kubectl.log").exists());
        assert!(dir_entries(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_token_is_credential_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let workspace = workspace();

        let mut resolver = MockCredentialResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(AccessToken::new("  ")));
        let mut clusters = MockClusterMetadataSource::new();
        clusters.expect_get_cluster().times(0);

        let step = DeployStep::new(
            config(),
            Arc::new(resolver),
            Arc::new(clusters),
            KubectlRunner::new("kubectl", scratch.path()),
        );

        let err = step
            .perform(workspace.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::CredentialAuthFailure { .. }));
        assert!(err.to_string().contains("empty access token"));
        assert!(dir_entries(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cluster_lookup_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let workspace = workspace();

        let mut clusters = MockClusterMetadataSource::new();
        clusters
            .expect_get_cluster()
            .returning(|_, _, _| Err(CollaboratorError::ClusterNotFound("c".to_string())));

        let step = DeployStep::new(
            config(),
            Arc::new(resolver_ok()),
            Arc::new(clusters),
            KubectlRunner::new("kubectl", scratch.path()),
        );

        let err = step
            .perform(workspace.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ClusterResolutionFailure { .. }));
        assert!(err.to_string().contains("p/z/c"));
        assert!(dir_entries(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_cluster_metadata() {
        let scratch = tempfile::tempdir().unwrap();
        let workspace = workspace();

        let mut clusters = MockClusterMetadataSource::new();
        clusters.expect_get_cluster().returning(|_, _, _| {
            Ok(ClusterMetadata {
                endpoint: String::new(),
                ..cluster()
            })
        });

        let step = DeployStep::new(
            config(),
            Arc::new(resolver_ok()),
            Arc::new(clusters),
            KubectlRunner::new("kubectl", scratch.path()),
        );

        assert!(matches!(
            step.perform(workspace.path(), &CancellationToken::new()).await,
            Err(DeployError::InvalidClusterMetadata(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_manifests_fail_before_apply() {
        let scratch = tempfile::tempdir().unwrap();
        let empty = tempfile::tempdir().unwrap();

        let step = DeployStep::new(
            config(),
            Arc::new(resolver_ok()),
            Arc::new(clusters_ok()),
            KubectlRunner::new("kubectl", scratch.path()),
        );

        assert!(matches!(
            step.perform(empty.path(), &CancellationToken::new()).await,
            Err(DeployError::Manifest(_))
        ));
        assert!(dir_entries(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let scratch = tempfile::tempdir().unwrap();
        let workspace = workspace();
        let mut resolver = MockCredentialResolver::new();
        resolver.expect_resolve().times(0..=1).returning(|_| Ok(AccessToken::new("t")));
        let mut clusters = MockClusterMetadataSource::new();
        clusters.expect_get_cluster().times(0);

        let step = DeployStep::new(
            config(),
            Arc::new(resolver),
            Arc::new(clusters),
            KubectlRunner::new("kubectl", scratch.path()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            step.perform(workspace.path(), &cancel).await,
            Err(DeployError::Cancelled)
        ));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::test_utils::{stub_invocations, stub_kubectl};

        #[tokio::test]
        async fn test_deploy_and_verify_until_ready() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let workspace = workspace();
            let kubectl = stub_kubectl(bin.path(), 0, "deployment.apps/web created", "");

            let api = MockService::new().on_get_sequence(
                DEPLOYMENT_PATH,
                vec![
                    (200, deployment_json("web", 2, 0)),
                    (200, deployment_json("web", 2, 1)),
                    (200, deployment_json("web", 2, 2)),
                ],
            );
            let runs = Arc::new(AtomicUsize::new(0));

            let step = DeployStep::new(
                config(),
                Arc::new(resolver_ok()),
                Arc::new(clusters_ok()),
                KubectlRunner::new(&kubectl, scratch.path()),
            )
            .with_connector(Arc::new(FixedConnector::new(api.clone().into_client())))
            .with_stage(Box::new(CountingStage { runs: runs.clone() }));

            let outcome = step
                .perform(workspace.path(), &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(outcome.kubeconfig_name, "gke_p_z_c");
            assert_eq!(outcome.manifests, vec![workspace.path().join("k8s/app.yaml")]);
            assert!(outcome.warnings.is_empty());

            let report = outcome.verification.unwrap();
            assert_eq!(
                report.outcomes,
                vec![(
                    VerificationTarget::deployment("default", "web"),
                    TargetOutcome::Ready { polls: 3 }
                )]
            );
            assert_eq!(api.request_count("GET", DEPLOYMENT_PATH), 3);
            assert_eq!(runs.load(Ordering::SeqCst), 1);

            let calls = stub_invocations(bin.path());
            assert_eq!(calls.len(), 1);
            assert!(calls[0].1);
            assert!(calls[0].2.starts_with("apply -f "));
            assert!(dir_entries(scratch.path()).is_empty());
        }

        #[tokio::test]
        async fn test_apply_failure_skips_verification() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let workspace = workspace();
            let kubectl = stub_kubectl(bin.path(), 1, "", "error: the server doesn't have a resource type \"deployments\"");
            let api = MockService::new().on_get(DEPLOYMENT_PATH, 200, &deployment_json("web", 2, 2));
            let runs = Arc::new(AtomicUsize::new(0));

            let step = DeployStep::new(
                config(),
                Arc::new(resolver_ok()),
                Arc::new(clusters_ok()),
                KubectlRunner::new(&kubectl, scratch.path()),
            )
            .with_connector(Arc::new(FixedConnector::new(api.clone().into_client())))
            .with_stage(Box::new(CountingStage { runs: runs.clone() }));

            match step.perform(workspace.path(), &CancellationToken::new()).await {
                Err(DeployError::ToolInvocationFailure(ToolError::NonZeroExit { stderr_tail, .. })) => {
                    assert!(stderr_tail.contains("doesn't have a resource type"));
                }
                other => panic!("unexpected result: {:?}", other),
            }
            assert_eq!(api.request_count("GET", DEPLOYMENT_PATH), 0);
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            assert!(dir_entries(scratch.path()).is_empty());
        }

        #[tokio::test]
        async fn test_rollout_that_never_converges_times_out() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let workspace = workspace();
            let kubectl = stub_kubectl(bin.path(), 0, "deployment.apps/web configured", "");
            let api = MockService::new().on_get(DEPLOYMENT_PATH, 200, &deployment_json("web", 2, 1));

            let step = DeployStep::new(
                config().with_verify_timeout(Duration::from_millis(300)),
                Arc::new(resolver_ok()),
                Arc::new(clusters_ok()),
                KubectlRunner::new(&kubectl, scratch.path()),
            )
            .with_connector(Arc::new(FixedConnector::new(api.into_client())));

            match step.perform(workspace.path(), &CancellationToken::new()).await {
                Err(DeployError::VerificationTimeout(failure)) => {
                    assert_eq!(failure.failures.len(), 1);
                    assert_eq!(
                        failure.failures[0].target,
                        VerificationTarget::deployment("default", "web")
                    );
                }
                other => panic!("unexpected result: {:?}", other),
            }
            assert!(dir_entries(scratch.path()).is_empty());
        }

        #[tokio::test]
        async fn test_verification_disabled_applies_only() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let workspace = workspace();
            let kubectl = stub_kubectl(bin.path(), 0, "deployment.apps/web unchanged", "");
            let api = MockService::new();

            let step = DeployStep::new(
                config().with_verification(false, false),
                Arc::new(resolver_ok()),
                Arc::new(clusters_ok()),
                KubectlRunner::new(&kubectl, scratch.path()),
            )
            .with_connector(Arc::new(FixedConnector::new(api.clone().into_client())));

            let outcome = step
                .perform(workspace.path(), &CancellationToken::new())
                .await
                .unwrap();

            assert!(outcome.verification.is_none());
            assert_eq!(api.request_count("GET", DEPLOYMENT_PATH), 0);
            assert_eq!(stub_invocations(bin.path()).len(), 1);
        }

        #[tokio::test]
        async fn test_services_flag_without_services_warns() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let workspace = workspace();
            let kubectl = stub_kubectl(bin.path(), 0, "deployment.apps/web unchanged", "");

            let step = DeployStep::new(
                config().with_verification(false, true),
                Arc::new(resolver_ok()),
                Arc::new(clusters_ok()),
                KubectlRunner::new(&kubectl, scratch.path()),
            )
            .with_connector(Arc::new(FixedConnector::new(MockService::new().into_client())));

            let outcome = step
                .perform(workspace.path(), &CancellationToken::new())
                .await
                .unwrap();

            assert!(outcome.verification.is_none());
            assert_eq!(outcome.warnings.len(), 1);
        }
    }
}
