// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Environment variable kubectl reads its kubeconfig location from
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Default cluster-management tool
pub const KUBECTL: &str = "kubectl";

/// Default cloud CLI used by the credential and cluster collaborators
pub const GCLOUD: &str = "gcloud";

/// Namespace assumed for manifests that do not set one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Prefix of the synthesized kubeconfig name
pub const KUBECONFIG_NAME_PREFIX: &str = "gke";

/// Number of stderr lines carried in failure diagnostics
pub const STDERR_TAIL_LINES: usize = 20;

/// Rollout verification polling configuration
pub mod verify {
    /// Overall verification deadline in seconds
    pub const TIMEOUT_SECS: u64 = 300;
    /// Initial polling interval in seconds
    pub const POLL_INTERVAL_SECS: u64 = 5;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 30;
}

/// Upper bound on a single kubectl invocation in seconds
pub const APPLY_TIMEOUT_SECS: u64 = 600;

/// Configuration environment variables read by the binary
pub mod env {
    pub const PROJECT_ID: &str = "GKE_PROJECT_ID";
    pub const CLUSTER_NAME: &str = "GKE_CLUSTER_NAME";
    pub const CREDENTIALS_ID: &str = "GKE_CREDENTIALS_ID";
    pub const ZONE: &str = "GKE_ZONE";
    pub const MANIFEST_PATTERN: &str = "GKE_MANIFEST_PATTERN";
    pub const VERIFY_DEPLOYMENTS: &str = "GKE_VERIFY_DEPLOYMENTS";
    pub const VERIFY_SERVICES: &str = "GKE_VERIFY_SERVICES";
    pub const VERIFY_TARGETS: &str = "GKE_VERIFY_TARGETS";
    pub const VERIFY_TIMEOUT_SECS: &str = "GKE_VERIFY_TIMEOUT_SECS";
    pub const POLL_INTERVAL_SECS: &str = "GKE_POLL_INTERVAL_SECS";
    pub const POLL_MAX_INTERVAL_SECS: &str = "GKE_POLL_MAX_INTERVAL_SECS";
    pub const APPLY_TIMEOUT_SECS: &str = "GKE_APPLY_TIMEOUT_SECS";
    pub const POST_APPLY_COMMAND: &str = "GKE_POST_APPLY_COMMAND";
    pub const PREFLIGHT: &str = "GKE_PREFLIGHT";
    pub const SCRATCH_DIR: &str = "GKE_SCRATCH_DIR";
    pub const WORKSPACE: &str = "WORKSPACE";
    pub const KUBECTL_PATH: &str = "KUBECTL_PATH";
    pub const GCLOUD_PATH: &str = "GCLOUD_PATH";
}
