// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deploy step orchestration and the collaborators it depends on.

pub mod collaborators;
pub mod gcloud;
pub mod stage;
pub mod step;
pub mod validation;

pub use collaborators::{
    ClientCache, ClusterConnector, ClusterMetadataSource, CredentialResolver, FixedConnector,
    KubeconfigConnector, ProjectCatalog,
};
pub use gcloud::{GcloudClient, GcloudClientFactory};
pub use stage::{KubectlStage, PostApplyStage, StageContext};
pub use step::{DeployOutcome, DeployStep};
pub use validation::preflight;
