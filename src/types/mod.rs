// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster access data types.

pub mod cluster;
pub mod kubeconfig;

pub use cluster::{AccessToken, ClusterCredentials, ClusterMetadata};
pub use kubeconfig::KubeConfig;
