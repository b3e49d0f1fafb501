// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for kubeconfig synthesis, client creation, and manifest handling.

pub mod client;
pub mod kubeconfig;
pub mod manifests;

pub use client::create_client;
pub use kubeconfig::synthesize;
pub use manifests::{discover_targets, merge_targets, resolve_manifests};
