// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Readiness predicates for Deployments and Services

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Endpoints, Service};

/// Result of evaluating one observation of a target
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
    /// The platform reports the rollout cannot make progress
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// A Deployment is ready when the latest generation is observed, every desired
/// replica runs the new template and is ready, and no old replica is left.
/// `ReplicaFailure` and an exceeded progress deadline are reported as failures.
pub fn deployment_readiness(deployment: &Deployment) -> Readiness {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);

    let Some(status) = deployment.status.as_ref() else {
        return Readiness::NotReady("no status reported yet".to_string());
    };

    if let (Some(generation), Some(observed)) =
        (deployment.metadata.generation, status.observed_generation)
    {
        if observed < generation {
            return Readiness::NotReady(format!(
                "waiting for generation {} to be observed (at {})",
                generation, observed
            ));
        }
    }

    if let Some(failure) = status.conditions.as_ref().and_then(|conditions| {
        conditions.iter().find(|c| {
            (c.type_ == "ReplicaFailure" && c.status == "True")
                || (c.type_ == "Progressing"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("ProgressDeadlineExceeded"))
        })
    }) {
        return Readiness::Failed(format!(
            "{}: {}",
            failure.reason.as_deref().unwrap_or(&failure.type_),
            failure.message.as_deref().unwrap_or("no message")
        ));
    }

    let updated = status.updated_replicas.unwrap_or(0);
    if updated != desired {
        return Readiness::NotReady(format!("{}/{} replicas updated", updated, desired));
    }

    let total = status.replicas.unwrap_or(0);
    if total > updated {
        return Readiness::NotReady(format!(
            "{} old replica(s) pending termination",
            total - updated
        ));
    }

    let ready = status.ready_replicas.unwrap_or(0);
    if ready != updated {
        return Readiness::NotReady(format!("{}/{} replicas ready", ready, desired));
    }

    if let Some(available) = status.available_replicas {
        if available < updated {
            return Readiness::NotReady(format!(
                "{}/{} replicas available",
                available, desired
            ));
        }
    }

    Readiness::Ready
}

/// Whether the Service is exposed through a cloud load balancer
pub fn is_load_balancer(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .is_some_and(|t| t == "LoadBalancer")
}

/// Whether readiness depends on the Service's backing endpoints
pub fn needs_endpoints(service: &Service) -> bool {
    let service_type = service.spec.as_ref().and_then(|s| s.type_.as_deref());
    !matches!(service_type, Some("LoadBalancer") | Some("ExternalName"))
}

/// A Service is ready when a load balancer address has been assigned (for
/// `LoadBalancer` services), or when it has at least one backing endpoint
/// address (for cluster-internal services). `ExternalName` services are ready
/// as soon as they exist.
pub fn service_readiness(service: &Service, endpoints: Option<&Endpoints>) -> Readiness {
    if is_load_balancer(service) {
        let assigned = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .is_some_and(|ingress| {
                ingress.iter().any(|i| {
                    i.ip.as_deref().is_some_and(|ip| !ip.is_empty())
                        || i.hostname.as_deref().is_some_and(|h| !h.is_empty())
                })
            });

        return if assigned {
            Readiness::Ready
        } else {
            Readiness::NotReady("waiting for load balancer address".to_string())
        };
    }

    if !needs_endpoints(service) {
        return Readiness::Ready;
    }

    let addresses = endpoints
        .and_then(|e| e.subsets.as_ref())
        .map(|subsets| {
            subsets
                .iter()
                .map(|s| s.addresses.as_ref().map_or(0, |a| a.len()))
                .sum::<usize>()
        })
        .unwrap_or(0);

    if addresses > 0 {
        Readiness::Ready
    } else {
        Readiness::NotReady("no ready endpoints".to_string())
    }
}
