// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rollout verification: polls every target until it is ready or the deadline passes.

use crate::constants::verify::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::verify::readiness::{deployment_readiness, needs_endpoints, service_readiness, Readiness};
use crate::verify::target::{TargetOutcome, TargetProgress, VerificationTarget};
use futures::future::join_all;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::{Api, Client};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Interval between polls of a single target.
///
/// Starts at `initial_interval` and doubles after every poll up to `max_interval`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl PollPolicy {
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            initial_interval,
            max_interval: max_interval.max(initial_interval),
        }
    }

    /// Interval to use after waiting `current`
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(POLL_INTERVAL_SECS),
            Duration::from_secs(POLL_MAX_INTERVAL_SECS),
        )
    }
}

/// A target that did not become ready
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: VerificationTarget,
    pub outcome: TargetOutcome,
}

/// Every failed target of one verification run, in declaration order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationFailure {
    pub failures: Vec<TargetFailure>,
}

impl VerificationFailure {
    pub fn all_timed_out(&self) -> bool {
        self.failures
            .iter()
            .all(|f| matches!(f.outcome, TargetOutcome::TimedOut { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f.outcome, TargetOutcome::Cancelled { .. }))
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} target(s) not ready: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", failure.target, failure.outcome)?;
        }
        Ok(())
    }
}

/// Outcome of every target of a successful verification run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub outcomes: Vec<(VerificationTarget, TargetOutcome)>,
}

pub type VerificationResult = std::result::Result<VerificationReport, VerificationFailure>;

/// Why a poll did not produce an observation
#[derive(Debug)]
enum PollError {
    /// The target cannot become ready: missing, or access is denied
    Fatal(String),
    /// Worth polling again
    Transient(String),
}

fn classify(error: kube::Error) -> PollError {
    match error {
        kube::Error::Api(err) if err.code == 401 || err.code == 403 => {
            PollError::Fatal(format!("access denied ({}): {}", err.code, err.message))
        }
        kube::Error::Api(err) if err.code == 404 => {
            PollError::Fatal(format!("not found after apply: {}", err.message))
        }
        other => PollError::Transient(other.to_string()),
    }
}

/// Polls cluster state through an already authenticated client
pub struct RolloutVerifier {
    client: Client,
    policy: PollPolicy,
}

impl RolloutVerifier {
    pub fn new(client: Client, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    /// Verify all targets concurrently against one shared deadline.
    ///
    /// Never fails fast: every target is driven to a terminal state and all
    /// failures are reported together, in the order the targets were given.
    #[instrument(skip(self, targets, cancel), fields(targets = targets.len()))]
    pub async fn verify(
        &self,
        targets: &[VerificationTarget],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> VerificationResult {
        let deadline = Instant::now() + timeout;

        info!(
            "Verifying rollout of {} target(s) within {:?}",
            targets.len(),
            timeout
        );

        let outcomes = join_all(
            targets
                .iter()
                .map(|target| self.verify_target(target, deadline, cancel)),
        )
        .await;

        let outcomes: Vec<(VerificationTarget, TargetOutcome)> =
            targets.iter().cloned().zip(outcomes).collect();

        let failures: Vec<TargetFailure> = outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_ready())
            .map(|(target, outcome)| TargetFailure {
                target: target.clone(),
                outcome: outcome.clone(),
            })
            .collect();

        if failures.is_empty() {
            info!("All {} target(s) are ready", outcomes.len());
            Ok(VerificationReport { outcomes })
        } else {
            Err(VerificationFailure { failures })
        }
    }

    #[instrument(skip(self, deadline, cancel), fields(target = %target))]
    async fn verify_target(
        &self,
        target: &VerificationTarget,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> TargetOutcome {
        let mut progress = TargetProgress::new();
        let mut interval = self.policy.initial_interval;

        loop {
            progress.begin_poll();

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return progress.cancelled(),
                polled = timeout_at(deadline, self.poll(target)) => polled,
            };

            match polled {
                Err(_) => {
                    warn!("Rollout of {} did not converge in time", target);
                    return progress.timed_out();
                }
                Ok(Ok(Readiness::Ready)) => {
                    info!("{} is ready after {} poll(s)", target, progress.polls());
                    return progress.ready();
                }
                Ok(Ok(Readiness::NotReady(status))) => {
                    debug!("{} not ready yet: {}", target, status);
                    progress.observe(status);
                }
                Ok(Ok(Readiness::Failed(message))) | Ok(Err(PollError::Fatal(message))) => {
                    warn!("Giving up on {}: {}", target, message);
                    return progress.errored(message);
                }
                Ok(Err(PollError::Transient(message))) => {
                    warn!("Polling {} failed, retrying: {}", target, message);
                    progress.observe(message);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("Rollout of {} did not converge in time", target);
                return progress.timed_out();
            }

            let wait = interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return progress.cancelled(),
                _ = sleep(wait) => {}
            }

            interval = self.policy.next(interval);
        }
    }

    /// One observation of the target through the cluster API
    async fn poll(&self, target: &VerificationTarget) -> Result<Readiness, PollError> {
        match target {
            VerificationTarget::Deployment { namespace, name } => {
                let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                let deployment = deployments.get(name).await.map_err(classify)?;
                Ok(deployment_readiness(&deployment))
            }
            VerificationTarget::Service { namespace, name } => {
                let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
                let service = services.get(name).await.map_err(classify)?;

                if !needs_endpoints(&service) {
                    return Ok(service_readiness(&service, None));
                }

                let endpoints: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
                let backing = endpoints.get_opt(name).await.map_err(classify)?;
                Ok(service_readiness(&service, backing.as_ref()))
            }
        }
    }
}
