// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Verification targets and their per-target state machine

use crate::constants::DEFAULT_NAMESPACE;
use crate::error::DeployError;
use std::fmt;
use std::str::FromStr;

/// A workload whose rollout is checked after apply
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VerificationTarget {
    Deployment { namespace: String, name: String },
    Service { namespace: String, name: String },
}

impl VerificationTarget {
    pub fn deployment(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        VerificationTarget::Deployment {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn service(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        VerificationTarget::Service {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VerificationTarget::Deployment { name, .. } | VerificationTarget::Service { name, .. } => name,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            VerificationTarget::Deployment { namespace, .. }
            | VerificationTarget::Service { namespace, .. } => namespace,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VerificationTarget::Deployment { .. } => "deployment",
            VerificationTarget::Service { .. } => "service",
        }
    }
}

impl fmt::Display for VerificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind(), self.namespace(), self.name())
    }
}

/// Parses `kind/name` or `namespace/kind/name`
impl FromStr for VerificationTarget {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let (namespace, kind, name) = match parts.as_slice() {
            [kind, name] => (DEFAULT_NAMESPACE, *kind, *name),
            [namespace, kind, name] => (*namespace, *kind, *name),
            _ => {
                return Err(DeployError::InvalidConfig(format!(
                    "verification target '{}' must be kind/name or namespace/kind/name",
                    s
                )))
            }
        };

        if namespace.is_empty() || name.is_empty() {
            return Err(DeployError::InvalidConfig(format!(
                "verification target '{}' has an empty namespace or name",
                s
            )));
        }

        match kind.to_ascii_lowercase().as_str() {
            "deployment" | "deployments" | "deploy" => Ok(Self::deployment(namespace, name)),
            "service" | "services" | "svc" => Ok(Self::service(namespace, name)),
            other => Err(DeployError::InvalidConfig(format!(
                "verification target kind '{}' is not supported",
                other
            ))),
        }
    }
}

/// Lifecycle of a single target: Pending -> Polling -> Ready | TimedOut | Errored
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetState {
    Pending,
    Polling,
    Ready,
    TimedOut,
    Errored,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetState::Ready | TargetState::TimedOut | TargetState::Errored)
    }
}

/// Final result for one target
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetOutcome {
    Ready { polls: u32 },
    TimedOut { polls: u32, last_status: String },
    Errored { polls: u32, message: String },
    Cancelled { polls: u32 },
}

impl TargetOutcome {
    /// Terminal state this outcome corresponds to; cancellation has none
    pub fn state(&self) -> Option<TargetState> {
        match self {
            TargetOutcome::Ready { .. } => Some(TargetState::Ready),
            TargetOutcome::TimedOut { .. } => Some(TargetState::TimedOut),
            TargetOutcome::Errored { .. } => Some(TargetState::Errored),
            TargetOutcome::Cancelled { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TargetOutcome::Ready { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            TargetOutcome::Ready { polls }
            | TargetOutcome::TimedOut { polls, .. }
            | TargetOutcome::Errored { polls, .. }
            | TargetOutcome::Cancelled { polls } => *polls,
        }
    }
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOutcome::Ready { polls } => write!(f, "ready after {} poll(s)", polls),
            TargetOutcome::TimedOut { polls, last_status } => {
                write!(f, "timed out after {} poll(s), last status: {}", polls, last_status)
            }
            TargetOutcome::Errored { message, .. } => write!(f, "error: {}", message),
            TargetOutcome::Cancelled { polls } => write!(f, "cancelled after {} poll(s)", polls),
        }
    }
}

/// In-memory progress of one target across polling iterations
#[derive(Clone, Debug)]
pub struct TargetProgress {
    state: TargetState,
    polls: u32,
    last_status: String,
}

impl TargetProgress {
    pub fn new() -> Self {
        Self {
            state: TargetState::Pending,
            polls: 0,
            last_status: "not polled yet".to_string(),
        }
    }

    pub fn state(&self) -> &TargetState {
        &self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Record that a poll is being issued
    pub fn begin_poll(&mut self) {
        debug_assert!(!self.state.is_terminal(), "poll after terminal state");
        self.state = TargetState::Polling;
        self.polls += 1;
    }

    /// Record a "not ready yet" observation
    pub fn observe(&mut self, status: impl Into<String>) {
        self.last_status = status.into();
    }

    pub fn ready(self) -> TargetOutcome {
        TargetOutcome::Ready { polls: self.polls }
    }

    pub fn timed_out(self) -> TargetOutcome {
        TargetOutcome::TimedOut {
            polls: self.polls,
            last_status: self.last_status,
        }
    }

    pub fn errored(self, message: impl Into<String>) -> TargetOutcome {
        TargetOutcome::Errored {
            polls: self.polls,
            message: message.into(),
        }
    }

    pub fn cancelled(self) -> TargetOutcome {
        TargetOutcome::Cancelled { polls: self.polls }
    }
}

impl Default for TargetProgress {
    fn default() -> Self {
        Self::new()
    }
}
