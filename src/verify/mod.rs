// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Post-apply rollout verification.

pub mod readiness;
pub mod target;
pub mod verifier;

pub use readiness::Readiness;
pub use target::{TargetOutcome, TargetState, VerificationTarget};
pub use verifier::{
    PollPolicy, RolloutVerifier, TargetFailure, VerificationFailure, VerificationReport,
    VerificationResult,
};
