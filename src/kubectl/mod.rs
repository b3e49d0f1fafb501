// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! External cluster-management tool execution.

pub mod invocation;
pub mod runner;

pub use invocation::{CommandInvocation, CommandOutput};
pub use runner::KubectlRunner;
