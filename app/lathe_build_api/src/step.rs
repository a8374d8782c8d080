/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::time::Duration;

use async_trait::async_trait;
use lathe_core::fs::project::ProjectRoot;

/// The externally-observable outcome of one step. Steps in a rule execute
/// strictly in order; the first non-success aborts the remaining pipeline
/// for that rule.
#[derive(Debug)]
pub enum StepExecutionResult {
    Success,
    /// The step ran but reported failure (typically a non-zero tool exit).
    /// Captured diagnostic output is surfaced to the user verbatim.
    Error {
        description: String,
        stdout: String,
        stderr: String,
    },
}

impl StepExecutionResult {
    pub fn error(description: impl Into<String>) -> StepExecutionResult {
        StepExecutionResult::Error {
            description: description.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepExecutionResult::Success)
    }
}

/// Everything a step may touch while executing. Steps resolve their
/// project-relative paths against `project_root`; nothing else about the
/// machine is part of the step contract.
#[derive(Clone)]
pub struct StepExecutionContext {
    pub project_root: ProjectRoot,
    /// Applied to each external process invocation, not to the step overall.
    pub process_timeout: Option<Duration>,
}

/// A single discrete build action: directory creation, file copy/remove,
/// toolchain invocation, content scrub. Steps are independently retryable
/// by an external scheduler and must not share mutable state with other
/// steps outside their rule's scratch directory.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable short name for diagnostics, e.g. `cxx link`.
    fn short_name(&self) -> &'static str;

    /// Human-readable rendering of what the step will do.
    fn describe(&self) -> String;

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult>;
}
