/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lathe_core::fs::fs_util;
use lathe_core::fs::project::ProjectRelativePathBuf;

use crate::step::Step;
use crate::step::StepExecutionContext;
use crate::step::StepExecutionResult;

/// An in-place rewrite of a produced file that removes non-reproducible
/// metadata (timestamps, absolute build-machine paths). Scrubbers must be
/// deterministic and must preserve file length where the consumer of the
/// file is sensitive to offsets.
pub trait FileScrubber: Send + Sync {
    fn scrub(&self, project_root: &Path, contents: &mut Vec<u8>) -> anyhow::Result<()>;
}

/// Applies a list of scrubbers to one output file.
pub struct FileScrubberStep {
    pub path: ProjectRelativePathBuf,
    pub scrubbers: Vec<Arc<dyn FileScrubber>>,
}

#[async_trait]
impl Step for FileScrubberStep {
    fn short_name(&self) -> &'static str {
        "scrub"
    }

    fn describe(&self) -> String {
        format!("scrub {}", self.path)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        if self.scrubbers.is_empty() {
            return Ok(StepExecutionResult::Success);
        }
        let path = ctx.project_root.resolve(&self.path);
        let mut contents = fs_util::read(&path)?;
        for scrubber in &self.scrubbers {
            scrubber.scrub(ctx.project_root.root(), &mut contents)?;
        }
        fs_util::write(&path, &contents)?;
        Ok(StepExecutionResult::Success)
    }
}
