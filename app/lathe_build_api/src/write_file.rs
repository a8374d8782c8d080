/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;

use crate::rule::BuildRule;
use crate::rule::BuildRuleParams;
use crate::rule::BuildableContext;
use crate::step::Step;
use crate::steps::fs::MkdirStep;
use crate::steps::fs::WriteFileStep;

/// Writes fixed bytes to the output path. Used for data-driven rule
/// substitution, e.g. copying a precomputed stub binary in place of an
/// entire compile/link pipeline.
pub struct WriteFile {
    params: BuildRuleParams,
    contents: Vec<u8>,
    output: ProjectRelativePathBuf,
    executable: bool,
}

impl WriteFile {
    pub fn new(
        params: BuildRuleParams,
        contents: Vec<u8>,
        output: ProjectRelativePathBuf,
        executable: bool,
    ) -> WriteFile {
        WriteFile {
            params,
            contents,
            output,
            executable,
        }
    }
}

impl BuildRule for WriteFile {
    fn target(&self) -> &BuildTarget {
        self.params.target()
    }

    fn deps(&self) -> Vec<Arc<dyn BuildRule>> {
        self.params.deps()
    }

    fn build_steps(
        &self,
        buildable: &Arc<BuildableContext>,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        buildable.record_artifact(self.output.clone());
        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        if let Some(parent) = self.output.parent() {
            steps.push(Box::new(MkdirStep {
                path: parent.to_owned(),
            }));
        }
        steps.push(Box::new(WriteFileStep {
            path: self.output.clone(),
            contents: self.contents.clone(),
            executable: self.executable,
        }));
        Ok(steps)
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        Some(&self.output)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
