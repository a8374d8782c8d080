/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::step::Step;
use lathe_build_api::steps::fs::MkdirStep;
use lathe_build_api::steps::fs::RmStep;
use lathe_build_api::steps::tool::ToolStep;
use lathe_build_api::tool::Tool;
use lathe_core::flavor::Flavor;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;

/// Extracts DWARF debug info from a linked binary into a standalone
/// `.dSYM` bundle, so the binary itself can be stripped.
pub struct AppleDsym {
    params: BuildRuleParams,
    dsymutil: Tool,
    binary: SourcePath,
    output: ProjectRelativePathBuf,
}

impl AppleDsym {
    pub fn rule_flavor() -> Flavor {
        Flavor::unchecked_new("apple-dsym")
    }

    pub fn new(
        params: BuildRuleParams,
        dsymutil: Tool,
        binary: SourcePath,
        output: ProjectRelativePathBuf,
    ) -> AppleDsym {
        AppleDsym {
            params,
            dsymutil,
            binary,
            output,
        }
    }
}

impl BuildRule for AppleDsym {
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
        // dsymutil refuses to overwrite a stale bundle.
        steps.push(Box::new(RmStep {
            path: self.output.clone(),
        }));
        steps.push(Box::new(ToolStep::new(
            "dsymutil",
            self.dsymutil.clone(),
            vec![
                "-o".to_owned(),
                self.output.as_str().to_owned(),
                self.binary.path().as_str().to_owned(),
            ],
        )));
        Ok(steps)
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        Some(&self.output)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
