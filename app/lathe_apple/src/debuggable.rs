/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use dupe::Dupe;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::rule::RuleCapability;
use lathe_build_api::step::Step;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;
use thiserror::Error;

#[derive(Debug, Error)]
enum DebuggableBinaryError {
    #[error("Internal error: {0} is not a linked binary and cannot be wrapped for debugging")]
    NotWrappable(BuildTarget),
    #[error("Internal error: {0} has no output to forward")]
    NoOutput(BuildTarget),
}

/// The debug-format wrapper: presents one binary (stripped or not,
/// according to the debug format) and drags the matching debug-info
/// artifacts along as dependencies. Has no steps of its own; the output
/// forwards the wrapped binary's.
pub struct AppleDebuggableBinary {
    params: BuildRuleParams,
    output: ProjectRelativePathBuf,
}

impl AppleDebuggableBinary {
    /// Only rules that actually produced a linked binary can be wrapped;
    /// anything else (e.g. a stub write) is returned bare by the
    /// dispatcher.
    pub fn can_wrap_rule(rule: &dyn BuildRule) -> bool {
        rule.has_capability(RuleCapability::LinkedBinary)
    }

    pub fn new(
        target: BuildTarget,
        binary: Arc<dyn BuildRule>,
        debug_deps: Vec<Arc<dyn BuildRule>>,
    ) -> anyhow::Result<AppleDebuggableBinary> {
        if !Self::can_wrap_rule(&*binary) {
            return Err(DebuggableBinaryError::NotWrappable(binary.target().dupe()).into());
        }
        let output = binary
            .output_path()
            .ok_or_else(|| DebuggableBinaryError::NoOutput(binary.target().dupe()))?
            .to_owned();
        let params = BuildRuleParams::new(target)
            .with_declared_deps([binary])
            .append_extra_deps(debug_deps);
        Ok(AppleDebuggableBinary { params, output })
    }
}

impl BuildRule for AppleDebuggableBinary {
    fn target(&self) -> &BuildTarget {
        self.params.target()
    }

    fn deps(&self) -> Vec<Arc<dyn BuildRule>> {
        self.params.deps()
    }

    fn build_steps(
        &self,
        _buildable: &Arc<BuildableContext>,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        Ok(Vec::new())
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        Some(&self.output)
    }

    fn capabilities(&self) -> &[RuleCapability] {
        &[RuleCapability::LinkedBinary]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
