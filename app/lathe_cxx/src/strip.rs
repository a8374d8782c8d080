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
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::step::Step;
use lathe_build_api::steps::fs::CopyStep;
use lathe_build_api::steps::fs::MkdirStep;
use lathe_build_api::steps::tool::ToolStep;
use lathe_build_api::tool::Tool;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;
use thiserror::Error;

use crate::linker_map_mode::LinkerMapMode;
use crate::strip_style::StripStyle;

#[derive(Debug, Error)]
enum CxxStripError {
    #[error("CxxStrip rule {0} should contain the `stripped` flavor")]
    MissingRuleFlavor(BuildTarget),
    #[error("CxxStrip rule {0} should contain one of the strip style flavors")]
    MissingStripStyle(BuildTarget),
    #[error(
        "CxxStrip rule {0} should contain a linker map flavor, as the upstream link output \
         path depends on it"
    )]
    MissingLinkerMapMode(BuildTarget),
    #[error("CxxStrip rule {0} must not strip in place (output equals input: {1})")]
    InPlaceStrip(BuildTarget, ProjectRelativePathBuf),
}

/// Copies an upstream link output and strips symbols from the copy per the
/// configured strip style. Never strips in place; the unstripped artifact
/// stays available for debug-format wrapping. If you don't want stripping,
/// depend on CxxLink directly.
pub struct CxxStrip {
    params: BuildRuleParams,
    strip_style: StripStyle,
    input: SourcePath,
    strip: Tool,
    output: ProjectRelativePathBuf,
}

impl std::fmt::Debug for CxxStrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CxxStrip")
            .field("output", &self.output)
            .finish()
    }
}

impl CxxStrip {
    /// Used to identify strip rules in the graph. Appended ONLY to the
    /// build target passed to the CxxStrip constructor; appending it
    /// anywhere else just skews other rules' output paths.
    pub fn rule_flavor() -> Flavor {
        Flavor::unchecked_new("stripped")
    }

    pub fn new(
        params: BuildRuleParams,
        strip_style: StripStyle,
        input: SourcePath,
        strip: Tool,
        output: ProjectRelativePathBuf,
    ) -> anyhow::Result<CxxStrip> {
        Self::perform_checks(params.target(), &input, &output)?;
        Ok(CxxStrip {
            params,
            strip_style,
            input,
            strip,
            output,
        })
    }

    fn perform_checks(
        target: &BuildTarget,
        input: &SourcePath,
        output: &ProjectRelativePathBuf,
    ) -> anyhow::Result<()> {
        if !target.flavors().contains(&CxxStrip::rule_flavor()) {
            return Err(CxxStripError::MissingRuleFlavor(target.dupe()).into());
        }
        if !StripStyle::domain().contains_any_of(target) {
            return Err(CxxStripError::MissingStripStyle(target.dupe()).into());
        }
        if !LinkerMapMode::domain().contains_any_of(target) {
            return Err(CxxStripError::MissingLinkerMapMode(target.dupe()).into());
        }
        if input.path() == &**output {
            return Err(CxxStripError::InPlaceStrip(target.dupe(), output.clone()).into());
        }
        Ok(())
    }

    pub fn strip_style(&self) -> StripStyle {
        self.strip_style
    }

    /// Strip-style bookkeeping for descriptions: the canonical unstripped
    /// target drops the rule flavor and the style flavor.
    pub fn remove_strip_style_flavors(
        target: &BuildTarget,
        style: Option<StripStyle>,
    ) -> BuildTarget {
        let mut target = target.without_flavors([&CxxStrip::rule_flavor()]);
        if let Some(style) = style {
            target = target.without_flavors([&style.flavor()]);
        }
        target
    }

    /// The inverse of [`remove_strip_style_flavors`](Self::remove_strip_style_flavors):
    /// restores the style flavor (but never the rule flavor, which belongs
    /// to the strip rule alone).
    pub fn restore_strip_style_flavor(
        target: &BuildTarget,
        style: Option<StripStyle>,
    ) -> BuildTarget {
        match style {
            Some(style) => target.with_appended_flavors([style.flavor()]),
            None => target.dupe(),
        }
    }
}

impl BuildRule for CxxStrip {
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
        steps.push(Box::new(CopyStep {
            from: self.input.path().to_owned(),
            to: self.output.clone(),
        }));
        if let Some(mut args) = self.strip_style.strip_tool_args() {
            args.push(self.output.as_str().to_owned());
            steps.push(Box::new(ToolStep::new("strip", self.strip.clone(), args)));
        }
        Ok(steps)
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
