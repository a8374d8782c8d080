/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dupe::Dupe;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::rule::RuleCapability;
use lathe_build_api::rule::RuleScheduleInfo;
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::step::Step;
use lathe_build_api::step::StepExecutionContext;
use lathe_build_api::step::StepExecutionResult;
use lathe_build_api::steps::fs::MakeCleanDirectoryStep;
use lathe_build_api::steps::fs::MkdirStep;
use lathe_build_api::steps::fs::RmStep;
use lathe_build_api::steps::scrub::FileScrubberStep;
use lathe_build_api::steps::tool::ToolStep;
use lathe_core::fs::fs_util;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::paths;
use lathe_core::target::BuildTarget;
use thiserror::Error;

use crate::linker::Linker;
use crate::linker_map_mode::LinkerMapMode;
use crate::strip::CxxStrip;
use crate::strip_style::StripStyle;

#[derive(Debug, Error)]
enum CxxLinkError {
    #[error("CxxLink {0} should not be created with CxxStrip flavors")]
    CreatedWithStripFlavors(BuildTarget),
    #[error("CxxLink {0} should be created with one of the LinkerMapMode flavors")]
    MissingLinkerMapMode(BuildTarget),
}

/// One linker argument: either a literal string or a path, where the rule
/// producing the path becomes a dependency of the link.
#[derive(Clone, Debug)]
pub enum LinkArg {
    Literal(String),
    Source(SourcePath),
}

impl LinkArg {
    pub fn literal(arg: impl Into<String>) -> LinkArg {
        LinkArg::Literal(arg.into())
    }

    pub fn source(source: SourcePath) -> LinkArg {
        LinkArg::Source(source)
    }

    pub fn stringify(&self) -> String {
        match self {
            LinkArg::Literal(s) => s.clone(),
            LinkArg::Source(s) => s.path().as_str().to_owned(),
        }
    }

    /// Whether this argument is an object-file input that a file-list
    /// capable linker reads from a separate file.
    fn is_object_input(&self) -> bool {
        matches!(self, LinkArg::Source(s) if s.path().as_str().ends_with(".o"))
    }
}

/// Quotes an argument for a `@argfile`, the way compiler frontends expect:
/// arguments with whitespace or quoting characters are wrapped in double
/// quotes with `\` escapes.
pub(crate) fn quote_arg_for_arg_file(arg: &str) -> String {
    if arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '\\')
    {
        let mut quoted = String::with_capacity(arg.len() + 2);
        quoted.push('"');
        for c in arg.chars() {
            if c == '"' || c == '\\' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted.push('"');
        quoted
    } else {
        arg.to_owned()
    }
}

/// Materializes the final argument list into the argument file (and the
/// file list, when the linker prefers that form for object inputs) before
/// the linker runs.
struct PrepareForLinkStep {
    arg_file: ProjectRelativePathBuf,
    file_list: ProjectRelativePathBuf,
    output: ProjectRelativePathBuf,
    args: Vec<LinkArg>,
    linker_map_args: Vec<String>,
    linker: Arc<dyn Linker>,
}

#[async_trait]
impl Step for PrepareForLinkStep {
    fn short_name(&self) -> &'static str {
        "cxx prepare for link"
    }

    fn describe(&self) -> String {
        format!("prepare link args in {}", self.arg_file)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        let mut args: Vec<String> = vec!["-o".to_owned(), self.output.as_str().to_owned()];
        args.extend(self.linker_map_args.iter().cloned());

        match self.linker.file_list_args(&self.file_list) {
            Some(file_list_args) => {
                let mut listed = Vec::new();
                for arg in &self.args {
                    if arg.is_object_input() {
                        listed.push(arg.stringify());
                    } else {
                        args.push(arg.stringify());
                    }
                }
                args.extend(file_list_args);
                let mut contents = listed.join("\n");
                contents.push('\n');
                fs_util::write(ctx.project_root.resolve(&self.file_list), contents)?;
            }
            None => {
                args.extend(self.args.iter().map(LinkArg::stringify));
            }
        }

        let mut contents = args
            .iter()
            .map(|a| quote_arg_for_arg_file(a))
            .collect::<Vec<_>>()
            .join("\n");
        contents.push('\n');
        fs_util::write(ctx.project_root.resolve(&self.arg_file), contents)?;
        Ok(StepExecutionResult::Success)
    }
}

/// Produces a single native link action: invokes the linker over the
/// argument list, emits the linked artifact and (when enabled) the sibling
/// linker map, and scrubs non-reproducible metadata out of the output.
pub struct CxxLink {
    params: BuildRuleParams,
    linker: Arc<dyn Linker>,
    output: ProjectRelativePathBuf,
    args: Vec<LinkArg>,
    /// Roots of the projects dependency inputs come from; the scrubber
    /// rewrites paths under these.
    dependency_roots: Vec<PathBuf>,
    schedule_info: Option<RuleScheduleInfo>,
    cacheable: bool,
}

impl CxxLink {
    pub fn new(
        params: BuildRuleParams,
        linker: Arc<dyn Linker>,
        output: ProjectRelativePathBuf,
        args: Vec<LinkArg>,
        dependency_roots: Vec<PathBuf>,
        schedule_info: Option<RuleScheduleInfo>,
        cacheable: bool,
    ) -> anyhow::Result<CxxLink> {
        Self::perform_checks(params.target())?;
        Ok(CxxLink {
            params,
            linker,
            output,
            args,
            dependency_roots,
            schedule_info,
            cacheable,
        })
    }

    fn perform_checks(target: &BuildTarget) -> anyhow::Result<()> {
        if target.flavors().contains(&CxxStrip::rule_flavor())
            || StripStyle::domain().contains_any_of(target)
        {
            return Err(CxxLinkError::CreatedWithStripFlavors(target.dupe()).into());
        }
        if !LinkerMapMode::domain().contains_any_of(target) {
            return Err(CxxLinkError::MissingLinkerMapMode(target.dupe()).into());
        }
        Ok(())
    }

    pub fn linker(&self) -> &Arc<dyn Linker> {
        &self.linker
    }

    pub fn args(&self) -> &[LinkArg] {
        &self.args
    }

    fn linker_map_enabled(&self) -> bool {
        LinkerMapMode::is_enabled_for_target(self.params.target())
    }
}

impl BuildRule for CxxLink {
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
        let linker_map = self.linker.linker_map_path(&self.output);
        let mut linker_map_args = Vec::new();
        if let Some(map) = &linker_map {
            if self.linker_map_enabled() {
                buildable.record_artifact(map.clone());
                linker_map_args = self.linker.linker_map_args(map);
            }
        }

        let target = self.params.target();
        let scratch_dir = paths::scratch_path(target, "%s-tmp");
        let arg_file = paths::scratch_path(target, "%s__argfile.txt");
        let file_list = paths::scratch_path(target, "%s__filelist.txt");

        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        if let Some(parent) = self.output.parent() {
            steps.push(Box::new(MkdirStep {
                path: parent.to_owned(),
            }));
        }
        steps.push(Box::new(MakeCleanDirectoryStep {
            path: scratch_dir.clone(),
        }));
        steps.push(Box::new(RmStep {
            path: arg_file.clone(),
        }));
        steps.push(Box::new(RmStep {
            path: file_list.clone(),
        }));
        steps.push(Box::new(PrepareForLinkStep {
            arg_file: arg_file.clone(),
            file_list,
            output: self.output.clone(),
            args: self.args.clone(),
            linker_map_args,
            linker: self.linker.dupe(),
        }));
        steps.push(Box::new(
            ToolStep::new(
                "cxx link",
                self.linker.tool().clone(),
                vec![format!("@{}", arg_file)],
            )
            // Linker temp files land in the rule's own scratch dir.
            .with_env([("TMPDIR", scratch_dir.as_str())]),
        ));
        steps.push(Box::new(FileScrubberStep {
            path: self.output.clone(),
            scrubbers: self.linker.scrubbers(self.dependency_roots.clone()),
        }));
        Ok(steps)
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        Some(&self.output)
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    fn schedule_info(&self) -> RuleScheduleInfo {
        self.schedule_info.unwrap_or(RuleScheduleInfo::DEFAULT)
    }

    fn capabilities(&self) -> &[RuleCapability] {
        &[RuleCapability::LinkedBinary, RuleCapability::IsNativeLinkable]
    }

    fn linker_map_path(&self) -> Option<ProjectRelativePathBuf> {
        if !self.linker_map_enabled() {
            return None;
        }
        self.linker.linker_map_path(&self.output)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use lathe_build_api::tool::Tool;
    use lathe_core::flavor::FlavorConvertible;

    use super::*;
    use crate::linker::GnuLinker;

    fn linker() -> Arc<dyn Linker> {
        Arc::new(GnuLinker::new(Tool::new("clang")))
    }

    fn link_target(flavors: &[LinkerMapMode]) -> anyhow::Result<BuildTarget> {
        Ok(BuildTarget::new("lib", "foo")?
            .with_appended_flavors(flavors.iter().map(|m| m.flavor())))
    }

    fn new_link(target: BuildTarget) -> anyhow::Result<CxxLink> {
        CxxLink::new(
            BuildRuleParams::new(target.dupe()),
            linker(),
            paths::gen_path(&target, "%s"),
            vec![LinkArg::source(SourcePath::Path(
                ProjectRelativePathBuf::unchecked_new("lib/a.o".to_owned()),
            ))],
            vec![],
            None,
            true,
        )
    }

    #[test]
    fn test_requires_linker_map_mode_flavor() -> anyhow::Result<()> {
        assert!(new_link(link_target(&[])?).is_err());
        assert!(new_link(link_target(&[LinkerMapMode::LinkerMap])?).is_ok());
        assert!(new_link(link_target(&[LinkerMapMode::NoLinkerMap])?).is_ok());
        Ok(())
    }

    #[test]
    fn test_rejects_strip_flavors() -> anyhow::Result<()> {
        let target = link_target(&[LinkerMapMode::LinkerMap])?
            .with_appended_flavors([CxxStrip::rule_flavor()]);
        assert!(new_link(target).is_err());

        let target = link_target(&[LinkerMapMode::LinkerMap])?
            .with_appended_flavors([StripStyle::AllSymbols.flavor()]);
        assert!(new_link(target).is_err());
        Ok(())
    }

    #[test]
    fn test_linker_map_only_with_flavor() -> anyhow::Result<()> {
        let with_map = new_link(link_target(&[LinkerMapMode::LinkerMap])?)?;
        assert!(BuildRule::linker_map_path(&with_map).is_some());

        let without_map = new_link(link_target(&[LinkerMapMode::NoLinkerMap])?)?;
        assert!(BuildRule::linker_map_path(&without_map).is_none());
        Ok(())
    }

    #[test]
    fn test_quote_arg_for_arg_file() {
        assert_eq!(quote_arg_for_arg_file("-lfoo"), "-lfoo");
        assert_eq!(quote_arg_for_arg_file("a b"), "\"a b\"");
        assert_eq!(quote_arg_for_arg_file("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_arg_for_arg_file(""), "\"\"");
    }
}
