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
use lathe_build_api::steps::fs::MkdirStep;
use lathe_build_api::steps::tool::ToolStep;
use lathe_build_api::tool::Tool;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;
use lathe_cxx::library_type::LibraryType;
use lathe_cxx::link::LinkArg;
use lathe_cxx::linker_map_mode::LinkerMapMode;
use lathe_cxx::preprocessor::CxxPreprocessorInput;
use thiserror::Error;

use crate::config::SwiftConfig;
use crate::util::normalize_swift_module_name;
use crate::util::to_swift_header_name;
use crate::util::SWIFT_MAIN_FILENAME;

const INCLUDE_FLAG: &str = "-I";

#[derive(Debug, Error)]
enum SwiftCompileError {
    #[error("SwiftCompile {0} should not be created with a LinkerMapMode flavor")]
    CreatedWithLinkerMapMode(BuildTarget),
    #[error("SwiftCompile {0} should not be created with the `shared` flavor")]
    CreatedWithSharedFlavor(BuildTarget),
}

/// Compiles a module's Swift sources into a `.swiftmodule`, an object file
/// and a generated Objective-C interop header. Not a runnable artifact by
/// itself: the module and object are exposed as extra linker arguments the
/// enclosing native link folds in. The dependency is strictly one-way,
/// Swift into native link, never reversed.
pub struct SwiftCompile {
    params: BuildRuleParams,
    swiftc: Tool,
    module_name: String,
    output_dir: ProjectRelativePathBuf,
    module_path: ProjectRelativePathBuf,
    object_path: ProjectRelativePathBuf,
    header_path: ProjectRelativePathBuf,
    srcs: Vec<SourcePath>,
    has_main_entry: bool,
    enable_objc_interop: bool,
    bridging_header: Option<SourcePath>,
    /// Exported/private header tree paths the bridging header's imports
    /// resolve against.
    bridging_header_search_paths: Vec<ProjectRelativePathBuf>,
    framework_search_paths: Vec<ProjectRelativePathBuf>,
    /// `.swiftmodule` directories of sibling Swift modules this one
    /// imports.
    module_search_paths: Vec<ProjectRelativePathBuf>,
    preprocessor_input: CxxPreprocessorInput,
    config: SwiftConfig,
}

pub struct SwiftCompileArgs {
    pub module_name: String,
    pub srcs: Vec<SourcePath>,
    pub enable_objc_interop: Option<bool>,
    pub bridging_header: Option<SourcePath>,
    pub bridging_header_search_paths: Vec<ProjectRelativePathBuf>,
    pub framework_search_paths: Vec<ProjectRelativePathBuf>,
    pub module_search_paths: Vec<ProjectRelativePathBuf>,
    pub preprocessor_input: CxxPreprocessorInput,
}

impl SwiftCompile {
    pub fn new(
        params: BuildRuleParams,
        config: SwiftConfig,
        swiftc: Tool,
        output_dir: ProjectRelativePathBuf,
        args: SwiftCompileArgs,
    ) -> anyhow::Result<SwiftCompile> {
        Self::perform_checks(params.target())?;

        // The interop header keeps the raw module name; the module and
        // object use the escaped one.
        let header_path =
            output_dir.join(format!("{}.h", to_swift_header_name(&args.module_name)));
        let escaped_module_name = normalize_swift_module_name(&args.module_name);
        let module_path = output_dir.join(format!("{}.swiftmodule", escaped_module_name));
        let object_path = output_dir.join(format!("{}.o", escaped_module_name));

        let has_main_entry = args.srcs.iter().any(|src| {
            src.path()
                .file_name()
                .eq_ignore_ascii_case(SWIFT_MAIN_FILENAME)
        });

        Ok(SwiftCompile {
            params,
            swiftc,
            module_name: escaped_module_name,
            output_dir,
            module_path,
            object_path,
            header_path,
            srcs: args.srcs,
            has_main_entry,
            enable_objc_interop: args.enable_objc_interop.unwrap_or(true),
            bridging_header: args.bridging_header,
            bridging_header_search_paths: args.bridging_header_search_paths,
            framework_search_paths: args.framework_search_paths,
            module_search_paths: args.module_search_paths,
            preprocessor_input: args.preprocessor_input,
            config,
        })
    }

    fn perform_checks(target: &BuildTarget) -> anyhow::Result<()> {
        if LinkerMapMode::domain().contains_any_of(target) {
            return Err(SwiftCompileError::CreatedWithLinkerMapMode(target.dupe()).into());
        }
        if target.flavors().contains(&LibraryType::Shared.flavor()) {
            return Err(SwiftCompileError::CreatedWithSharedFlavor(target.dupe()).into());
        }
        Ok(())
    }

    /// Preprocessor search paths for the clang importer: header maps first
    /// so a hit there shadows the stat-based fallback in the include roots.
    /// Swift disallows a space between `-I` and its path, hence the
    /// concatenated form.
    fn swift_include_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for header_map in &self.preprocessor_input.header_maps {
            args.push(format!("{}{}", INCLUDE_FLAG, header_map));
        }
        for root in &self.preprocessor_input.include_roots {
            args.push(format!("{}{}", INCLUDE_FLAG, root));
        }
        args
    }

    /// The compiler argument list. Ordering is part of the rule key; keep
    /// it stable.
    pub(crate) fn compiler_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if let Some(bridging_header) = &self.bridging_header {
            args.push("-import-objc-header".to_owned());
            args.push(bridging_header.path().as_str().to_owned());
            // The bridging header needs the exported headers for its
            // imports.
            for path in &self.bridging_header_search_paths {
                args.push(INCLUDE_FLAG.to_owned());
                args.push(path.as_str().to_owned());
            }
        }

        for framework in &self.framework_search_paths {
            args.push("-F".to_owned());
            args.push(framework.as_str().to_owned());
        }

        for include in self.swift_include_args() {
            args.push("-Xcc".to_owned());
            args.push(include);
        }

        for module_dir in &self.module_search_paths {
            args.push(INCLUDE_FLAG.to_owned());
            args.push(module_dir.as_str().to_owned());
        }

        for root in &self.preprocessor_input.include_roots {
            args.push(INCLUDE_FLAG.to_owned());
            args.push(root.as_str().to_owned());
        }

        args.extend(self.config.compiler_flags.iter().cloned());

        args.push("-enable-testing".to_owned());
        args.push("-c".to_owned());
        if self.enable_objc_interop {
            args.push("-enable-objc-interop".to_owned());
        }
        if !self.has_main_entry {
            args.push("-parse-as-library".to_owned());
        }
        args.push("-module-name".to_owned());
        args.push(self.module_name.clone());
        args.push("-emit-module".to_owned());
        args.push("-emit-module-path".to_owned());
        args.push(self.module_path.as_str().to_owned());
        args.push("-o".to_owned());
        args.push(self.object_path.as_str().to_owned());
        args.push("-emit-objc-header-path".to_owned());
        args.push(self.header_path.as_str().to_owned());

        for src in &self.srcs {
            args.push(src.path().as_str().to_owned());
        }
        args
    }

    /// The extra linker inputs the enclosing native link folds in.
    pub fn link_args(&self) -> Vec<LinkArg> {
        vec![
            LinkArg::literal("-Xlinker"),
            LinkArg::literal("-add_ast_path"),
            LinkArg::source(SourcePath::BuildTargetOutput {
                target: self.params.target().dupe(),
                path: self.module_path.clone(),
            }),
            LinkArg::source(SourcePath::BuildTargetOutput {
                target: self.params.target().dupe(),
                path: self.object_path.clone(),
            }),
        ]
    }

    pub fn module_path(&self) -> &ProjectRelativePath {
        &self.module_path
    }

    pub fn object_path(&self) -> &ProjectRelativePath {
        &self.object_path
    }
}

impl BuildRule for SwiftCompile {
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
        buildable.record_artifact(self.output_dir.clone());
        Ok(vec![
            Box::new(MkdirStep {
                path: self.output_dir.clone(),
            }),
            Box::new(ToolStep::new(
                "swift compile",
                self.swiftc.clone(),
                self.compiler_args(),
            )),
        ])
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        Some(&self.output_dir)
    }

    fn capabilities(&self) -> &[RuleCapability] {
        &[RuleCapability::ProducesCompiledObject]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
