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
use lathe_build_api::resolver::BuildRuleResolver;
use lathe_build_api::resolver::DispatchResult;
use lathe_build_api::resolver::RuleDescription;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::rule::RuleCapability;
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::step::Step;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::flavor::FlavorDomain;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::paths;
use lathe_core::target::BuildTarget;
use lathe_cxx::config::CxxConfig;
use lathe_cxx::library_type::LibraryType;
use lathe_cxx::link::CxxLink;
use lathe_cxx::link::LinkArg;
use lathe_cxx::linker_map_mode::LinkerMapMode;
use lathe_cxx::platform::CxxPlatform;
use thiserror::Error;

use crate::compile::SwiftCompile;
use crate::compile::SwiftCompileArgs;
use crate::config::SwiftConfig;
use crate::platform::SwiftPlatform;

#[derive(Debug, Error)]
enum SwiftLibraryError {
    #[error("Platform {0} is missing a swift compiler")]
    MissingSwiftPlatform(Flavor),
    #[error("Swift library {0} carries a platform flavor but no library type flavor")]
    MissingLibraryType(BuildTarget),
    #[error("Unhandled library build type `{1:?}` for {0}")]
    UnhandledLibraryType(BuildTarget, LibraryType),
    #[error("Internal error: {0} did not resolve to a swift compile rule")]
    NotASwiftCompileRule(BuildTarget),
}

/// Per-target attributes of a Swift library, resolved by the external
/// target-graph front end.
#[derive(Default)]
pub struct SwiftLibraryArgs {
    pub module_name: Option<String>,
    pub srcs: Vec<SourcePath>,
    pub soname: Option<String>,
    pub enable_objc_interop: Option<bool>,
    pub bridging_header: Option<SourcePath>,
    pub bridging_header_search_paths: Vec<ProjectRelativePathBuf>,
    pub framework_search_paths: Vec<ProjectRelativePathBuf>,
    pub module_search_paths: Vec<ProjectRelativePathBuf>,
    pub preprocessor_input: lathe_cxx::preprocessor::CxxPreprocessorInput,
}

/// Dispatch for a Swift library family: redirects to canonical flavors,
/// then builds either the compile rule or a shared library whose link
/// folds the compile rule's module and object in.
pub struct SwiftLibraryDescription {
    cxx_config: CxxConfig,
    swift_config: SwiftConfig,
    cxx_platforms: FlavorDomain<CxxPlatform>,
    swift_platforms: FlavorDomain<SwiftPlatform>,
    args: SwiftLibraryArgs,
}

impl SwiftLibraryDescription {
    pub fn swift_companion_flavor() -> Flavor {
        Flavor::unchecked_new("swift-companion")
    }

    pub fn swift_compile_flavor() -> Flavor {
        Flavor::unchecked_new("swift-compile")
    }

    pub fn is_swift_target(target: &BuildTarget) -> bool {
        target
            .flavors()
            .contains(&Self::swift_companion_flavor())
            || target.flavors().contains(&Self::swift_compile_flavor())
    }

    pub fn new(
        cxx_config: CxxConfig,
        swift_config: SwiftConfig,
        cxx_platforms: FlavorDomain<CxxPlatform>,
        swift_platforms: FlavorDomain<SwiftPlatform>,
        args: SwiftLibraryArgs,
    ) -> SwiftLibraryDescription {
        SwiftLibraryDescription {
            cxx_config,
            swift_config,
            cxx_platforms,
            swift_platforms,
            args,
        }
    }

    pub fn has_swift_sources(&self) -> bool {
        self.args
            .srcs
            .iter()
            .any(|s| s.path().as_str().ends_with(".swift"))
    }

    /// For a mixed-source native target: the companion compile rule whose
    /// outputs the native link folds in, when the target has Swift sources.
    pub fn create_companion_rule(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<Option<Arc<dyn BuildRule>>> {
        if Self::is_swift_target(target) || !self.has_swift_sources() {
            return Ok(None);
        }
        let companion_target = target
            .without_flavors(LinkerMapMode::domain().flavors())
            .with_appended_flavors([Self::swift_companion_flavor()]);
        Ok(Some(resolver.require_rule(&companion_target)?))
    }

    fn module_name(&self, target: &BuildTarget) -> String {
        self.args
            .module_name
            .clone()
            .unwrap_or_else(|| target.short_name().to_owned())
    }

    fn create_compile_rule(
        &self,
        target: &BuildTarget,
        swift_platform: &SwiftPlatform,
    ) -> anyhow::Result<DispatchResult> {
        let rule = SwiftCompile::new(
            BuildRuleParams::new(target.dupe()),
            self.swift_config.clone(),
            swift_platform.swiftc().clone(),
            paths::gen_path(target, "%s"),
            SwiftCompileArgs {
                module_name: self.module_name(target),
                srcs: self
                    .args
                    .srcs
                    .iter()
                    .filter(|s| s.path().as_str().ends_with(".swift"))
                    .cloned()
                    .collect(),
                enable_objc_interop: self.args.enable_objc_interop,
                bridging_header: self.args.bridging_header.clone(),
                bridging_header_search_paths: self.args.bridging_header_search_paths.clone(),
                framework_search_paths: self.args.framework_search_paths.clone(),
                module_search_paths: self.args.module_search_paths.clone(),
                preprocessor_input: self.args.preprocessor_input.clone(),
            },
        )?;
        Ok(DispatchResult::Rule(Arc::new(rule)))
    }

    fn create_shared_library_rule(
        &self,
        target: &BuildTarget,
        cxx_platform: &CxxPlatform,
        swift_platform: &SwiftPlatform,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
        let soname = self.args.soname.clone().unwrap_or_else(|| {
            format!(
                "lib{}.{}",
                target.short_name(),
                cxx_platform.shared_library_extension()
            )
        });
        let output = paths::gen_path(target, "%s").join(&soname);

        // The compile rule carries neither the library type nor the
        // linker-map flavor; both only affect the link.
        let compile_target = target
            .without_flavors([&LibraryType::Shared.flavor()])
            .without_flavors(LinkerMapMode::domain().flavors())
            .with_appended_flavors([Self::swift_compile_flavor()]);
        let compile_rule = resolver.require_rule(&compile_target)?;
        let compile = compile_rule
            .as_any()
            .downcast_ref::<SwiftCompile>()
            .ok_or_else(|| SwiftLibraryError::NotASwiftCompileRule(compile_target.dupe()))?;

        let mut link_args: Vec<LinkArg> = cxx_platform
            .linker()
            .shared_library_flags(&soname)
            .into_iter()
            .map(LinkArg::Literal)
            .collect();
        link_args.extend(
            swift_platform
                .runtime_linker_flags()
                .iter()
                .map(|f| LinkArg::literal(f.clone())),
        );
        link_args.extend(compile.link_args());

        let link = CxxLink::new(
            BuildRuleParams::new(target.dupe())
                .append_extra_deps([compile_rule.dupe()]),
            cxx_platform.linker().dupe(),
            output,
            link_args,
            Vec::new(),
            self.cxx_config.link_schedule_info,
            self.cxx_config.cache_links,
        )?;
        Ok(DispatchResult::Rule(Arc::new(link)))
    }
}

impl RuleDescription for SwiftLibraryDescription {
    fn dispatch(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
        // Canonicalize: a bare library target means "shared library with
        // the default linker map mode".
        if !Self::is_swift_target(target) && !LinkerMapMode::domain().contains_any_of(target) {
            return Ok(DispatchResult::Redirect(
                LinkerMapMode::add_default_flavor_if_needed(target)
                    .with_appended_flavors([LibraryType::Shared.flavor()]),
            ));
        }

        let cxx_platform = match self.cxx_platforms.get_flavor_and_value(target)? {
            Some((_, platform)) => platform,
            // No platform selected yet: this is the generic library node
            // other targets depend on.
            None => {
                return Ok(DispatchResult::Rule(Arc::new(SwiftLibrary {
                    params: BuildRuleParams::new(target.dupe()),
                })));
            }
        };
        let swift_platform = self
            .swift_platforms
            .get_value(target)?
            .ok_or_else(|| {
                SwiftLibraryError::MissingSwiftPlatform(FlavorConvertible::flavor(&cxx_platform))
            })?;

        if Self::is_swift_target(target) {
            return self.create_compile_rule(target, &swift_platform);
        }

        match LibraryType::domain().get_value(target)? {
            Some(LibraryType::Shared) => {
                self.create_shared_library_rule(target, &cxx_platform, &swift_platform, resolver)
            }
            Some(library_type) => {
                Err(SwiftLibraryError::UnhandledLibraryType(target.dupe(), library_type).into())
            }
            None => Err(SwiftLibraryError::MissingLibraryType(target.dupe()).into()),
        }
    }
}

/// The generic placeholder for a Swift library before a platform and
/// library type are chosen; a dependency-graph node with no build steps of
/// its own.
struct SwiftLibrary {
    params: BuildRuleParams,
}

impl BuildRule for SwiftLibrary {
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

    fn capabilities(&self) -> &[RuleCapability] {
        &[RuleCapability::IsNativeLinkable]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use lathe_build_api::tool::Tool;
    use lathe_cxx::linker::GnuLinker;

    use super::*;

    fn platform_flavor() -> Flavor {
        Flavor::unchecked_new("linux-x86_64")
    }

    fn description(args: SwiftLibraryArgs) -> SwiftLibraryDescription {
        let cxx_platform = CxxPlatform::new(
            platform_flavor(),
            Arc::new(GnuLinker::new(Tool::new("clang"))),
            Tool::new("strip"),
            "so",
        );
        let swift_platform = SwiftPlatform::new(
            platform_flavor(),
            Tool::new("swiftc"),
            vec!["-lswiftCore".to_owned()],
        );
        SwiftLibraryDescription::new(
            CxxConfig::default(),
            SwiftConfig::default(),
            FlavorDomain::new("C/C++ Platform", [cxx_platform]),
            FlavorDomain::new("Swift Platform", [swift_platform]),
            args,
        )
    }

    fn args_with_src() -> SwiftLibraryArgs {
        SwiftLibraryArgs {
            srcs: vec![SourcePath::Path(ProjectRelativePathBuf::unchecked_new(
                "libs/core/Core.swift".to_owned(),
            ))],
            ..SwiftLibraryArgs::default()
        }
    }

    #[test]
    fn test_bare_target_redirects_to_shared_with_linker_map() -> anyhow::Result<()> {
        let description = description(args_with_src());
        let resolver = BuildRuleResolver::new(NopRegistry);
        let target = BuildTarget::new("libs/core", "Core")?;
        match description.dispatch(&target, &resolver)? {
            DispatchResult::Redirect(next) => {
                assert!(next.flavors().contains(&LibraryType::Shared.flavor()));
                assert!(LinkerMapMode::is_enabled_for_target(&next));
            }
            DispatchResult::Rule(..) => panic!("expected a redirect"),
        }
        Ok(())
    }

    struct NopRegistry;

    impl RuleDescription for NopRegistry {
        fn dispatch(
            &self,
            target: &BuildTarget,
            _resolver: &BuildRuleResolver,
        ) -> anyhow::Result<DispatchResult> {
            anyhow::bail!("unexpected dispatch of {}", target)
        }
    }

    #[test]
    fn test_shared_library_folds_swift_compile_into_link() -> anyhow::Result<()> {
        let target =
            BuildTarget::new("libs/core", "Core")?.with_appended_flavors([platform_flavor()]);
        let mut registry = lathe_build_api::resolver::RuleDescriptionRegistry::new();
        registry.register(
            target.dupe(),
            Arc::new(description(args_with_src())),
        );
        let resolver = BuildRuleResolver::new(registry);

        let rule = resolver.require_rule(&target)?;
        let link = rule
            .as_any()
            .downcast_ref::<CxxLink>()
            .expect("terminal rule is a link");
        let rendered: Vec<String> = link.args().iter().map(|a| a.stringify()).collect();
        assert!(rendered.contains(&"-shared".to_owned()));
        assert!(rendered.contains(&"-lswiftCore".to_owned()));
        assert!(rendered.iter().any(|a| a.ends_with(".swiftmodule")));
        assert!(rendered.iter().any(|a| a.ends_with(".o")));

        // The compile rule is a dependency of the link.
        assert!(link
            .deps()
            .iter()
            .any(|d| d.target().flavors().contains(
                &SwiftLibraryDescription::swift_compile_flavor()
            )));
        Ok(())
    }

    #[test]
    fn test_static_library_type_is_rejected() -> anyhow::Result<()> {
        let description = description(args_with_src());
        let resolver = BuildRuleResolver::new(NopRegistry);
        let target = BuildTarget::new("libs/core", "Core")?.with_appended_flavors([
            platform_flavor(),
            LibraryType::Static.flavor(),
            LinkerMapMode::LinkerMap.flavor(),
        ]);
        let err = description.dispatch(&target, &resolver).unwrap_err();
        assert!(err.to_string().contains("Unhandled library build type"));
        Ok(())
    }
}
