/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Dispatch for an Apple binary family: flavor defaulting, strip/debug
//! canonicalization, fat fan-out, stub substitution and debug-format
//! wrapping.

use std::sync::Arc;

use dupe::Dupe;
use lathe_build_api::resolver::BuildRuleResolver;
use lathe_build_api::resolver::DispatchResult;
use lathe_build_api::resolver::RuleDescription;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::write_file::WriteFile;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::flavor::FlavorDomain;
use lathe_core::fs::fs_util;
use lathe_core::fs::project::ProjectRoot;
use lathe_core::paths;
use lathe_core::target::BuildTarget;
use lathe_cxx::config::CxxConfig;
use lathe_cxx::link::CxxLink;
use lathe_cxx::link::LinkArg;
use lathe_cxx::linker_map_mode::LinkerMapMode;
use lathe_cxx::strip::CxxStrip;
use lathe_cxx::strip_style::StripStyle;
use lathe_swift::compile::SwiftCompile;
use lathe_swift::library::SwiftLibraryDescription;
use thiserror::Error;

use crate::bundle::AppleBundle;
use crate::debug_format::AppleDebugFormat;
use crate::debuggable::AppleDebuggableBinary;
use crate::descriptions::flavors_do_not_allow_linker_map;
use crate::descriptions::AppleConfig;
use crate::descriptions::IncludeFrameworks;
use crate::dsym::AppleDsym;
use crate::multiarch::require_multiarch_rule;
use crate::multiarch::MultiarchFileInfo;
use crate::platform::AppleCxxPlatform;

#[derive(Debug, Error)]
enum AppleBinaryError {
    #[error(
        "Cannot create application for apple_binary '{0}': \
         No value specified for 'info_plist' attribute."
    )]
    NoInfoPlist(BuildTarget),
    #[error("Could not read stub binary {0}")]
    UnreadableStubBinary(String),
    #[error("Unsupported flavor(s) on {0}: {1}")]
    UnsupportedFlavors(BuildTarget, String),
}

/// Per-target attributes of an Apple binary, resolved by the external
/// target-graph front end. Compilation of native sources is upstream of
/// this core; the link consumes the already-compiled objects.
#[derive(Default)]
pub struct AppleBinaryArgs {
    /// Source files; only consulted for the empty-sources stub policy and
    /// for Swift-source detection.
    pub srcs: Vec<SourcePath>,
    /// Compiled object inputs handed to the link.
    pub objects: Vec<SourcePath>,
    pub linker_flags: Vec<String>,
    pub info_plist: Option<SourcePath>,
}

pub struct AppleBinaryDescription {
    platforms: FlavorDomain<AppleCxxPlatform>,
    default_platform: AppleCxxPlatform,
    cxx_config: CxxConfig,
    apple_config: AppleConfig,
    swift_delegate: Option<Arc<SwiftLibraryDescription>>,
    project_root: ProjectRoot,
    args: AppleBinaryArgs,
}

impl AppleBinaryDescription {
    /// Requesting `#app` on a binary target builds the wrapping bundle
    /// instead.
    pub fn app_flavor() -> Flavor {
        Flavor::unchecked_new("app")
    }

    pub fn legacy_watch_flavor() -> Flavor {
        Flavor::unchecked_new("legacy_watch")
    }

    pub fn new(
        platforms: FlavorDomain<AppleCxxPlatform>,
        default_platform: AppleCxxPlatform,
        cxx_config: CxxConfig,
        apple_config: AppleConfig,
        swift_delegate: Option<Arc<SwiftLibraryDescription>>,
        project_root: ProjectRoot,
        args: AppleBinaryArgs,
    ) -> AppleBinaryDescription {
        AppleBinaryDescription {
            platforms,
            default_platform,
            cxx_config,
            apple_config,
            swift_delegate,
            project_root,
            args,
        }
    }

    fn platform_for(&self, target: &BuildTarget) -> anyhow::Result<AppleCxxPlatform> {
        Ok(self
            .platforms
            .get_value(target)?
            .unwrap_or_else(|| self.default_platform.dupe()))
    }

    fn is_supported_flavor(&self, flavor: &Flavor) -> bool {
        self.platforms.contains(flavor)
            || LinkerMapMode::domain().contains(flavor)
            || StripStyle::domain().contains(flavor)
            || AppleDebugFormat::domain().contains(flavor)
            || IncludeFrameworks::domain().contains(flavor)
            || lathe_cxx::library_type::LibraryType::domain().contains(flavor)
            || *flavor == Self::app_flavor()
            || *flavor == Self::legacy_watch_flavor()
            || *flavor == CxxStrip::rule_flavor()
            || *flavor == AppleDsym::rule_flavor()
            || *flavor == SwiftLibraryDescription::swift_companion_flavor()
            || *flavor == SwiftLibraryDescription::swift_compile_flavor()
    }

    fn check_supported_flavors(&self, target: &BuildTarget) -> anyhow::Result<()> {
        let unsupported: Vec<&Flavor> = target
            .flavors()
            .iter()
            .filter(|f| !self.is_supported_flavor(f))
            .collect();
        if unsupported.is_empty() {
            return Ok(());
        }
        Err(AppleBinaryError::UnsupportedFlavors(
            target.dupe(),
            itertools::join(unsupported, ", "),
        )
        .into())
    }

    fn should_use_stub_binary(&self, target: &BuildTarget) -> bool {
        if target.flavors().contains(&Self::legacy_watch_flavor()) {
            return true;
        }
        target.flavors().iter().any(|f| {
            self.platforms
                .value(f)
                .map_or(false, |p| p.platform().is_watch())
        })
    }

    /// The Swift companion compile for mixed-source targets, exposed to
    /// the link as extra arguments and an extra dependency.
    fn swift_companion(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<(Vec<LinkArg>, Vec<Arc<dyn BuildRule>>)> {
        let swift = match &self.swift_delegate {
            Some(swift) => swift,
            None => return Ok((Vec::new(), Vec::new())),
        };
        match swift.create_companion_rule(target, resolver)? {
            Some(companion) => {
                let link_args = companion
                    .as_any()
                    .downcast_ref::<SwiftCompile>()
                    .map(|compile| compile.link_args())
                    .unwrap_or_default();
                Ok((link_args, vec![companion]))
            }
            None => Ok((Vec::new(), Vec::new())),
        }
    }

    fn dispatch_binary(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
        if let Some(swift) = &self.swift_delegate {
            // A swift-flavored request builds the Swift rule itself, not a
            // native binary around it.
            if SwiftLibraryDescription::is_swift_target(target) {
                return swift.dispatch(target, resolver);
            }
        }

        // Canonical unstripped target: same output regardless of the
        // requested debug format or strip style.
        let unstripped_target = LinkerMapMode::add_default_flavor_if_needed(
            &target
                .without_flavors(AppleDebugFormat::domain().flavors())
                .without_flavors(StripStyle::domain().flavors())
                .without_flavors([&CxxStrip::rule_flavor()]),
        );
        let unstripped_rule = self.create_binary(&unstripped_target, resolver)?;

        // Wrap only when the debug flavor was explicit; a bare request
        // just wants the binary, even if config enables dSYMs by default.
        let explicit_debug_format = AppleDebugFormat::domain().get_value(target)?;
        match explicit_debug_format {
            Some(format) if AppleDebuggableBinary::can_wrap_rule(&*unstripped_rule) => self
                .create_debuggable_binary(
                    target,
                    resolver,
                    format,
                    &unstripped_target,
                    unstripped_rule,
                ),
            _ => Ok(DispatchResult::Rule(unstripped_rule)),
        }
    }

    fn create_debuggable_binary(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
        debug_format: AppleDebugFormat,
        unstripped_target: &BuildTarget,
        unstripped_rule: Arc<dyn BuildRule>,
    ) -> anyhow::Result<DispatchResult> {
        let strip_style = StripStyle::domain()
            .get_value(target)?
            .unwrap_or(StripStyle::NonGlobalSymbols);
        let stripped_target = unstripped_target
            .with_appended_flavors([CxxStrip::rule_flavor(), strip_style.flavor()]);
        let stripped_rule = self.create_binary(&stripped_target, resolver)?;

        let (binary, debug_deps): (Arc<dyn BuildRule>, Vec<Arc<dyn BuildRule>>) =
            match debug_format {
                AppleDebugFormat::DwarfAndDsym => {
                    let dsym = self.require_dsym_rule(resolver, unstripped_target, &unstripped_rule)?;
                    (stripped_rule, vec![dsym, unstripped_rule])
                }
                AppleDebugFormat::Dwarf => (unstripped_rule, Vec::new()),
                AppleDebugFormat::NoDebug => (stripped_rule, Vec::new()),
            };

        let debuggable = AppleDebuggableBinary::new(target.dupe(), binary, debug_deps)?;
        Ok(DispatchResult::Rule(Arc::new(debuggable)))
    }

    fn require_dsym_rule(
        &self,
        resolver: &BuildRuleResolver,
        unstripped_target: &BuildTarget,
        unstripped_rule: &Arc<dyn BuildRule>,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        let dsym_target =
            unstripped_target.with_appended_flavors([AppleDsym::rule_flavor()]);
        if let Some(existing) = resolver.get_rule_if_present(&dsym_target) {
            return Ok(existing);
        }
        let platform = self.representative_platform(unstripped_target)?;
        let binary_output = unstripped_rule
            .output_path()
            .expect("linked binaries always have an output")
            .to_owned();
        let rule = AppleDsym::new(
            BuildRuleParams::new(dsym_target.dupe())
                .with_declared_deps([unstripped_rule.dupe()]),
            platform.dsymutil().clone(),
            SourcePath::BuildTargetOutput {
                target: unstripped_rule.target().dupe(),
                path: binary_output,
            },
            paths::gen_path(&dsym_target, "%s.dSYM"),
        );
        Ok(resolver.add_to_index(Arc::new(rule)))
    }

    /// Fat fan-out and the single-arch/thin paths. Mirrors the shape of
    /// the dispatch: fat targets spread into thin sub-targets resolved
    /// recursively, everything else goes straight to a thin rule.
    fn create_binary(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        let target = if flavors_do_not_allow_linker_map(target) {
            target.without_flavors(LinkerMapMode::domain().flavors())
        } else {
            target.dupe()
        };

        match MultiarchFileInfo::create(&self.platforms, &target) {
            Some(info) => {
                if self.should_use_stub_binary(&target) {
                    let thin_target = &info.thin_targets()[0];
                    return self.require_thin_binary(thin_target, resolver);
                }
                let mut thin_rules = Vec::new();
                for thin_target in info.thin_targets() {
                    if let Some(existing) = resolver.get_rule_if_present(thin_target) {
                        thin_rules.push(existing);
                        continue;
                    }
                    thin_rules.push(self.require_thin_binary(thin_target, resolver)?);
                }
                require_multiarch_rule(resolver, &info, thin_rules)
            }
            None => self.require_thin_binary(&target, resolver),
        }
    }

    fn require_thin_binary(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        if let Some(existing) = resolver.get_rule_if_present(target) {
            return Ok(existing);
        }

        // Stub substitution: a data-driven policy for watch-companion
        // targets with no sources, not a fallback on error.
        if self.should_use_stub_binary(target) && self.args.srcs.is_empty() {
            let platform = self.platform_for(target)?;
            if let Some(stub) = platform.stub_binary() {
                let bytes = fs_util::read(self.project_root.resolve(stub))
                    .map_err(|_| AppleBinaryError::UnreadableStubBinary(stub.to_string()))?;
                let rule = WriteFile::new(
                    BuildRuleParams::new(target.dupe()),
                    bytes,
                    paths::gen_path(target, "%s"),
                    true,
                );
                return Ok(resolver.add_to_index(Arc::new(rule)));
            }
        }

        if target.flavors().contains(&CxxStrip::rule_flavor()) {
            return self.require_strip_rule(target, resolver);
        }
        self.require_link_rule(target, resolver)
    }

    fn require_strip_rule(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        let strip_style = StripStyle::domain().get_required_value(target)?;
        let link_target = CxxStrip::remove_strip_style_flavors(target, Some(strip_style));
        let link_rule = self.require_thin_binary(&link_target, resolver)?;
        let platform = self.platform_for(target)?;
        let input = SourcePath::BuildTargetOutput {
            target: link_rule.target().dupe(),
            path: link_rule
                .output_path()
                .expect("link rules always have an output")
                .to_owned(),
        };
        let rule = CxxStrip::new(
            BuildRuleParams::new(target.dupe()).with_declared_deps([link_rule]),
            strip_style,
            input,
            platform.cxx().strip().clone(),
            paths::gen_path(target, "%s"),
        )?;
        Ok(resolver.add_to_index(Arc::new(rule)))
    }

    fn require_link_rule(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<Arc<dyn BuildRule>> {
        let platform = self.platform_for(target)?;
        let (swift_link_args, mut extra_deps) = self.swift_companion(target, resolver)?;

        // Rules producing path-bearing link inputs become dependencies.
        for object in &self.args.objects {
            if let Some(producer) = object.producer() {
                extra_deps.push(resolver.require_rule(producer)?);
            }
        }

        let mut link_args: Vec<LinkArg> = self
            .args
            .objects
            .iter()
            .map(|o| LinkArg::source(o.clone()))
            .collect();
        link_args.extend(
            self.args
                .linker_flags
                .iter()
                .map(|f| LinkArg::literal(f.clone())),
        );
        link_args.extend(swift_link_args);

        let rule = CxxLink::new(
            BuildRuleParams::new(target.dupe()).append_extra_deps(extra_deps),
            platform.cxx().linker().dupe(),
            paths::gen_path(target, "%s"),
            link_args,
            Vec::new(),
            self.cxx_config.link_schedule_info,
            self.cxx_config.cache_links,
        )?;
        Ok(resolver.add_to_index(Arc::new(rule)))
    }

    fn dispatch_bundle(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
        let info_plist = match &self.args.info_plist {
            Some(info_plist) => info_plist,
            None => {
                return Err(AppleBinaryError::NoInfoPlist(target.unflavored()).into());
            }
        };

        let debug_format = AppleDebugFormat::domain()
            .get_value(target)?
            .unwrap_or(self.apple_config.default_debug_format);
        if !target.flavors().contains(&debug_format.flavor()) {
            return Ok(DispatchResult::Redirect(
                target.with_appended_flavors([debug_format.flavor()]),
            ));
        }

        if IncludeFrameworks::domain().get_value(target)?.is_none() {
            let platform = self.representative_platform(target)?;
            let decision = if platform.platform().app_includes_frameworks() {
                IncludeFrameworks::Yes
            } else {
                IncludeFrameworks::No
            };
            return Ok(DispatchResult::Redirect(
                target.with_appended_flavors([decision.flavor()]),
            ));
        }

        let binary_target = target
            .without_flavors([&Self::app_flavor()])
            .without_flavors(IncludeFrameworks::domain().flavors());
        let binary_rule = resolver.require_rule(&binary_target)?;
        let bundle = AppleBundle::new(
            BuildRuleParams::new(target.dupe()).with_declared_deps([binary_rule.dupe()]),
            binary_rule,
            info_plist.clone(),
        )?;
        Ok(DispatchResult::Rule(Arc::new(bundle)))
    }

    fn representative_platform(
        &self,
        target: &BuildTarget,
    ) -> anyhow::Result<AppleCxxPlatform> {
        match MultiarchFileInfo::create(&self.platforms, target) {
            Some(info) => Ok(info.representative_platform().dupe()),
            None => self.platform_for(target),
        }
    }
}

impl RuleDescription for AppleBinaryDescription {
    fn dispatch(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
        self.check_supported_flavors(target)?;
        if target.flavors().contains(&Self::app_flavor()) {
            self.dispatch_bundle(target, resolver)
        } else {
            self.dispatch_binary(target, resolver)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use lathe_build_api::resolver::RuleDescriptionRegistry;
    use lathe_build_api::tool::Tool;
    use lathe_core::fs::project::ProjectRelativePathBuf;
    use lathe_cxx::linker::DarwinLinker;
    use lathe_cxx::platform::CxxPlatform;
    use tempfile::TempDir;

    use super::*;
    use crate::multiarch::MultiarchFile;
    use crate::platform::ApplePlatform;

    fn platform(
        p: ApplePlatform,
        arch: &str,
        stub_binary: Option<ProjectRelativePathBuf>,
    ) -> AppleCxxPlatform {
        let flavor = Flavor::unchecked_new(&format!("{}-{}", p, arch));
        AppleCxxPlatform::new(
            p,
            arch,
            CxxPlatform::new(
                flavor,
                Arc::new(DarwinLinker::new(Tool::new("clang"))),
                Tool::new("strip"),
                "dylib",
            ),
            None,
            Tool::new("dsymutil"),
            Tool::new("lipo"),
            stub_binary,
        )
    }

    fn rel(s: &str) -> ProjectRelativePathBuf {
        ProjectRelativePathBuf::unchecked_new(s.to_owned())
    }

    struct Fixture {
        dir: TempDir,
        resolver: BuildRuleResolver,
    }

    fn fixture(args: AppleBinaryArgs) -> anyhow::Result<Fixture> {
        let dir = TempDir::new()?;
        let arm64 = platform(ApplePlatform::IphoneOs, "arm64", None);
        let armv7 = platform(ApplePlatform::IphoneOs, "armv7", None);
        let watch = platform(
            ApplePlatform::WatchOs,
            "armv7k",
            Some(rel("sdk/WK-stub")),
        );
        let platforms = FlavorDomain::new(
            "Apple Platform",
            [arm64.dupe(), armv7, watch],
        );
        let description = AppleBinaryDescription::new(
            platforms,
            arm64,
            CxxConfig::default(),
            AppleConfig::default(),
            None,
            ProjectRoot::new(PathBuf::from(dir.path()))?,
            args,
        );
        let target = BuildTarget::new("apps/demo", "Demo")?;
        let mut registry = RuleDescriptionRegistry::new();
        registry.register(target, Arc::new(description));
        Ok(Fixture {
            dir,
            resolver: BuildRuleResolver::new(registry),
        })
    }

    fn link_args() -> AppleBinaryArgs {
        AppleBinaryArgs {
            srcs: vec![SourcePath::Path(rel("apps/demo/main.c"))],
            objects: vec![
                SourcePath::Path(rel("objs/a.o")),
                SourcePath::Path(rel("objs/b.o")),
                SourcePath::Path(rel("objs/c.o")),
            ],
            linker_flags: vec!["-ObjC".to_owned()],
            info_plist: Some(SourcePath::Path(rel("apps/demo/Info.plist"))),
        }
    }

    fn target(flavors: &[&str]) -> anyhow::Result<BuildTarget> {
        Ok(BuildTarget::new("apps/demo", "Demo")?
            .with_appended_flavors(flavors.iter().map(|f| Flavor::unchecked_new(f))))
    }

    #[test]
    fn test_thin_request_builds_a_link_rule() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let rule = fixture.resolver.require_rule(&target(&["iphoneos-arm64"])?)?;
        let link = rule
            .as_any()
            .downcast_ref::<CxxLink>()
            .expect("thin binary is a link rule");
        // Implied default linker map flavor was appended.
        assert!(LinkerMapMode::is_enabled_for_target(link.target()));
        let rendered: Vec<String> = link.args().iter().map(|a| a.stringify()).collect();
        assert_eq!(rendered[..3], ["objs/a.o", "objs/b.o", "objs/c.o"]);
        assert!(rendered.contains(&"-ObjC".to_owned()));
        Ok(())
    }

    #[test]
    fn test_flavor_defaulting_is_idempotent() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let bare = fixture.resolver.require_rule(&target(&["iphoneos-arm64"])?)?;
        let explicit = fixture
            .resolver
            .require_rule(&target(&["iphoneos-arm64", "linkermap"])?)?;
        assert!(Arc::ptr_eq(&bare, &explicit));
        assert_eq!(bare.output_path(), explicit.output_path());
        Ok(())
    }

    #[test]
    fn test_fat_request_fans_out_per_architecture() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let rule = fixture
            .resolver
            .require_rule(&target(&["iphoneos-arm64", "iphoneos-armv7"])?)?;
        assert!(rule.as_any().downcast_ref::<MultiarchFile>().is_some());
        let deps = rule.deps();
        assert_eq!(deps.len(), 2);
        for dep in &deps {
            assert!(dep.as_any().downcast_ref::<CxxLink>().is_some());
            // Each thin target carries exactly one platform flavor.
            assert_eq!(
                dep.target()
                    .flavors()
                    .iter()
                    .filter(|f| f.as_str().starts_with("iphoneos-"))
                    .count(),
                1
            );
        }
        Ok(())
    }

    #[test]
    fn test_single_arch_is_not_wrapped_in_multiarch() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let rule = fixture.resolver.require_rule(&target(&["iphoneos-arm64"])?)?;
        assert!(rule.as_any().downcast_ref::<MultiarchFile>().is_none());
        assert!(rule.as_any().downcast_ref::<CxxLink>().is_some());
        Ok(())
    }

    #[test]
    fn test_stub_substitution_for_sourceless_watch_target() -> anyhow::Result<()> {
        let args = AppleBinaryArgs {
            srcs: vec![],
            objects: vec![],
            linker_flags: vec![],
            info_plist: None,
        };
        let fixture = fixture(args)?;
        std::fs::create_dir_all(fixture.dir.path().join("sdk"))?;
        std::fs::write(fixture.dir.path().join("sdk/WK-stub"), b"stub bytes")?;

        let rule = fixture.resolver.require_rule(&target(&["watchos-armv7k"])?)?;
        assert!(rule.as_any().downcast_ref::<WriteFile>().is_some());
        Ok(())
    }

    #[test]
    fn test_explicit_debug_flavor_wraps_into_debuggable() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let rule = fixture
            .resolver
            .require_rule(&target(&["iphoneos-arm64", "dwarf-and-dsym"])?)?;
        let debuggable = rule
            .as_any()
            .downcast_ref::<AppleDebuggableBinary>()
            .expect("explicit debug flavor wraps the binary");

        let deps = debuggable.deps();
        // Stripped binary, then dsym + unstripped as debug deps.
        assert!(deps
            .iter()
            .any(|d| d.target().flavors().contains(&CxxStrip::rule_flavor())));
        assert!(deps
            .iter()
            .any(|d| d.target().flavors().contains(&AppleDsym::rule_flavor())));
        Ok(())
    }

    #[test]
    fn test_bare_request_is_not_wrapped() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let rule = fixture.resolver.require_rule(&target(&["iphoneos-arm64"])?)?;
        assert!(rule.as_any().downcast_ref::<AppleDebuggableBinary>().is_none());
        Ok(())
    }

    #[test]
    fn test_app_flavor_builds_bundle_through_redirects() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let rule = fixture
            .resolver
            .require_rule(&target(&["iphoneos-arm64", "app"])?)?;
        let bundle = rule
            .as_any()
            .downcast_ref::<AppleBundle>()
            .expect("app flavor builds a bundle");
        assert!(bundle.output_path().unwrap().as_str().ends_with("Demo.app"));
        Ok(())
    }

    #[test]
    fn test_app_without_info_plist_fails_fast() -> anyhow::Result<()> {
        let mut args = link_args();
        args.info_plist = None;
        let fixture = fixture(args)?;
        let err = fixture
            .resolver
            .require_rule(&target(&["iphoneos-arm64", "app"])?)
            .unwrap_err();
        assert!(err.to_string().contains("info_plist"));
        Ok(())
    }

    #[test]
    fn test_unsupported_flavor_is_rejected() -> anyhow::Result<()> {
        let fixture = fixture(link_args())?;
        let err = fixture
            .resolver
            .require_rule(&target(&["iphoneos-arm64", "profile-me-harder"])?)
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported flavor(s)"));
        Ok(())
    }
}
