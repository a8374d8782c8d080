/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Bundle dispatch: flavor defaulting for debug format and framework
//! inclusion, flavor propagation to bundle dependencies, and the terminal
//! rule assembling the `.app` directory around the built binary. Resource
//! compilation and code signing are external collaborators; this rule only
//! places the binary.

use std::sync::Arc;

use dupe::Dupe;
use lathe_build_api::resolver::BuildRuleResolver;
use lathe_build_api::resolver::DispatchResult;
use lathe_build_api::resolver::RuleDescription;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::step::Step;
use lathe_build_api::steps::fs::CopyStep;
use lathe_build_api::steps::fs::MakeCleanDirectoryStep;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::flavor::FlavorDomain;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::paths;
use lathe_core::target::BuildTarget;
use lathe_cxx::linker_map_mode::LinkerMapMode;
use lathe_cxx::strip_style::StripStyle;
use thiserror::Error;

use crate::debug_format::AppleDebugFormat;
use crate::descriptions::AppleConfig;
use crate::descriptions::IncludeFrameworks;
use crate::multiarch::MultiarchFileInfo;
use crate::platform::AppleCxxPlatform;
use crate::platform::ApplePlatform;

#[derive(Debug, Error)]
enum AppleBundleError {
    #[error(
        "Cannot create bundle for target '{0}': \
         No value specified for 'info_plist' attribute."
    )]
    NoInfoPlist(BuildTarget),
    #[error("Internal error: bundle binary {0} has no output")]
    BinaryWithoutOutput(BuildTarget),
}

/// The terminal bundle rule: a `.app` directory with the binary placed at
/// its root. Everything else in the bundle is produced by external
/// collaborators downstream.
pub struct AppleBundle {
    params: BuildRuleParams,
    binary: Arc<dyn BuildRule>,
    #[allow(dead_code)] // consumed by the external packaging collaborator
    info_plist: SourcePath,
    bundle_dir: ProjectRelativePathBuf,
    binary_dest: ProjectRelativePathBuf,
}

impl AppleBundle {
    pub fn new(
        params: BuildRuleParams,
        binary: Arc<dyn BuildRule>,
        info_plist: SourcePath,
    ) -> anyhow::Result<AppleBundle> {
        if binary.output_path().is_none() {
            return Err(AppleBundleError::BinaryWithoutOutput(binary.target().dupe()).into());
        }
        let bundle_dir = paths::gen_path(params.target(), "%s")
            .join(format!("{}.app", params.target().short_name()));
        let binary_dest = bundle_dir.join(params.target().short_name());
        Ok(AppleBundle {
            params,
            binary,
            info_plist,
            bundle_dir,
            binary_dest,
        })
    }
}

impl BuildRule for AppleBundle {
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
        buildable.record_artifact(self.bundle_dir.clone());
        Ok(vec![
            Box::new(MakeCleanDirectoryStep {
                path: self.bundle_dir.clone(),
            }),
            Box::new(CopyStep {
                from: self
                    .binary
                    .output_path()
                    .expect("validated at construction")
                    .to_owned(),
                to: self.binary_dest.clone(),
            }),
        ])
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        Some(&self.bundle_dir)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Per-target attributes of a bundle, resolved by the external target
/// graph.
pub struct AppleBundleArgs {
    /// The wrapped binary's target.
    pub binary: BuildTarget,
    pub info_plist: Option<SourcePath>,
    /// Bundle dependencies other than the binary (e.g. extension
    /// bundles).
    pub deps: Vec<BuildTarget>,
}

pub struct AppleBundleDescription {
    platforms: FlavorDomain<AppleCxxPlatform>,
    default_platform: AppleCxxPlatform,
    apple_config: AppleConfig,
    args: AppleBundleArgs,
}

impl AppleBundleDescription {
    /// Pseudo-flavor on a bundle dep meaning "the watch platform matching
    /// the surrounding build", resolved during flavor propagation.
    pub fn watch_flavor() -> Flavor {
        Flavor::unchecked_new("watch")
    }

    pub fn watch_os_flavor() -> Flavor {
        Flavor::unchecked_new("watchos-armv7k")
    }

    pub fn watch_simulator_flavor() -> Flavor {
        Flavor::unchecked_new("watchsimulator-i386")
    }

    pub fn new(
        platforms: FlavorDomain<AppleCxxPlatform>,
        default_platform: AppleCxxPlatform,
        apple_config: AppleConfig,
        args: AppleBundleArgs,
    ) -> AppleBundleDescription {
        AppleBundleDescription {
            platforms,
            default_platform,
            apple_config,
            args,
        }
    }

    fn representative_platform(
        &self,
        target: &BuildTarget,
    ) -> anyhow::Result<AppleCxxPlatform> {
        match MultiarchFileInfo::create(&self.platforms, target) {
            Some(info) => Ok(info.representative_platform().dupe()),
            None => Ok(self
                .platforms
                .get_value(target)?
                .unwrap_or_else(|| self.default_platform.dupe())),
        }
    }

    /// The platform flavor the `watch` pseudo-flavor stands for, given the
    /// platform this bundle builds against.
    fn actual_watch_flavor(platform: &AppleCxxPlatform) -> Flavor {
        if platform.platform().is_simulator() {
            Self::watch_simulator_flavor()
        } else if matches!(
            platform.platform(),
            ApplePlatform::IphoneOs | ApplePlatform::WatchOs
        ) {
            Self::watch_os_flavor()
        } else {
            FlavorConvertible::flavor(platform)
        }
    }

    /// Propagates the bundle's platform, debug-symbol, strip and
    /// linker-map flavors to its dependents that are other bundles (e.g.
    /// extensions), so the whole app builds one consistent variant.
    pub fn propagate_flavors_to_deps(
        &self,
        bundle_target: &BuildTarget,
        deps: &[BuildTarget],
    ) -> anyhow::Result<Vec<BuildTarget>> {
        let platform = self.representative_platform(bundle_target)?;
        let actual_watch_flavor = Self::actual_watch_flavor(&platform);

        let mut out = Vec::new();
        for dep in deps {
            if *dep == self.args.binary {
                continue;
            }
            let mut dep = dep.dupe();
            if !self.platforms.contains_any_of(&dep) {
                if dep.flavors().contains(&Self::watch_flavor()) {
                    dep = dep
                        .without_flavors([&Self::watch_flavor()])
                        .with_appended_flavors([actual_watch_flavor.dupe()]);
                } else {
                    dep = dep.propagate_flavor_domain(&self.platforms, bundle_target)?;
                }
            }
            dep = dep.propagate_flavor_domain(StripStyle::domain(), bundle_target)?;
            dep = dep.propagate_flavor_domain(AppleDebugFormat::domain(), bundle_target)?;
            dep = dep.propagate_flavor_domain(LinkerMapMode::domain(), bundle_target)?;
            out.push(dep);
        }
        Ok(out)
    }
}

impl RuleDescription for AppleBundleDescription {
    fn dispatch(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
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

        let info_plist = match &self.args.info_plist {
            Some(info_plist) => info_plist.clone(),
            None => return Err(AppleBundleError::NoInfoPlist(target.unflavored()).into()),
        };

        // The binary builds the same variant the bundle was requested in,
        // minus the bundle-only flavors.
        let mut binary_target = self
            .args
            .binary
            .propagate_flavor_domain(&self.platforms, target)?;
        binary_target = binary_target
            .propagate_flavor_domain(StripStyle::domain(), target)?
            .propagate_flavor_domain(AppleDebugFormat::domain(), target)?
            .propagate_flavor_domain(LinkerMapMode::domain(), target)?;
        let binary_rule = resolver.require_rule(&binary_target)?;

        let bundle = AppleBundle::new(
            BuildRuleParams::new(target.dupe()).with_declared_deps([binary_rule.dupe()]),
            binary_rule,
            info_plist,
        )?;
        Ok(DispatchResult::Rule(Arc::new(bundle)))
    }
}

#[cfg(test)]
mod tests {
    use lathe_build_api::tool::Tool;
    use lathe_cxx::linker::GnuLinker;
    use lathe_cxx::platform::CxxPlatform;

    use super::*;

    fn platform(p: ApplePlatform, arch: &str) -> AppleCxxPlatform {
        let flavor = Flavor::unchecked_new(&format!("{}-{}", p, arch));
        AppleCxxPlatform::new(
            p,
            arch,
            CxxPlatform::new(
                flavor,
                Arc::new(GnuLinker::new(Tool::new("clang"))),
                Tool::new("strip"),
                "dylib",
            ),
            None,
            Tool::new("dsymutil"),
            Tool::new("lipo"),
            None,
        )
    }

    fn description(info_plist: Option<SourcePath>) -> anyhow::Result<AppleBundleDescription> {
        let iphone = platform(ApplePlatform::IphoneOs, "arm64");
        let simulator = platform(ApplePlatform::IphoneSimulator, "x86_64");
        Ok(AppleBundleDescription::new(
            FlavorDomain::new("Apple Platform", [iphone.dupe(), simulator]),
            iphone,
            AppleConfig::default(),
            AppleBundleArgs {
                binary: BuildTarget::new("apps/demo", "DemoBinary")?,
                info_plist,
                deps: vec![],
            },
        ))
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
    fn test_missing_info_plist_is_a_user_error() -> anyhow::Result<()> {
        let description = description(None)?;
        let resolver = BuildRuleResolver::new(NopRegistry);
        let target = BuildTarget::new("apps/demo", "Demo")?.with_appended_flavors([
            Flavor::unchecked_new("iphoneos-arm64"),
            AppleDebugFormat::Dwarf.flavor(),
            IncludeFrameworks::Yes.flavor(),
        ]);
        let err = description.dispatch(&target, &resolver).unwrap_err();
        assert!(err.to_string().contains("info_plist"));
        assert!(err.to_string().contains("//apps/demo:Demo"));
        Ok(())
    }

    #[test]
    fn test_debug_format_then_frameworks_redirects() -> anyhow::Result<()> {
        let description = description(Some(SourcePath::Path(
            ProjectRelativePathBuf::unchecked_new("apps/demo/Info.plist".to_owned()),
        )))?;
        let resolver = BuildRuleResolver::new(NopRegistry);

        let bare = BuildTarget::new("apps/demo", "Demo")?
            .with_appended_flavors([Flavor::unchecked_new("iphoneos-arm64")]);
        let first = match description.dispatch(&bare, &resolver)? {
            DispatchResult::Redirect(next) => next,
            DispatchResult::Rule(..) => panic!("expected debug-format redirect"),
        };
        assert!(AppleDebugFormat::domain().contains_any_of(&first));

        let second = match description.dispatch(&first, &resolver)? {
            DispatchResult::Redirect(next) => next,
            DispatchResult::Rule(..) => panic!("expected include-frameworks redirect"),
        };
        assert!(second
            .flavors()
            .contains(&IncludeFrameworks::Yes.flavor()));
        Ok(())
    }

    #[test]
    fn test_watch_pseudo_flavor_propagation() -> anyhow::Result<()> {
        let description = description(Some(SourcePath::Path(
            ProjectRelativePathBuf::unchecked_new("apps/demo/Info.plist".to_owned()),
        )))?;
        let bundle_target = BuildTarget::new("apps/demo", "Demo")?.with_appended_flavors([
            Flavor::unchecked_new("iphoneos-arm64"),
            AppleDebugFormat::Dwarf.flavor(),
        ]);
        let watch_dep = BuildTarget::new("apps/demo", "WatchApp")?
            .with_appended_flavors([AppleBundleDescription::watch_flavor()]);
        let plain_dep = BuildTarget::new("libs", "Helper")?;

        let propagated = description
            .propagate_flavors_to_deps(&bundle_target, &[watch_dep, plain_dep])?;
        assert_eq!(propagated.len(), 2);

        // watch -> concrete watch platform for a device build.
        assert!(propagated[0]
            .flavors()
            .contains(&AppleBundleDescription::watch_os_flavor()));
        assert!(!propagated[0]
            .flavors()
            .contains(&AppleBundleDescription::watch_flavor()));

        // Ordinary deps pick up the bundle's platform and debug format.
        assert!(propagated[1]
            .flavors()
            .contains(&Flavor::unchecked_new("iphoneos-arm64")));
        assert!(propagated[1]
            .flavors()
            .contains(&AppleDebugFormat::Dwarf.flavor()));
        Ok(())
    }
}
