/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Fat (universal) binaries: fan a multi-platform-flavored target out into
//! one thin target per architecture, then compose the thin outputs with the
//! platform's architecture-merge tool.

use std::sync::Arc;

use dupe::Dupe;
use lathe_build_api::resolver::BuildRuleResolver;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::rule::RuleCapability;
use lathe_build_api::step::Step;
use lathe_build_api::steps::fs::CopyStep;
use lathe_build_api::steps::fs::MkdirStep;
use lathe_build_api::steps::tool::ToolStep;
use lathe_build_api::tool::Tool;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorDomain;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::paths;
use lathe_core::target::BuildTarget;
use thiserror::Error;

use crate::platform::AppleCxxPlatform;

#[derive(Debug, Error)]
enum MultiarchError {
    #[error("Internal error: thin rule {0} of fat target {1} has no output")]
    ThinRuleWithoutOutput(BuildTarget, BuildTarget),
}

/// Pairs a fat target with its per-architecture thin targets and the
/// representative platform used for flavor propagation decisions. Created
/// on demand from a target's platform flavors; never persisted.
#[derive(Clone, Debug)]
pub struct MultiarchFileInfo {
    fat_target: BuildTarget,
    thin_targets: Vec<BuildTarget>,
    representative_platform: AppleCxxPlatform,
}

impl MultiarchFileInfo {
    /// `None` unless the target selects more than one (platform, arch)
    /// pair; a single platform flavor stays an ordinary thin target. This
    /// is the one domain where carrying several flavors at once is
    /// meaningful rather than an error.
    pub fn create(
        platforms: &FlavorDomain<AppleCxxPlatform>,
        target: &BuildTarget,
    ) -> Option<MultiarchFileInfo> {
        let platform_flavors: Vec<Flavor> = target
            .flavors()
            .iter()
            .filter(|f| platforms.contains(f))
            .map(|f| f.dupe())
            .collect();
        if platform_flavors.len() < 2 {
            return None;
        }
        let base = target.without_flavors(platform_flavors.iter());
        let thin_targets = platform_flavors
            .iter()
            .map(|f| base.with_appended_flavors([f.dupe()]))
            .collect();
        let representative_platform = platforms
            .value(&platform_flavors[0])
            .expect("flavor came from the domain");
        Some(MultiarchFileInfo {
            fat_target: target.dupe(),
            thin_targets,
            representative_platform,
        })
    }

    pub fn fat_target(&self) -> &BuildTarget {
        &self.fat_target
    }

    pub fn thin_targets(&self) -> &[BuildTarget] {
        &self.thin_targets
    }

    pub fn representative_platform(&self) -> &AppleCxxPlatform {
        &self.representative_platform
    }
}

/// Where a thin rule's linker map lands inside the fat target's
/// side-artifact directory; downstream symbolication tooling expects this
/// layout.
pub fn fat_linker_map_path(
    fat_output: &ProjectRelativePath,
    thin_target: &BuildTarget,
) -> ProjectRelativePathBuf {
    ProjectRelativePathBuf::unchecked_new(format!(
        "{}-LinkMap/{}-LinkMap.txt",
        fat_output,
        thin_target.flavored_name()
    ))
}

/// Composes N thin single-architecture outputs into one fat binary, and
/// unions the thin rules' side artifacts (link maps) into per-architecture
/// files under the fat output's side directory.
pub struct MultiarchFile {
    params: BuildRuleParams,
    lipo: Tool,
    output: ProjectRelativePathBuf,
    thin_rules: Vec<Arc<dyn BuildRule>>,
}

impl MultiarchFile {
    pub fn new(
        params: BuildRuleParams,
        lipo: Tool,
        output: ProjectRelativePathBuf,
        thin_rules: Vec<Arc<dyn BuildRule>>,
    ) -> anyhow::Result<MultiarchFile> {
        for thin in &thin_rules {
            if thin.output_path().is_none() {
                return Err(MultiarchError::ThinRuleWithoutOutput(
                    thin.target().dupe(),
                    params.target().dupe(),
                )
                .into());
            }
        }
        Ok(MultiarchFile {
            params,
            lipo,
            output,
            thin_rules,
        })
    }
}

impl BuildRule for MultiarchFile {
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

        // Thin outputs in declaration order; the order only affects the
        // tool's argument order but must be deterministic for cache-key
        // stability.
        let mut args = vec!["-create".to_owned()];
        for thin in &self.thin_rules {
            let output = thin.output_path().expect("validated at construction");
            args.push(output.as_str().to_owned());
        }
        args.push("-output".to_owned());
        args.push(self.output.as_str().to_owned());
        steps.push(Box::new(ToolStep::new("lipo", self.lipo.clone(), args)));

        let mut made_map_dir = false;
        for thin in &self.thin_rules {
            let map = match thin.linker_map_path() {
                Some(map) => map,
                None => continue,
            };
            let dest = fat_linker_map_path(&self.output, thin.target());
            if !made_map_dir {
                steps.push(Box::new(MkdirStep {
                    path: dest.parent().expect("side dir always has a parent").to_owned(),
                }));
                buildable.record_artifact(dest.parent().unwrap().to_owned());
                made_map_dir = true;
            }
            steps.push(Box::new(CopyStep {
                from: map,
                to: dest,
            }));
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

/// Memoized construction of the fat rule over already-resolved thin rules.
pub fn require_multiarch_rule(
    resolver: &BuildRuleResolver,
    info: &MultiarchFileInfo,
    thin_rules: Vec<Arc<dyn BuildRule>>,
) -> anyhow::Result<Arc<dyn BuildRule>> {
    if let Some(existing) = resolver.get_rule_if_present(info.fat_target()) {
        return Ok(existing);
    }
    let output = paths::gen_path(info.fat_target(), "%s");
    let rule = MultiarchFile::new(
        BuildRuleParams::new(info.fat_target().dupe()).with_declared_deps(thin_rules.clone()),
        info.representative_platform().lipo().clone(),
        output,
        thin_rules,
    )?;
    Ok(resolver.add_to_index(Arc::new(rule)))
}

#[cfg(test)]
mod tests {
    use lathe_build_api::tool::Tool;
    use lathe_core::flavor::FlavorConvertible;
    use lathe_cxx::linker::GnuLinker;
    use lathe_cxx::platform::CxxPlatform;

    use super::*;
    use crate::platform::ApplePlatform;

    fn platform(platform: ApplePlatform, arch: &str) -> AppleCxxPlatform {
        let flavor = Flavor::unchecked_new(&format!("{}-{}", platform, arch));
        AppleCxxPlatform::new(
            platform,
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

    fn domain() -> FlavorDomain<AppleCxxPlatform> {
        FlavorDomain::new(
            "Apple Platform",
            [
                platform(ApplePlatform::IphoneOs, "arm64"),
                platform(ApplePlatform::IphoneOs, "armv7"),
                platform(ApplePlatform::IphoneSimulator, "x86_64"),
            ],
        )
    }

    #[test]
    fn test_create_needs_at_least_two_platform_flavors() -> anyhow::Result<()> {
        let domain = domain();
        let base = BuildTarget::new("apps", "Foo")?;
        assert!(MultiarchFileInfo::create(&domain, &base).is_none());

        let thin = base.with_appended_flavors([Flavor::unchecked_new("iphoneos-arm64")]);
        assert!(MultiarchFileInfo::create(&domain, &thin).is_none());
        Ok(())
    }

    #[test]
    fn test_thin_target_generation() -> anyhow::Result<()> {
        let domain = domain();
        let fat = BuildTarget::new("apps", "Foo")?.with_appended_flavors([
            Flavor::unchecked_new("iphoneos-arm64"),
            Flavor::unchecked_new("iphoneos-armv7"),
            Flavor::unchecked_new("linkermap"),
        ]);
        let info = MultiarchFileInfo::create(&domain, &fat).unwrap();
        assert_eq!(info.thin_targets().len(), 2);
        for thin in info.thin_targets() {
            // Exactly one platform flavor each, other flavors preserved.
            assert_eq!(
                thin.flavors()
                    .iter()
                    .filter(|f| domain.contains(f))
                    .count(),
                1
            );
            assert!(thin.flavors().contains(&Flavor::unchecked_new("linkermap")));
        }
        let platform = info.representative_platform();
        assert!(fat
            .flavors()
            .contains(&FlavorConvertible::flavor(platform)));
        Ok(())
    }

    #[test]
    fn test_fat_linker_map_layout() -> anyhow::Result<()> {
        let fat_output = ProjectRelativePathBuf::unchecked_new(
            "lathe-out/gen/apps/Foo#iphoneos-arm64,iphoneos-armv7".to_owned(),
        );
        let thin = BuildTarget::new("apps", "Foo")?
            .with_appended_flavors([Flavor::unchecked_new("iphoneos-arm64")]);
        assert_eq!(
            fat_linker_map_path(&fat_output, &thin).as_str(),
            "lathe-out/gen/apps/Foo#iphoneos-arm64,iphoneos-armv7-LinkMap/Foo#iphoneos-arm64-LinkMap.txt"
        );
        Ok(())
    }
}
