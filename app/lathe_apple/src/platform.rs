/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::sync::Arc;

use derive_more::Display;
use dupe::Dupe;
use lathe_build_api::tool::Tool;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_cxx::platform::CxxPlatform;
use lathe_swift::platform::SwiftPlatform;

#[derive(Copy, Clone, Dupe, Debug, Display, PartialEq, Eq, Hash)]
pub enum ApplePlatform {
    #[display(fmt = "iphoneos")]
    IphoneOs,
    #[display(fmt = "iphonesimulator")]
    IphoneSimulator,
    #[display(fmt = "macosx")]
    MacOsX,
    #[display(fmt = "watchos")]
    WatchOs,
    #[display(fmt = "watchsimulator")]
    WatchSimulator,
    #[display(fmt = "appletvos")]
    AppleTvOs,
}

impl ApplePlatform {
    pub fn is_simulator(&self) -> bool {
        matches!(
            self,
            ApplePlatform::IphoneSimulator | ApplePlatform::WatchSimulator
        )
    }

    pub fn is_watch(&self) -> bool {
        matches!(
            self,
            ApplePlatform::WatchOs | ApplePlatform::WatchSimulator
        )
    }

    /// Whether `.app` bundles for this platform embed their frameworks
    /// inside the bundle.
    pub fn app_includes_frameworks(&self) -> bool {
        !matches!(self, ApplePlatform::MacOsX)
    }
}

#[derive(Debug)]
struct AppleCxxPlatformData {
    platform: ApplePlatform,
    arch: String,
    flavor: Flavor,
    cxx: CxxPlatform,
    swift: Option<SwiftPlatform>,
    dsymutil: Tool,
    lipo: Tool,
    /// Precomputed binary substituted for source-less watch-companion
    /// targets, bypassing the compile/link pipeline entirely.
    stub_binary: Option<ProjectRelativePathBuf>,
}

/// The full Apple toolchain for one (platform, architecture) pair, flavored
/// `<platform>-<arch>`.
#[derive(Clone, Dupe, Debug)]
pub struct AppleCxxPlatform(Arc<AppleCxxPlatformData>);

impl AppleCxxPlatform {
    pub fn new(
        platform: ApplePlatform,
        arch: impl Into<String>,
        cxx: CxxPlatform,
        swift: Option<SwiftPlatform>,
        dsymutil: Tool,
        lipo: Tool,
        stub_binary: Option<ProjectRelativePathBuf>,
    ) -> AppleCxxPlatform {
        let arch = arch.into();
        let flavor = Flavor::unchecked_new(&format!("{}-{}", platform, arch));
        AppleCxxPlatform(Arc::new(AppleCxxPlatformData {
            platform,
            arch,
            flavor,
            cxx,
            swift,
            dsymutil,
            lipo,
            stub_binary,
        }))
    }

    pub fn platform(&self) -> ApplePlatform {
        self.0.platform
    }

    pub fn arch(&self) -> &str {
        &self.0.arch
    }

    pub fn cxx(&self) -> &CxxPlatform {
        &self.0.cxx
    }

    pub fn swift(&self) -> Option<&SwiftPlatform> {
        self.0.swift.as_ref()
    }

    pub fn dsymutil(&self) -> &Tool {
        &self.0.dsymutil
    }

    pub fn lipo(&self) -> &Tool {
        &self.0.lipo
    }

    pub fn stub_binary(&self) -> Option<&ProjectRelativePathBuf> {
        self.0.stub_binary.as_ref()
    }
}

impl FlavorConvertible for AppleCxxPlatform {
    fn flavor(&self) -> Flavor {
        self.0.flavor.dupe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names() {
        assert_eq!(ApplePlatform::IphoneOs.to_string(), "iphoneos");
        assert_eq!(ApplePlatform::WatchSimulator.to_string(), "watchsimulator");
        assert!(ApplePlatform::WatchSimulator.is_simulator());
        assert!(ApplePlatform::WatchOs.is_watch());
        assert!(!ApplePlatform::MacOsX.app_includes_frameworks());
        assert!(ApplePlatform::IphoneOs.app_includes_frameworks());
    }
}
