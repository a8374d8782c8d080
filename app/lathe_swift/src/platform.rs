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
use lathe_build_api::tool::Tool;
use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;

#[derive(Debug)]
struct SwiftPlatformData {
    flavor: Flavor,
    swiftc: Tool,
    /// Linker arguments pulling in the Swift runtime when a Swift module is
    /// folded into a native link.
    runtime_linker_flags: Vec<String>,
}

/// The Swift toolchain for one (platform, architecture) pair, keyed by the
/// same platform flavor as the native toolchain.
#[derive(Clone, Dupe, Debug)]
pub struct SwiftPlatform(Arc<SwiftPlatformData>);

impl SwiftPlatform {
    pub fn new(
        flavor: Flavor,
        swiftc: Tool,
        runtime_linker_flags: Vec<String>,
    ) -> SwiftPlatform {
        SwiftPlatform(Arc::new(SwiftPlatformData {
            flavor,
            swiftc,
            runtime_linker_flags,
        }))
    }

    pub fn swiftc(&self) -> &Tool {
        &self.0.swiftc
    }

    pub fn runtime_linker_flags(&self) -> &[String] {
        &self.0.runtime_linker_flags
    }
}

impl FlavorConvertible for SwiftPlatform {
    fn flavor(&self) -> Flavor {
        self.0.flavor.dupe()
    }
}
