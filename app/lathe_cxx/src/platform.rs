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

use crate::linker::Linker;

#[derive(Debug)]
struct CxxPlatformData {
    flavor: Flavor,
    linker: Arc<dyn Linker>,
    strip: Tool,
    shared_library_extension: String,
}

/// The native toolchain for one (platform, architecture) pair. The flavor
/// is the platform flavor carried by targets built against it, e.g.
/// `iphoneos-arm64`.
#[derive(Clone, Dupe, Debug)]
pub struct CxxPlatform(Arc<CxxPlatformData>);

impl CxxPlatform {
    pub fn new(
        flavor: Flavor,
        linker: Arc<dyn Linker>,
        strip: Tool,
        shared_library_extension: impl Into<String>,
    ) -> CxxPlatform {
        CxxPlatform(Arc::new(CxxPlatformData {
            flavor,
            linker,
            strip,
            shared_library_extension: shared_library_extension.into(),
        }))
    }

    pub fn linker(&self) -> &Arc<dyn Linker> {
        &self.0.linker
    }

    pub fn strip(&self) -> &Tool {
        &self.0.strip
    }

    pub fn shared_library_extension(&self) -> &str {
        &self.0.shared_library_extension
    }
}

impl FlavorConvertible for CxxPlatform {
    fn flavor(&self) -> Flavor {
        self.0.flavor.dupe()
    }
}
