/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use once_cell::sync::Lazy;

use lathe_core::flavor::Flavor;
use lathe_core::flavor::FlavorConvertible;
use lathe_core::flavor::FlavorDomain;

/// How debug info is delivered alongside a built binary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AppleDebugFormat {
    /// Debug info stays in the object files and is additionally extracted
    /// into a `.dSYM` next to the stripped binary.
    DwarfAndDsym,
    /// Debug info stays in the object files; the binary is left
    /// unstripped.
    Dwarf,
    /// No debug info; the binary is stripped.
    NoDebug,
}

impl FlavorConvertible for AppleDebugFormat {
    fn flavor(&self) -> Flavor {
        match self {
            AppleDebugFormat::DwarfAndDsym => Flavor::unchecked_new("dwarf-and-dsym"),
            AppleDebugFormat::Dwarf => Flavor::unchecked_new("dwarf"),
            AppleDebugFormat::NoDebug => Flavor::unchecked_new("no-debug"),
        }
    }
}

impl AppleDebugFormat {
    pub fn domain() -> &'static FlavorDomain<AppleDebugFormat> {
        static DOMAIN: Lazy<FlavorDomain<AppleDebugFormat>> = Lazy::new(|| {
            FlavorDomain::new(
                "Debug Info Format Type",
                [
                    AppleDebugFormat::DwarfAndDsym,
                    AppleDebugFormat::Dwarf,
                    AppleDebugFormat::NoDebug,
                ],
            )
        });
        &DOMAIN
    }
}
