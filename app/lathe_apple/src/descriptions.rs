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
use lathe_core::target::BuildTarget;
use lathe_swift::library::SwiftLibraryDescription;

use crate::debug_format::AppleDebugFormat;

/// Whether a bundle embeds its framework dependencies. Added to the
/// target as an implied flavor once the platform policy has decided.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IncludeFrameworks {
    Yes,
    No,
}

impl FlavorConvertible for IncludeFrameworks {
    fn flavor(&self) -> Flavor {
        match self {
            IncludeFrameworks::Yes => Flavor::unchecked_new("include-frameworks"),
            IncludeFrameworks::No => Flavor::unchecked_new("no-include-frameworks"),
        }
    }
}

impl IncludeFrameworks {
    pub fn domain() -> &'static FlavorDomain<IncludeFrameworks> {
        static DOMAIN: Lazy<FlavorDomain<IncludeFrameworks>> = Lazy::new(|| {
            FlavorDomain::new(
                "Include Frameworks",
                [IncludeFrameworks::Yes, IncludeFrameworks::No],
            )
        });
        &DOMAIN
    }
}

/// Flavors whose rules never produce a linked output, so a linker-map
/// flavor on them is meaningless and must be dropped before dispatch.
pub fn flavors_do_not_allow_linker_map(target: &BuildTarget) -> bool {
    SwiftLibraryDescription::is_swift_target(target)
}

/// Already-resolved Apple defaults from the external config loader.
#[derive(Clone, Debug)]
pub struct AppleConfig {
    pub default_debug_format: AppleDebugFormat,
}

impl Default for AppleConfig {
    fn default() -> AppleConfig {
        AppleConfig {
            default_debug_format: AppleDebugFormat::Dwarf,
        }
    }
}
