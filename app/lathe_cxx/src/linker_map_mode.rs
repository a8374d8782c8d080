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

/// Defines if a linker map should be generated or not.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LinkerMapMode {
    LinkerMap,
    NoLinkerMap,
}

impl FlavorConvertible for LinkerMapMode {
    fn flavor(&self) -> Flavor {
        match self {
            LinkerMapMode::LinkerMap => Flavor::unchecked_new("linkermap"),
            LinkerMapMode::NoLinkerMap => Flavor::unchecked_new("no-linkermap"),
        }
    }
}

impl LinkerMapMode {
    pub const DEFAULT_MODE: LinkerMapMode = LinkerMapMode::LinkerMap;

    pub fn domain() -> &'static FlavorDomain<LinkerMapMode> {
        static DOMAIN: Lazy<FlavorDomain<LinkerMapMode>> = Lazy::new(|| {
            FlavorDomain::new(
                "Linker Map Mode",
                [LinkerMapMode::LinkerMap, LinkerMapMode::NoLinkerMap],
            )
        });
        &DOMAIN
    }

    pub fn is_enabled_for_target(target: &BuildTarget) -> bool {
        target
            .flavors()
            .contains(&LinkerMapMode::LinkerMap.flavor())
    }

    /// The same target, with the default mode's flavor appended when the
    /// target carries no mode flavor at all.
    pub fn add_default_flavor_if_needed(target: &BuildTarget) -> BuildTarget {
        if LinkerMapMode::domain().contains_any_of(target) {
            return target.clone();
        }
        target.with_appended_flavors([LinkerMapMode::DEFAULT_MODE.flavor()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flavor_appending_is_idempotent() -> anyhow::Result<()> {
        let bare = BuildTarget::new("a", "b")?;
        let once = LinkerMapMode::add_default_flavor_if_needed(&bare);
        assert!(LinkerMapMode::is_enabled_for_target(&once));
        let twice = LinkerMapMode::add_default_flavor_if_needed(&once);
        assert_eq!(once, twice);

        let no_map =
            bare.with_appended_flavors([LinkerMapMode::NoLinkerMap.flavor()]);
        let unchanged = LinkerMapMode::add_default_flavor_if_needed(&no_map);
        assert_eq!(no_map, unchanged);
        assert!(!LinkerMapMode::is_enabled_for_target(&unchanged));
        Ok(())
    }
}
