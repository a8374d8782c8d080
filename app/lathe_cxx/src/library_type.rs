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

/// What kind of library artifact a library-family target builds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LibraryType {
    Shared,
    Static,
    MachOBundle,
}

impl FlavorConvertible for LibraryType {
    fn flavor(&self) -> Flavor {
        match self {
            LibraryType::Shared => Flavor::unchecked_new("shared"),
            LibraryType::Static => Flavor::unchecked_new("static"),
            LibraryType::MachOBundle => Flavor::unchecked_new("mach-o-bundle"),
        }
    }
}

impl LibraryType {
    pub fn domain() -> &'static FlavorDomain<LibraryType> {
        static DOMAIN: Lazy<FlavorDomain<LibraryType>> = Lazy::new(|| {
            FlavorDomain::new(
                "Library Type",
                [
                    LibraryType::Shared,
                    LibraryType::Static,
                    LibraryType::MachOBundle,
                ],
            )
        });
        &DOMAIN
    }
}
