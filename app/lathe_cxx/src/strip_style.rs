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

/// Controls how the strip tool is invoked. To have better understanding
/// please refer to `man strip`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StripStyle {
    /// Remove everything strip can remove.
    AllSymbols,
    /// Remove non-global symbols, keeping external references intact.
    NonGlobalSymbols,
    /// Keep the symbol table as-is; the strip rule degenerates to a copy.
    NoStrip,
}

impl FlavorConvertible for StripStyle {
    fn flavor(&self) -> Flavor {
        match self {
            StripStyle::AllSymbols => Flavor::unchecked_new("strip-all"),
            StripStyle::NonGlobalSymbols => Flavor::unchecked_new("strip-non-global"),
            StripStyle::NoStrip => Flavor::unchecked_new("no-strip"),
        }
    }
}

impl StripStyle {
    pub fn domain() -> &'static FlavorDomain<StripStyle> {
        static DOMAIN: Lazy<FlavorDomain<StripStyle>> = Lazy::new(|| {
            FlavorDomain::new(
                "Strip Style",
                [
                    StripStyle::AllSymbols,
                    StripStyle::NonGlobalSymbols,
                    StripStyle::NoStrip,
                ],
            )
        });
        &DOMAIN
    }

    /// Arguments for the strip tool, or `None` when no invocation should
    /// happen at all.
    pub fn strip_tool_args(&self) -> Option<Vec<String>> {
        match self {
            StripStyle::AllSymbols => Some(Vec::new()),
            StripStyle::NonGlobalSymbols => Some(vec!["-x".to_owned()]),
            StripStyle::NoStrip => None,
        }
    }
}
