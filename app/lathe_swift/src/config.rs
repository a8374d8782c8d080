/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

/// Already-resolved Swift toolchain configuration; user-configured global
/// compiler flags land between the search paths and the fixed compile
/// flags.
#[derive(Clone, Debug, Default)]
pub struct SwiftConfig {
    pub compiler_flags: Vec<String>,
}
