/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Derivation of per-target output locations under the output directory.
//! Every rule's outputs live under a directory derived from its target's
//! flavored name, so differently-flavored variants of one target never
//! share paths.

use crate::fs::project::ProjectRelativePath;
use crate::fs::project::ProjectRelativePathBuf;
use crate::target::BuildTarget;

/// Root of all build outputs, relative to the project root.
pub const OUTPUT_DIR: &str = "lathe-out";

fn target_path(prefix: &str, target: &BuildTarget, format: &str) -> ProjectRelativePathBuf {
    let leaf = format.replace("%s", &target.flavored_name());
    ProjectRelativePath::unchecked_new(OUTPUT_DIR)
        .join(prefix)
        .join(target.base_path())
        .join(leaf)
}

/// Location for a rule's final outputs. `format` must contain `%s`, which
/// expands to the target's flavored name.
pub fn gen_path(target: &BuildTarget, format: &str) -> ProjectRelativePathBuf {
    target_path("gen", target, format)
}

/// Location for a rule's intermediate files. Scratch directories are owned
/// by exactly one rule and wiped at the start of that rule's execution.
pub fn scratch_path(target: &BuildTarget, format: &str) -> ProjectRelativePathBuf {
    target_path("bin", target, format)
}
