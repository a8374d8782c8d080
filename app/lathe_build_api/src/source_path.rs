/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use derive_more::Display;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;

/// A reference to a file a rule consumes: either a source checked into the
/// project, or the output of another rule. Rules referencing a
/// `BuildTargetOutput` must depend on the producing rule, so that the file
/// exists before any step reads it.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum SourcePath {
    #[display(fmt = "{}", _0)]
    Path(ProjectRelativePathBuf),
    #[display(fmt = "{} (output of {})", path, target)]
    BuildTargetOutput {
        target: BuildTarget,
        path: ProjectRelativePathBuf,
    },
}

impl SourcePath {
    pub fn path(&self) -> &ProjectRelativePath {
        match self {
            SourcePath::Path(p) => p,
            SourcePath::BuildTargetOutput { path, .. } => path,
        }
    }

    /// The target whose rule produces this path, when there is one.
    pub fn producer(&self) -> Option<&BuildTarget> {
        match self {
            SourcePath::Path(..) => None,
            SourcePath::BuildTargetOutput { target, .. } => Some(target),
        }
    }
}
