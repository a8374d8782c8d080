/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use lathe_core::fs::project::ProjectRelativePathBuf;

/// The transitive preprocessor search-path input of a set of native
/// dependencies: header maps and plain include roots. Header maps are
/// listed first so a hit there shadows the stat-based fallback lookup in
/// the include roots.
#[derive(Clone, Debug, Default)]
pub struct CxxPreprocessorInput {
    pub header_maps: Vec<ProjectRelativePathBuf>,
    pub include_roots: Vec<ProjectRelativePathBuf>,
}

impl CxxPreprocessorInput {
    pub fn concat(
        inputs: impl IntoIterator<Item = CxxPreprocessorInput>,
    ) -> CxxPreprocessorInput {
        let mut out = CxxPreprocessorInput::default();
        for input in inputs {
            out.header_maps.extend(input.header_maps);
            out.include_roots.extend(input.include_roots);
        }
        out
    }
}
