/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use lathe_build_api::steps::scrub::FileScrubber;
use lathe_build_api::tool::Tool;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use thiserror::Error;

use crate::scrub::ArchiveTimestampScrubber;
use crate::scrub::PathScrubber;

#[derive(Debug, Error)]
enum LinkerError {
    #[error("The `{0}` linker does not support symbol version scripts")]
    VersionScriptsUnsupported(&'static str),
}

/// A family of system linkers this crate knows how to drive. The trait only
/// describes how to talk to the linker; invoking it is a plain tool step.
pub trait Linker: Send + Sync + fmt::Debug {
    fn tool(&self) -> &Tool;

    /// Arguments that make the linker read its object-file inputs from a
    /// separate file list, for linkers that prefer that form (it avoids OS
    /// command-line length limits). `None` when unsupported; object inputs
    /// then stay in the argument file.
    fn file_list_args(&self, file_list: &ProjectRelativePath) -> Option<Vec<String>>;

    /// Where the linker map for `output` lands, when this linker can emit
    /// one.
    fn linker_map_path(&self, output: &ProjectRelativePath) -> Option<ProjectRelativePathBuf>;

    /// Arguments that make the linker emit a map at `map`.
    fn linker_map_args(&self, map: &ProjectRelativePath) -> Vec<String>;

    /// Arguments applying a symbol version script. A de facto wire contract
    /// with the system linker; only ELF linkers support it.
    fn version_script_args(
        &self,
        script: &ProjectRelativePath,
    ) -> anyhow::Result<Vec<String>>;

    /// Arguments to produce a shared library with the given soname.
    fn shared_library_flags(&self, soname: &str) -> Vec<String>;

    /// Scrubbers to run over this linker's output. `extra_roots` is the set
    /// of dependency project roots; those are the only roots that may need
    /// path rewriting.
    fn scrubbers(&self, extra_roots: Vec<PathBuf>) -> Vec<Arc<dyn FileScrubber>>;
}

fn default_linker_map_path(output: &ProjectRelativePath) -> ProjectRelativePathBuf {
    ProjectRelativePathBuf::unchecked_new(format!("{}-LinkMap.txt", output))
}

/// GNU-compatible ELF linkers (ld.bfd, gold, lld in gnu mode), driven
/// through the compiler frontend.
#[derive(Debug)]
pub struct GnuLinker {
    tool: Tool,
}

impl GnuLinker {
    pub fn new(tool: Tool) -> GnuLinker {
        GnuLinker { tool }
    }
}

impl Linker for GnuLinker {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn file_list_args(&self, _file_list: &ProjectRelativePath) -> Option<Vec<String>> {
        None
    }

    fn linker_map_path(&self, output: &ProjectRelativePath) -> Option<ProjectRelativePathBuf> {
        Some(default_linker_map_path(output))
    }

    fn linker_map_args(&self, map: &ProjectRelativePath) -> Vec<String> {
        vec![format!("-Wl,-Map,{}", map)]
    }

    fn version_script_args(
        &self,
        script: &ProjectRelativePath,
    ) -> anyhow::Result<Vec<String>> {
        Ok(vec![format!("-Wl,--version-script={}", script)])
    }

    fn shared_library_flags(&self, soname: &str) -> Vec<String> {
        vec!["-shared".to_owned(), format!("-Wl,-soname,{}", soname)]
    }

    fn scrubbers(&self, extra_roots: Vec<PathBuf>) -> Vec<Arc<dyn FileScrubber>> {
        vec![
            Arc::new(PathScrubber::new(extra_roots)),
            Arc::new(ArchiveTimestampScrubber),
        ]
    }
}

/// The Darwin (Mach-O) linker, driven through the compiler frontend.
#[derive(Debug)]
pub struct DarwinLinker {
    tool: Tool,
}

impl DarwinLinker {
    pub fn new(tool: Tool) -> DarwinLinker {
        DarwinLinker { tool }
    }
}

impl Linker for DarwinLinker {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn file_list_args(&self, file_list: &ProjectRelativePath) -> Option<Vec<String>> {
        Some(vec![
            "-Xlinker".to_owned(),
            "-filelist".to_owned(),
            "-Xlinker".to_owned(),
            file_list.as_str().to_owned(),
        ])
    }

    fn linker_map_path(&self, output: &ProjectRelativePath) -> Option<ProjectRelativePathBuf> {
        Some(default_linker_map_path(output))
    }

    fn linker_map_args(&self, map: &ProjectRelativePath) -> Vec<String> {
        vec![
            "-Xlinker".to_owned(),
            "-map".to_owned(),
            "-Xlinker".to_owned(),
            map.as_str().to_owned(),
        ]
    }

    fn version_script_args(
        &self,
        _script: &ProjectRelativePath,
    ) -> anyhow::Result<Vec<String>> {
        Err(LinkerError::VersionScriptsUnsupported("darwin").into())
    }

    fn shared_library_flags(&self, soname: &str) -> Vec<String> {
        vec![
            "-dynamiclib".to_owned(),
            "-install_name".to_owned(),
            format!("@rpath/{}", soname),
        ]
    }

    fn scrubbers(&self, extra_roots: Vec<PathBuf>) -> Vec<Arc<dyn FileScrubber>> {
        vec![
            Arc::new(PathScrubber::new(extra_roots)),
            Arc::new(ArchiveTimestampScrubber),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linker_map_path() {
        let linker = GnuLinker::new(Tool::new("clang"));
        let output = ProjectRelativePath::unchecked_new("lathe-out/gen/a/bin");
        assert_eq!(
            linker.linker_map_path(output).unwrap().as_str(),
            "lathe-out/gen/a/bin-LinkMap.txt"
        );
    }

    #[test]
    fn test_version_script_support() {
        let script = ProjectRelativePath::unchecked_new("scratch/v.exp");
        let gnu = GnuLinker::new(Tool::new("clang"));
        assert_eq!(
            gnu.version_script_args(script).unwrap(),
            vec!["-Wl,--version-script=scratch/v.exp".to_owned()]
        );
        let darwin = DarwinLinker::new(Tool::new("clang"));
        assert!(darwin.version_script_args(script).is_err());
    }
}
