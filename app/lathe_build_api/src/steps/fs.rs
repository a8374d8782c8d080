/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Filesystem steps. All of them operate on project-relative paths and
//! resolve against the execution context's project root.

use async_trait::async_trait;
use lathe_core::fs::fs_util;
use lathe_core::fs::project::ProjectRelativePathBuf;

use crate::step::Step;
use crate::step::StepExecutionContext;
use crate::step::StepExecutionResult;

pub struct MkdirStep {
    pub path: ProjectRelativePathBuf,
}

#[async_trait]
impl Step for MkdirStep {
    fn short_name(&self) -> &'static str {
        "mkdir"
    }

    fn describe(&self) -> String {
        format!("mkdir -p {}", self.path)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        fs_util::create_dir_all(ctx.project_root.resolve(&self.path))?;
        Ok(StepExecutionResult::Success)
    }
}

/// Removes and recreates a directory, guaranteeing it exists and is empty.
/// Used for scratch directories, which are exclusively owned by one rule.
pub struct MakeCleanDirectoryStep {
    pub path: ProjectRelativePathBuf,
}

#[async_trait]
impl Step for MakeCleanDirectoryStep {
    fn short_name(&self) -> &'static str {
        "make_clean_dir"
    }

    fn describe(&self) -> String {
        format!("rm -rf {0} && mkdir -p {0}", self.path)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        let path = ctx.project_root.resolve(&self.path);
        fs_util::remove_all(&path)?;
        fs_util::create_dir_all(&path)?;
        Ok(StepExecutionResult::Success)
    }
}

/// Removes a file or directory tree; missing paths are not an error.
pub struct RmStep {
    pub path: ProjectRelativePathBuf,
}

#[async_trait]
impl Step for RmStep {
    fn short_name(&self) -> &'static str {
        "rm"
    }

    fn describe(&self) -> String {
        format!("rm -rf {}", self.path)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        fs_util::remove_all(ctx.project_root.resolve(&self.path))?;
        Ok(StepExecutionResult::Success)
    }
}

pub struct CopyStep {
    pub from: ProjectRelativePathBuf,
    pub to: ProjectRelativePathBuf,
}

#[async_trait]
impl Step for CopyStep {
    fn short_name(&self) -> &'static str {
        "cp"
    }

    fn describe(&self) -> String {
        format!("cp {} {}", self.from, self.to)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        fs_util::copy_file(
            ctx.project_root.resolve(&self.from),
            ctx.project_root.resolve(&self.to),
        )?;
        Ok(StepExecutionResult::Success)
    }
}

pub struct WriteFileStep {
    pub path: ProjectRelativePathBuf,
    pub contents: Vec<u8>,
    pub executable: bool,
}

#[async_trait]
impl Step for WriteFileStep {
    fn short_name(&self) -> &'static str {
        "write_file"
    }

    fn describe(&self) -> String {
        format!("write {} ({} bytes)", self.path, self.contents.len())
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        let path = ctx.project_root.resolve(&self.path);
        fs_util::write(&path, &self.contents)?;
        #[cfg(unix)]
        if self.executable {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs_util::metadata(&path)?.permissions();
            perms.set_mode(perms.mode() | 0o111);
            std::fs::set_permissions(&path, perms)?;
        }
        Ok(StepExecutionResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use lathe_core::fs::project::ProjectRoot;
    use tempfile::TempDir;

    use super::*;

    fn ctx(dir: &TempDir) -> anyhow::Result<StepExecutionContext> {
        Ok(StepExecutionContext {
            project_root: ProjectRoot::new(PathBuf::from(dir.path()))?,
            process_timeout: None,
        })
    }

    fn rel(s: &str) -> ProjectRelativePathBuf {
        ProjectRelativePathBuf::unchecked_new(s.to_owned())
    }

    #[tokio::test]
    async fn test_make_clean_directory() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ctx = ctx(&dir)?;
        let step = MakeCleanDirectoryStep { path: rel("scratch") };
        assert!(step.execute(&ctx).await?.is_success());
        std::fs::write(dir.path().join("scratch/stale"), b"x")?;
        assert!(step.execute(&ctx).await?.is_success());
        assert!(!dir.path().join("scratch/stale").exists());
        assert!(dir.path().join("scratch").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_rm_missing_is_ok() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ctx = ctx(&dir)?;
        let step = RmStep { path: rel("not-there") };
        assert!(step.execute(&ctx).await?.is_success());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_and_copy() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ctx = ctx(&dir)?;
        let write = WriteFileStep {
            path: rel("a.txt"),
            contents: b"data".to_vec(),
            executable: false,
        };
        assert!(write.execute(&ctx).await?.is_success());
        let copy = CopyStep { from: rel("a.txt"), to: rel("b.txt") };
        assert!(copy.execute(&ctx).await?.is_success());
        assert_eq!(std::fs::read(dir.path().join("b.txt"))?, b"data");
        Ok(())
    }
}
