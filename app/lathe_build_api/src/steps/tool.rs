/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use async_trait::async_trait;
use indexmap::IndexMap;
use lathe_core::fs::project::ProjectRelativePathBuf;
use tokio::process::Command;

use crate::process::gather_output;
use crate::process::GatherOutputStatus;
use crate::step::Step;
use crate::step::StepExecutionContext;
use crate::step::StepExecutionResult;
use crate::tool::Tool;

/// Invokes an external toolchain binary. A non-zero exit is an `Error`
/// result carrying the tool's stdout/stderr verbatim; the owning rule is
/// then marked failed without retry.
pub struct ToolStep {
    name: &'static str,
    tool: Tool,
    args: Vec<String>,
    env: IndexMap<String, String>,
    working_directory: Option<ProjectRelativePathBuf>,
}

impl ToolStep {
    pub fn new(name: &'static str, tool: Tool, args: Vec<String>) -> ToolStep {
        ToolStep {
            name,
            tool,
            args,
            env: IndexMap::new(),
            working_directory: None,
        }
    }

    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> ToolStep {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_working_directory(mut self, wd: ProjectRelativePathBuf) -> ToolStep {
        self.working_directory = Some(wd);
        self
    }

    fn command_line(&self) -> Vec<&str> {
        self.tool
            .command_prefix()
            .iter()
            .chain(self.args.iter())
            .map(|s| s.as_str())
            .collect()
    }
}

#[async_trait]
impl Step for ToolStep {
    fn short_name(&self) -> &'static str {
        self.name
    }

    fn describe(&self) -> String {
        itertools::join(self.command_line(), " ")
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        let command_line = self.command_line();
        let mut cmd = Command::new(command_line[0]);
        cmd.args(&command_line[1..]);
        match &self.working_directory {
            Some(wd) => cmd.current_dir(ctx.project_root.resolve(wd)),
            None => cmd.current_dir(ctx.project_root.root()),
        };
        cmd.envs(self.tool.environment());
        cmd.envs(&self.env);

        tracing::debug!(step = self.name, "{}", self.describe());
        let (status, stdout, stderr) = gather_output(cmd, ctx.process_timeout).await?;

        let description = match status {
            GatherOutputStatus::Finished(status) if status.success() => {
                return Ok(StepExecutionResult::Success);
            }
            GatherOutputStatus::Finished(status) => {
                format!("Command `{}` exited with {}", self.describe(), status)
            }
            GatherOutputStatus::TimedOut(duration) => {
                format!(
                    "Command `{}` timed out after {}s",
                    self.describe(),
                    duration.as_secs_f64()
                )
            }
        };

        Ok(StepExecutionResult::Error {
            description,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use lathe_core::fs::project::ProjectRoot;
    use tempfile::TempDir;

    use super::*;

    fn shell_tool(script: &str) -> Tool {
        Tool::new("sh").with_args(["-c", script])
    }

    fn ctx(dir: &TempDir) -> anyhow::Result<StepExecutionContext> {
        Ok(StepExecutionContext {
            project_root: ProjectRoot::new(PathBuf::from(dir.path()))?,
            process_timeout: None,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_and_failure() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ctx = ctx(&dir)?;

        let ok = ToolStep::new("true", shell_tool("exit 0"), vec![]);
        assert!(ok.execute(&ctx).await?.is_success());

        let fail = ToolStep::new("false", shell_tool("echo boom >&2; exit 7"), vec![]);
        match fail.execute(&ctx).await? {
            StepExecutionResult::Error { stderr, .. } => {
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected error, got {:?}", other),
        }
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_project_root() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let ctx = ctx(&dir)?;
        let step = ToolStep::new("touch", shell_tool("touch marker"), vec![]);
        assert!(step.execute(&ctx).await?.is_success());
        assert!(dir.path().join("marker").exists());
        Ok(())
    }
}
