/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::process::ExitStatus;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use futures::future::try_join3;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

pub enum GatherOutputStatus {
    Finished(ExitStatus),
    TimedOut(Duration),
}

/// Runs a command to completion, gathering stdout and stderr. When a timeout
/// is given and expires, the child is killed and `TimedOut` is returned;
/// whatever output was produced before the kill is still gathered.
pub async fn gather_output(
    mut cmd: Command,
    timeout: Option<Duration>,
) -> anyhow::Result<(GatherOutputStatus, Vec<u8>, Vec<u8>)> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("Failed to start command")?;

    let mut stdout = child.stdout.take().expect("piped() above");
    let mut stderr = child.stderr.take().expect("piped() above");

    let status = async move {
        let status = match timeout {
            Some(t) => match tokio::time::timeout(t, child.wait()).await {
                Ok(r) => r?,
                Err(..) => {
                    child
                        .start_kill()
                        .context("Failed to terminate child after timeout")?;
                    let _ = child.wait().await;
                    return anyhow::Ok(GatherOutputStatus::TimedOut(t));
                }
            },
            None => child.wait().await?,
        };
        Ok(GatherOutputStatus::Finished(status))
    };

    let stdout = async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        anyhow::Ok(buf)
    };

    let stderr = async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        anyhow::Ok(buf)
    };

    let (status, stdout, stderr) = try_join3(status, stdout, stderr)
        .await
        .context("Failed to wait for command to exit")?;

    Ok((status, stdout, stderr))
}

#[cfg(test)]
mod tests {
    use std::str;

    use super::*;

    fn shell(script: &str) -> Command {
        let mut cmd = if cfg!(windows) {
            Command::new("powershell")
        } else {
            Command::new("sh")
        };
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn test_gather_output() -> anyhow::Result<()> {
        let (status, stdout, _) = gather_output(shell("echo hello"), None).await?;
        assert!(matches!(status, GatherOutputStatus::Finished(s) if s.code() == Some(0)));
        assert_eq!(str::from_utf8(&stdout)?.trim(), "hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_exit_code() -> anyhow::Result<()> {
        let (status, ..) = gather_output(shell("exit 3"), None).await?;
        assert!(matches!(status, GatherOutputStatus::Finished(s) if s.code() == Some(3)));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() -> anyhow::Result<()> {
        let (status, ..) =
            gather_output(shell("sleep 10"), Some(Duration::from_millis(100))).await?;
        assert!(matches!(status, GatherOutputStatus::TimedOut(..)));
        Ok(())
    }
}
