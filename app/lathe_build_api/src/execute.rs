/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The parallel rule executor. Independent rules run concurrently on the
//! runtime; each rule's own step list executes strictly sequentially with a
//! fail-fast policy. A failure is local to the failing rule and its
//! transitive dependents; independent siblings proceed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use dupe::Dupe;
use futures::future::BoxFuture;
use futures::future::FutureExt;
use futures::future::Shared;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::fs::project::ProjectRoot;
use lathe_core::target::BuildTarget;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::rule::BuildRule;
use crate::rule::BuildableContext;
use crate::step::StepExecutionContext;
use crate::step::StepExecutionResult;

#[derive(Clone, Debug, Error)]
pub enum BuildRuleError {
    #[error("{target}: step `{step}` failed: {description}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    StepFailed {
        target: BuildTarget,
        step: &'static str,
        description: String,
        stdout: String,
        stderr: String,
    },
    #[error("{target}: {error:#}")]
    Failed {
        target: BuildTarget,
        error: Arc<anyhow::Error>,
    },
    #[error("{target}: dependency {dep} failed to build")]
    DepFailed { target: BuildTarget, dep: BuildTarget },
}

impl BuildRuleError {
    fn failed(target: BuildTarget, error: anyhow::Error) -> BuildRuleError {
        BuildRuleError::Failed {
            target,
            error: Arc::new(error),
        }
    }

    pub fn target(&self) -> &BuildTarget {
        match self {
            BuildRuleError::StepFailed { target, .. } => target,
            BuildRuleError::Failed { target, .. } => target,
            BuildRuleError::DepFailed { target, .. } => target,
        }
    }
}

/// What a successfully-built rule left behind. Output artifacts are
/// immutable once this exists; they are the only channel through which one
/// rule may observe another's results.
#[derive(Debug)]
pub struct RuleOutput {
    pub target: BuildTarget,
    pub output_path: Option<ProjectRelativePathBuf>,
    /// Paths recorded as eligible for caching/upload.
    pub artifacts: Vec<ProjectRelativePathBuf>,
    pub cacheable: bool,
}

pub struct ExecutorConfig {
    /// Total scheduler slots. Heavyweight rules consume several.
    pub jobs: usize,
    /// Applied per external process invocation.
    pub process_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> ExecutorConfig {
        ExecutorConfig {
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            process_timeout: None,
        }
    }
}

type RuleResult = Result<Arc<RuleOutput>, BuildRuleError>;
type SharedRuleFuture = Shared<BoxFuture<'static, RuleResult>>;

/// Executes rule DAGs. At most one execution is started per target; repeat
/// requests await the same in-flight (or finished) execution.
pub struct RuleExecutor {
    step_ctx: StepExecutionContext,
    slots: Arc<Semaphore>,
    total_slots: usize,
    in_flight: Mutex<HashMap<BuildTarget, SharedRuleFuture>>,
}

impl RuleExecutor {
    pub fn new(project_root: ProjectRoot, config: ExecutorConfig) -> Arc<RuleExecutor> {
        let jobs = config.jobs.max(1);
        Arc::new(RuleExecutor {
            step_ctx: StepExecutionContext {
                project_root,
                process_timeout: config.process_timeout,
            },
            slots: Arc::new(Semaphore::new(jobs)),
            total_slots: jobs,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub async fn build(self: &Arc<Self>, rule: Arc<dyn BuildRule>) -> RuleResult {
        self.rule_future(rule).await
    }

    fn rule_future(self: &Arc<Self>, rule: Arc<dyn BuildRule>) -> SharedRuleFuture {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(fut) = in_flight.get(rule.target()) {
            return fut.clone();
        }
        let target = rule.target().dupe();
        let executor = self.dupe();
        let handle = tokio::spawn(async move {
            let rule_target = rule.target().dupe();
            executor.execute_rule(rule).await.map_err(|e| {
                tracing::debug!("{} failed: {:#}", rule_target, e);
                e
            })
        });
        let fut = {
            let target = target.dupe();
            async move {
                match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(BuildRuleError::failed(target, anyhow::Error::from(e))),
                }
            }
        }
        .boxed()
        .shared();
        in_flight.insert(target, fut.clone());
        fut
    }

    async fn execute_rule(self: &Arc<Self>, rule: Arc<dyn BuildRule>) -> RuleResult {
        let target = rule.target().dupe();

        // A rule never begins until every dependency completed successfully.
        let deps = rule.deps();
        let dep_futures = deps
            .into_iter()
            .map(|dep| self.rule_future(dep))
            .collect::<Vec<_>>();
        for result in futures::future::join_all(dep_futures).await {
            if let Err(e) = result {
                return Err(BuildRuleError::DepFailed {
                    target,
                    dep: e.target().dupe(),
                });
            }
        }

        // Heavyweight rules take several slots, but never more than exist.
        let permits = rule
            .schedule_info()
            .jobs_multiplier()
            .min(self.total_slots) as u32;
        let _permits = self
            .slots
            .acquire_many(permits)
            .await
            .expect("semaphore never closed");

        tracing::debug!("building {}", target);
        let buildable = BuildableContext::new();
        let steps = rule
            .build_steps(&buildable)
            .map_err(|e| BuildRuleError::failed(target.dupe(), e))?;

        for step in steps {
            let result = step
                .execute(&self.step_ctx)
                .await
                .map_err(|e| BuildRuleError::failed(target.dupe(), e))?;
            match result {
                StepExecutionResult::Success => {}
                StepExecutionResult::Error {
                    description,
                    stdout,
                    stderr,
                } => {
                    return Err(BuildRuleError::StepFailed {
                        target,
                        step: step.short_name(),
                        description,
                        stdout,
                        stderr,
                    });
                }
            }
        }

        Ok(Arc::new(RuleOutput {
            output_path: rule.output_path().map(|p| p.to_owned()),
            artifacts: buildable.recorded_artifacts(),
            cacheable: rule.is_cacheable(),
            target,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use lathe_core::fs::project::ProjectRelativePath;
    use tempfile::TempDir;

    use super::*;
    use crate::step::Step;
    use crate::steps::fs::WriteFileStep;

    struct CountingStep {
        inner: WriteFileStep,
        executions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step for CountingStep {
        fn short_name(&self) -> &'static str {
            "counting_write"
        }

        fn describe(&self) -> String {
            self.inner.describe()
        }

        async fn execute(
            &self,
            ctx: &StepExecutionContext,
        ) -> anyhow::Result<StepExecutionResult> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(ctx).await
        }
    }

    struct FailStep;

    #[async_trait]
    impl Step for FailStep {
        fn short_name(&self) -> &'static str {
            "fail"
        }

        fn describe(&self) -> String {
            "always fails".to_owned()
        }

        async fn execute(
            &self,
            _ctx: &StepExecutionContext,
        ) -> anyhow::Result<StepExecutionResult> {
            Ok(StepExecutionResult::error("synthetic failure"))
        }
    }

    struct TestRule {
        target: BuildTarget,
        deps: Vec<Arc<dyn BuildRule>>,
        output: ProjectRelativePathBuf,
        fail: bool,
        executions: Arc<AtomicUsize>,
    }

    fn as_deps(rules: &[&Arc<TestRule>]) -> Vec<Arc<dyn BuildRule>> {
        rules
            .iter()
            .map(|r| (*r).clone() as Arc<dyn BuildRule>)
            .collect()
    }

    impl TestRule {
        fn new(name: &str, deps: Vec<Arc<dyn BuildRule>>) -> Arc<TestRule> {
            Arc::new(TestRule {
                target: BuildTarget::new("test", name).unwrap(),
                deps,
                output: ProjectRelativePathBuf::unchecked_new(format!("out/{}", name)),
                fail: false,
                executions: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn failing(name: &str, deps: Vec<Arc<dyn BuildRule>>) -> Arc<TestRule> {
            let mut rule = TestRule::new(name, deps);
            Arc::get_mut(&mut rule).unwrap().fail = true;
            rule
        }
    }

    impl BuildRule for TestRule {
        fn target(&self) -> &BuildTarget {
            &self.target
        }

        fn deps(&self) -> Vec<Arc<dyn BuildRule>> {
            self.deps.clone()
        }

        fn build_steps(
            &self,
            buildable: &Arc<BuildableContext>,
        ) -> anyhow::Result<Vec<Box<dyn Step>>> {
            if self.fail {
                return Ok(vec![Box::new(FailStep)]);
            }
            buildable.record_artifact(self.output.clone());
            Ok(vec![
                Box::new(crate::steps::fs::MkdirStep {
                    path: self.output.parent().unwrap().to_owned(),
                }),
                Box::new(CountingStep {
                    inner: WriteFileStep {
                        path: self.output.clone(),
                        contents: self.target.to_string().into_bytes(),
                        executable: false,
                    },
                    executions: self.executions.dupe(),
                }),
            ])
        }

        fn output_path(&self) -> Option<&ProjectRelativePath> {
            Some(&self.output)
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn executor(dir: &TempDir) -> anyhow::Result<Arc<RuleExecutor>> {
        Ok(RuleExecutor::new(
            ProjectRoot::new(PathBuf::from(dir.path()))?,
            ExecutorConfig {
                jobs: 4,
                process_timeout: None,
            },
        ))
    }

    #[tokio::test]
    async fn test_diamond_builds_each_rule_once() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let executor = executor(&dir)?;

        let base = TestRule::new("base", vec![]);
        let left = TestRule::new("left", as_deps(&[&base]));
        let right = TestRule::new("right", as_deps(&[&base]));
        let top = TestRule::new("top", as_deps(&[&left, &right]));

        let output = executor.build(top.clone()).await.unwrap();
        assert_eq!(output.target, *top.target());
        assert_eq!(output.artifacts.len(), 1);

        for rule in [&base, &left, &right, &top] {
            assert_eq!(rule.executions.load(Ordering::SeqCst), 1);
            assert!(dir
                .path()
                .join(rule.output.as_str())
                .exists());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_not_siblings() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let executor = executor(&dir)?;

        let bad = TestRule::failing("bad", vec![]);
        let good = TestRule::new("good", vec![]);
        let top = TestRule::new("top", as_deps(&[&bad, &good]));

        let err = executor.build(top.clone()).await.unwrap_err();
        assert!(matches!(err, BuildRuleError::DepFailed { .. }));
        // The dependent's own steps never ran.
        assert_eq!(top.executions.load(Ordering::SeqCst), 0);
        // The independent sibling still built.
        let good_result = executor.build(good.clone()).await;
        assert!(good_result.is_ok());
        assert_eq!(good.executions.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_step_failure_carries_diagnostics() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let executor = executor(&dir)?;
        let bad = TestRule::failing("solo-bad", vec![]);
        match executor.build(bad).await.unwrap_err() {
            BuildRuleError::StepFailed { step, description, .. } => {
                assert_eq!(step, "fail");
                assert!(description.contains("synthetic failure"));
            }
            other => panic!("expected StepFailed, got {:?}", other),
        }
        Ok(())
    }
}
