/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::any::Any;
use std::sync::Arc;
use std::sync::Mutex;

use dupe::Dupe;
use indexmap::IndexSet;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::target::BuildTarget;

use crate::step::Step;

/// Structured categories a rule may declare membership in, queried by other
/// rules instead of inspecting concrete types.
#[derive(Copy, Clone, Dupe, Debug, PartialEq, Eq, Hash)]
pub enum RuleCapability {
    ProducesStaticLibrary,
    ProducesCompiledObject,
    IsNativeLinkable,
    /// The rule's output is a linked (or linked-then-transformed) binary
    /// that debug-format wrapping rules know how to handle.
    LinkedBinary,
}

/// Advisory scheduling weight. A rule with a multiplier above one consumes
/// that many scheduler slots while its steps run, which keeps large native
/// links from oversubscribing memory and IO.
#[derive(Copy, Clone, Dupe, Debug, PartialEq, Eq)]
pub struct RuleScheduleInfo {
    jobs_multiplier: usize,
}

impl RuleScheduleInfo {
    pub const DEFAULT: RuleScheduleInfo = RuleScheduleInfo { jobs_multiplier: 1 };

    pub fn with_jobs_multiplier(jobs_multiplier: usize) -> RuleScheduleInfo {
        RuleScheduleInfo {
            jobs_multiplier: jobs_multiplier.max(1),
        }
    }

    pub fn jobs_multiplier(&self) -> usize {
        self.jobs_multiplier
    }
}

impl Default for RuleScheduleInfo {
    fn default() -> RuleScheduleInfo {
        RuleScheduleInfo::DEFAULT
    }
}

/// The identity and dependency set a rule is constructed from. Immutable
/// builder value: methods return a new params, and the set is finalized when
/// the rule is constructed — a published rule's dependency set is never
/// mutated.
#[derive(Clone)]
pub struct BuildRuleParams {
    target: BuildTarget,
    declared_deps: Vec<Arc<dyn BuildRule>>,
    extra_deps: Vec<Arc<dyn BuildRule>>,
}

impl BuildRuleParams {
    pub fn new(target: BuildTarget) -> BuildRuleParams {
        BuildRuleParams {
            target,
            declared_deps: Vec::new(),
            extra_deps: Vec::new(),
        }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    pub fn with_target(mut self, target: BuildTarget) -> BuildRuleParams {
        self.target = target;
        self
    }

    pub fn with_declared_deps(
        mut self,
        deps: impl IntoIterator<Item = Arc<dyn BuildRule>>,
    ) -> BuildRuleParams {
        self.declared_deps = deps.into_iter().collect();
        self
    }

    /// Extra dependencies discovered while building constructor arguments
    /// (e.g. the rules producing path-bearing linker arguments).
    pub fn append_extra_deps(
        mut self,
        deps: impl IntoIterator<Item = Arc<dyn BuildRule>>,
    ) -> BuildRuleParams {
        self.extra_deps.extend(deps);
        self
    }

    /// Declared and extra dependencies, declared first, duplicates removed
    /// by target.
    pub fn deps(&self) -> Vec<Arc<dyn BuildRule>> {
        let mut seen = IndexSet::new();
        let mut out = Vec::new();
        for dep in self.declared_deps.iter().chain(self.extra_deps.iter()) {
            if seen.insert(dep.target().dupe()) {
                out.push(dep.dupe());
            }
        }
        out
    }
}

/// A node in the action graph. Constructed once per unique target by a rule
/// description, memoized in the resolver, and never mutated afterwards.
pub trait BuildRule: Send + Sync + Any {
    fn target(&self) -> &BuildTarget;

    /// Rules whose outputs this rule reads. The executor guarantees all of
    /// them completed successfully before any of this rule's steps run.
    fn deps(&self) -> Vec<Arc<dyn BuildRule>>;

    /// The ordered steps that produce this rule's outputs. Called once per
    /// execution; artifact recording happens here or inside the returned
    /// steps.
    fn build_steps(
        &self,
        buildable: &Arc<BuildableContext>,
    ) -> anyhow::Result<Vec<Box<dyn Step>>>;

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        None
    }

    fn is_cacheable(&self) -> bool {
        true
    }

    fn schedule_info(&self) -> RuleScheduleInfo {
        RuleScheduleInfo::DEFAULT
    }

    fn capabilities(&self) -> &[RuleCapability] {
        &[]
    }

    /// The sibling linker map emitted next to this rule's output, when the
    /// rule produced one. Multiarch composition collects these into the fat
    /// target's side-artifact directory.
    fn linker_map_path(&self) -> Option<ProjectRelativePathBuf> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

impl dyn BuildRule {
    pub fn has_capability(&self, capability: RuleCapability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::fmt::Debug for dyn BuildRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRule")
            .field("target", self.target())
            .finish()
    }
}

/// Collects the output paths a rule declares eligible for caching. One
/// context exists per rule execution; recording is the only mutation and a
/// path may be recorded more than once.
#[derive(Default)]
pub struct BuildableContext {
    artifacts: Mutex<IndexSet<ProjectRelativePathBuf>>,
}

impl BuildableContext {
    pub fn new() -> Arc<BuildableContext> {
        Arc::new(BuildableContext::default())
    }

    pub fn record_artifact(&self, path: ProjectRelativePathBuf) {
        self.artifacts.lock().unwrap().insert(path);
    }

    pub fn recorded_artifacts(&self) -> Vec<ProjectRelativePathBuf> {
        self.artifacts.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_info_floor() {
        assert_eq!(
            RuleScheduleInfo::with_jobs_multiplier(0).jobs_multiplier(),
            1
        );
        assert_eq!(
            RuleScheduleInfo::with_jobs_multiplier(4).jobs_multiplier(),
            4
        );
    }

    #[test]
    fn test_record_artifact_dedupes() {
        let ctx = BuildableContext::new();
        let p = ProjectRelativePathBuf::unchecked_new("out/a".to_owned());
        ctx.record_artifact(p.clone());
        ctx.record_artifact(p);
        assert_eq!(ctx.recorded_artifacts().len(), 1);
    }
}
