/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The relink ("xdso-dce") pass: narrows a shared library's exported symbol
//! surface to what its consumers actually require, by re-linking with a
//! synthesized version script. The analysis operates purely on post-link
//! symbol tables, so every front end (C, C++, Objective-C, Swift) passes
//! through the same logic.

pub mod symbols;

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dupe::Dupe;
use indexmap::IndexMap;
use lathe_build_api::rule::BuildRule;
use lathe_build_api::rule::BuildRuleParams;
use lathe_build_api::rule::BuildableContext;
use lathe_build_api::rule::RuleScheduleInfo;
use lathe_build_api::source_path::SourcePath;
use lathe_build_api::step::Step;
use lathe_build_api::step::StepExecutionContext;
use lathe_build_api::step::StepExecutionResult;
use lathe_build_api::steps::fs::MakeCleanDirectoryStep;
use lathe_build_api::tool::Tool;
use lathe_core::flavor::Flavor;
use lathe_core::fs::fs_util;
use lathe_core::fs::project::ProjectRelativePath;
use lathe_core::fs::project::ProjectRelativePathBuf;
use lathe_core::paths;
use lathe_core::target::BuildTarget;
use regex::RegexSet;
use thiserror::Error;

use crate::config::CxxConfig;
use crate::link::CxxLink;
use crate::link::LinkArg;
use crate::linker::Linker;
use crate::linker_map_mode::LinkerMapMode;
use crate::relinker::symbols::Symbols;

#[derive(Debug, Error)]
enum RelinkerError {
    #[error("Relink sources form a dependency cycle involving {0}")]
    DependencyCycle(BuildTarget),
    #[error("Relink source {0} depends on unknown source {1}")]
    UnknownDependency(BuildTarget, BuildTarget),
}

/// Symbols kept exported even when no consumer references them. Runtime
/// bridges look these up by name, so the symbol-table diff cannot see the
/// caller.
pub trait KeepSymbolPredicate: Send + Sync {
    fn always_keep(&self, symbol: &str) -> bool;
}

/// Keeps JNI entry points: `JNI_OnLoad` hooks and `Java_`-mangled native
/// methods.
pub struct JniKeepPredicate;

impl KeepSymbolPredicate for JniKeepPredicate {
    fn always_keep(&self, symbol: &str) -> bool {
        symbol.contains("JNI_OnLoad") || symbol.contains("Java_")
    }
}

/// The version script hiding everything but the keep set: the intersection
/// of needed and defined symbols, plus whatever the always-keep predicate
/// preserves. The textual grammar is a contract with the system linker.
fn version_script(
    needed: &BTreeSet<String>,
    defined: &BTreeSet<String>,
    keep_predicate: &dyn KeepSymbolPredicate,
) -> String {
    let keep: BTreeSet<&str> = needed
        .intersection(defined)
        .map(String::as_str)
        .chain(
            defined
                .iter()
                .filter(|s| keep_predicate.always_keep(s))
                .map(String::as_str),
        )
        .collect();

    let mut res = String::from("{\n");
    if !keep.is_empty() {
        res.push_str("global:\n");
    }
    for symbol in &keep {
        res.push_str("  ");
        res.push_str(symbol);
        res.push_str(";\n");
    }
    res.push_str("local: *;\n};\n");
    res
}

/// Whether a library may have its exports narrowed: anything we linked from
/// source qualifies, plus whitelisted prebuilts. Everything else passes
/// through unchanged, since vendor libraries' symbol visibility cannot be
/// safely narrowed.
pub fn is_relinkable(
    target: &BuildTarget,
    built_from_source: bool,
    whitelist: Option<&RegexSet>,
) -> bool {
    built_from_source || whitelist.map_or(false, |w| w.is_match(&target.to_string()))
}

/// Re-links one shared library against the union of its consumers' needed
/// symbols, and emits its own needed-symbols file for the libraries it
/// depends on. The needed-symbols data flows against the build dependency
/// direction: a dependency's relink consumes its dependents' outputs.
pub struct RelinkerRule {
    params: BuildRuleParams,
    symbols_needed_paths: Vec<SourcePath>,
    base_library: SourcePath,
    objdump: Tool,
    is_relinkable: bool,
    linker: Arc<dyn Linker>,
    linker_args: Vec<LinkArg>,
    /// Pre-validated at construction; a linker without version-script
    /// support indicates a dispatch bug, not a user error.
    version_script_args: Vec<String>,
    keep_predicate: Arc<dyn KeepSymbolPredicate>,
    arch: String,
    cxx_config: CxxConfig,
}

impl RelinkerRule {
    pub fn new(
        params: BuildRuleParams,
        cxx_config: CxxConfig,
        symbols_needed_paths: Vec<SourcePath>,
        objdump: Tool,
        base_library: SourcePath,
        is_relinkable: bool,
        linker: Arc<dyn Linker>,
        linker_args: Vec<LinkArg>,
        keep_predicate: Arc<dyn KeepSymbolPredicate>,
        arch: String,
    ) -> anyhow::Result<RelinkerRule> {
        let version_script_args = if is_relinkable {
            let scratch = Self::scratch_dir_for(params.target(), &arch);
            let version_file = Self::scratch_file_for(&scratch, &base_library, "__version.exp");
            linker.version_script_args(&version_file)?
        } else {
            Vec::new()
        };
        Ok(RelinkerRule {
            params,
            symbols_needed_paths,
            base_library,
            objdump,
            is_relinkable,
            linker,
            linker_args,
            version_script_args,
            keep_predicate,
            arch,
            cxx_config,
        })
    }

    // ld doesn't like commas in version script paths, so the scratch dir
    // uses the comma-free rendering of the flavored name.
    fn scratch_dir_for(target: &BuildTarget, arch: &str) -> ProjectRelativePathBuf {
        let path = paths::scratch_path(target, "%s");
        let dirname = path.file_name().replace(',', ".");
        let base = match path.parent() {
            Some(parent) => parent.join(dirname),
            None => ProjectRelativePathBuf::unchecked_new(dirname),
        };
        base.join(arch)
    }

    fn scratch_file_for(
        scratch_dir: &ProjectRelativePath,
        base_library: &SourcePath,
        suffix: &str,
    ) -> ProjectRelativePathBuf {
        scratch_dir.join(format!("{}{}", base_library.path().file_stem(), suffix))
    }

    fn scratch_dir(&self) -> ProjectRelativePathBuf {
        Self::scratch_dir_for(self.params.target(), &self.arch)
    }

    fn scratch_file(&self, suffix: &str) -> ProjectRelativePathBuf {
        Self::scratch_file_for(&self.scratch_dir(), &self.base_library, suffix)
    }

    fn lib_file_path(&self) -> ProjectRelativePathBuf {
        self.scratch_dir().join(self.base_library.path().file_name())
    }

    fn version_file_path(&self) -> ProjectRelativePathBuf {
        self.scratch_file("__version.exp")
    }

    fn symbols_needed_out_path(&self) -> ProjectRelativePathBuf {
        self.scratch_file(".symbols")
    }

    /// The relinked library, as an input for dependent rules.
    pub fn lib_output(&self) -> SourcePath {
        SourcePath::BuildTargetOutput {
            target: self.params.target().dupe(),
            path: self.lib_file_path(),
        }
    }

    /// This rule's needed-symbols artifact, consumed by the relink rules of
    /// the libraries this library depends on. Declaring it as an ordinary
    /// input makes the reverse data flow a normal scheduling edge.
    pub fn symbols_needed_output(&self) -> SourcePath {
        SourcePath::BuildTargetOutput {
            target: self.params.target().dupe(),
            path: self.symbols_needed_out_path(),
        }
    }
}

impl BuildRule for RelinkerRule {
    fn target(&self) -> &BuildTarget {
        self.params.target()
    }

    fn deps(&self) -> Vec<Arc<dyn BuildRule>> {
        self.params.deps()
    }

    fn build_steps(
        &self,
        buildable: &Arc<BuildableContext>,
    ) -> anyhow::Result<Vec<Box<dyn Step>>> {
        let mut relinker_steps = Vec::new();
        if self.is_relinkable {
            let mut args = self.linker_args.clone();
            args.extend(
                self.version_script_args
                    .iter()
                    .map(|a| LinkArg::literal(a.clone())),
            );

            let link_target = LinkerMapMode::add_default_flavor_if_needed(
                &self
                    .params
                    .target()
                    .with_appended_flavors([Flavor::unchecked_new("cxx-link")]),
            );
            let link = CxxLink::new(
                self.params.clone().with_target(link_target),
                self.linker.dupe(),
                self.lib_file_path(),
                args,
                Vec::new(),
                self.cxx_config.link_schedule_info,
                self.cxx_config.cache_links,
            )?;
            relinker_steps = link.build_steps(buildable)?;
            buildable.record_artifact(self.version_file_path());
        }

        buildable.record_artifact(self.symbols_needed_out_path());

        Ok(vec![
            Box::new(MakeCleanDirectoryStep {
                path: self.scratch_dir(),
            }),
            Box::new(RelinkStep {
                buildable: buildable.dupe(),
                is_relinkable: self.is_relinkable,
                base_library: self.base_library.path().to_owned(),
                lib_file: self.lib_file_path(),
                version_file: self.version_file_path(),
                symbols_needed_out: self.symbols_needed_out_path(),
                symbols_needed_paths: self
                    .symbols_needed_paths
                    .iter()
                    .map(|s| s.path().to_owned())
                    .collect(),
                objdump: self.objdump.clone(),
                keep_predicate: self.keep_predicate.dupe(),
                relinker_steps,
            }),
        ])
    }

    fn output_path(&self) -> Option<&ProjectRelativePath> {
        // The scratch-relative lib path is derived, not stored; dependents
        // use `lib_output()` instead.
        None
    }

    fn schedule_info(&self) -> RuleScheduleInfo {
        self.cxx_config.link_schedule_info_or_default()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// The single build step carrying out the relink analysis. Wraps the
/// ordinary link sub-pipeline: any failure inside it aborts before the
/// symbol-writing step runs.
struct RelinkStep {
    buildable: Arc<BuildableContext>,
    is_relinkable: bool,
    base_library: ProjectRelativePathBuf,
    lib_file: ProjectRelativePathBuf,
    version_file: ProjectRelativePathBuf,
    symbols_needed_out: ProjectRelativePathBuf,
    symbols_needed_paths: Vec<ProjectRelativePathBuf>,
    objdump: Tool,
    keep_predicate: Arc<dyn KeepSymbolPredicate>,
    relinker_steps: Vec<Box<dyn Step>>,
}

impl RelinkStep {
    fn read_symbols_needed(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<BTreeSet<String>> {
        let mut needed = BTreeSet::new();
        for path in &self.symbols_needed_paths {
            let contents = fs_util::read_to_string(ctx.project_root.resolve(path))?;
            needed.extend(
                contents
                    .lines()
                    .filter(|l| !l.is_empty())
                    .map(|l| l.to_owned()),
            );
        }
        Ok(needed)
    }

    fn write_symbols(
        &self,
        ctx: &StepExecutionContext,
        symbols: &BTreeSet<String>,
    ) -> anyhow::Result<()> {
        let mut contents = String::new();
        for symbol in symbols {
            contents.push_str(symbol);
            contents.push('\n');
        }
        fs_util::write(ctx.project_root.resolve(&self.symbols_needed_out), contents)
    }
}

#[async_trait]
impl Step for RelinkStep {
    fn short_name(&self) -> &'static str {
        "xdso-dce relinker"
    }

    fn describe(&self) -> String {
        format!("relink {} -> {}", self.base_library, self.lib_file)
    }

    async fn execute(
        &self,
        ctx: &StepExecutionContext,
    ) -> anyhow::Result<StepExecutionResult> {
        let symbols_needed = self.read_symbols_needed(ctx)?;

        tracing::debug!(
            relinkable = self.is_relinkable,
            needed = symbols_needed.len(),
            "{}",
            self.describe()
        );
        if !self.is_relinkable {
            fs_util::copy_file(
                ctx.project_root.resolve(&self.base_library),
                ctx.project_root.resolve(&self.lib_file),
            )?;
            self.buildable.record_artifact(self.lib_file.clone());
        } else {
            let base_symbols =
                Symbols::extract(&self.objdump, &ctx.project_root.resolve(&self.base_library))
                    .await?;
            let script = version_script(
                &symbols_needed,
                &base_symbols.defined(),
                &*self.keep_predicate,
            );
            fs_util::write(ctx.project_root.resolve(&self.version_file), script)?;
            for step in &self.relinker_steps {
                let result = step.execute(ctx).await?;
                if !result.is_success() {
                    return Ok(result);
                }
            }
        }

        let lib_symbols =
            Symbols::extract(&self.objdump, &ctx.project_root.resolve(&self.lib_file)).await?;
        let mut out = symbols_needed;
        out.extend(lib_symbols.undefined);
        self.write_symbols(ctx, &out)?;
        Ok(StepExecutionResult::Success)
    }
}

/// One shared library entering the relink pass.
pub struct RelinkSource {
    pub target: BuildTarget,
    pub base_library: SourcePath,
    /// The rule that produced the base library, when it was built here.
    pub base_rule: Option<Arc<dyn BuildRule>>,
    pub linker: Arc<dyn Linker>,
    pub linker_args: Vec<LinkArg>,
    pub is_relinkable: bool,
    pub arch: String,
    /// Dependency edges onto other relink sources.
    pub deps: Vec<BuildTarget>,
}

/// Wires the whole-graph relink: one [`RelinkerRule`] per library, where a
/// library's rule consumes the needed-symbols outputs of its dependents'
/// rules. Rules are constructed dependents-first so those outputs exist to
/// reference.
pub struct NativeRelinker {
    rules: IndexMap<BuildTarget, Arc<RelinkerRule>>,
}

impl std::fmt::Debug for NativeRelinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRelinker")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NativeRelinker {
    pub fn relinker_flavor() -> Flavor {
        Flavor::unchecked_new("relinker")
    }

    pub fn transform(
        cxx_config: &CxxConfig,
        keep_predicate: Arc<dyn KeepSymbolPredicate>,
        objdump: Tool,
        sources: Vec<RelinkSource>,
    ) -> anyhow::Result<NativeRelinker> {
        let index: HashMap<BuildTarget, usize> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.target.dupe(), i))
            .collect();

        // Reverse adjacency plus a pending-dependents count per source.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); sources.len()];
        let mut pending: Vec<usize> = vec![0; sources.len()];
        for (i, source) in sources.iter().enumerate() {
            for dep in &source.deps {
                let j = *index.get(dep).ok_or_else(|| {
                    RelinkerError::UnknownDependency(source.target.dupe(), dep.dupe())
                })?;
                dependents[j].push(i);
                pending[j] += 1;
            }
        }

        let mut queue: Vec<usize> = (0..sources.len()).filter(|i| pending[*i] == 0).collect();
        let mut rules: IndexMap<BuildTarget, Arc<RelinkerRule>> = IndexMap::new();
        let mut by_index: Vec<Option<Arc<RelinkerRule>>> = vec![None; sources.len()];

        while let Some(i) = queue.pop() {
            let source = &sources[i];
            let mut symbols_needed = Vec::new();
            let mut dep_rules: Vec<Arc<dyn BuildRule>> = Vec::new();
            for d in &dependents[i] {
                let dependent_rule = by_index[*d]
                    .as_ref()
                    .expect("dependents are processed before their dependencies");
                symbols_needed.push(dependent_rule.symbols_needed_output());
                dep_rules.push(dependent_rule.dupe() as Arc<dyn BuildRule>);
            }
            if let Some(base_rule) = &source.base_rule {
                dep_rules.push(base_rule.dupe());
            }

            let relink_target = source
                .target
                .with_appended_flavors([Self::relinker_flavor()]);
            let rule = Arc::new(RelinkerRule::new(
                BuildRuleParams::new(relink_target).append_extra_deps(dep_rules),
                cxx_config.clone(),
                symbols_needed,
                objdump.clone(),
                source.base_library.clone(),
                source.is_relinkable,
                source.linker.dupe(),
                source.linker_args.clone(),
                keep_predicate.dupe(),
                source.arch.clone(),
            )?);
            by_index[i] = Some(rule.dupe());
            rules.insert(source.target.dupe(), rule);

            for dep in &sources[i].deps {
                let j = index[dep];
                pending[j] -= 1;
                if pending[j] == 0 {
                    queue.push(j);
                }
            }
        }

        if rules.len() != sources.len() {
            let stuck = sources
                .iter()
                .find(|s| !rules.contains_key(&s.target))
                .expect("at least one source is unprocessed");
            return Err(RelinkerError::DependencyCycle(stuck.target.dupe()).into());
        }

        Ok(NativeRelinker { rules })
    }

    pub fn get(&self, target: &BuildTarget) -> Option<&Arc<RelinkerRule>> {
        self.rules.get(target)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<RelinkerRule>> {
        self.rules.values()
    }
}
