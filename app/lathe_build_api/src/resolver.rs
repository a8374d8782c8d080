/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use dupe::Dupe;
use lathe_core::target::BuildTarget;
use thiserror::Error;

use crate::rule::BuildRule;

/// Flavor defaulting chains are short: each hop appends at most one flavor
/// from a domain the target didn't have. Anything longer is a dispatch bug.
const MAX_REDIRECTS: usize = 16;

#[derive(Debug, Error)]
enum ResolverError {
    #[error(
        "Internal error: dispatching {requested} did not terminate after {} redirects \
         (last target: {last})",
        MAX_REDIRECTS
    )]
    RedirectLoop {
        requested: BuildTarget,
        last: BuildTarget,
    },
    #[error("No rule description registered for {0}")]
    UnknownTarget(BuildTarget),
}

/// The outcome of one dispatch attempt for a target: either the dispatcher
/// canonicalized the target by adding implied flavors and asks for the new
/// target to be resolved instead, or it constructed the terminal rule.
/// Redirects forward identity: the original request's result is the
/// redirected target's rule.
pub enum DispatchResult {
    Redirect(BuildTarget),
    Rule(Arc<dyn BuildRule>),
}

impl std::fmt::Debug for DispatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchResult::Redirect(target) => {
                f.debug_tuple("Redirect").field(target).finish()
            }
            DispatchResult::Rule(rule) => {
                f.debug_tuple("Rule").field(rule.target()).finish()
            }
        }
    }
}

/// Constructs rules for targets. Implementations are the flavor-dispatch
/// state machines; they may call back into the resolver to require rules
/// for derived targets.
pub trait RuleDescription: Send + Sync {
    fn dispatch(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult>;
}

/// Routes dispatch to the description owning each logical target. This is
/// the seam to the target-graph front end, which is an external
/// collaborator: it decides which description a target belongs to, we only
/// consume the mapping.
#[derive(Default)]
pub struct RuleDescriptionRegistry {
    descriptions: HashMap<BuildTarget, Arc<dyn RuleDescription>>,
}

impl RuleDescriptionRegistry {
    pub fn new() -> RuleDescriptionRegistry {
        RuleDescriptionRegistry::default()
    }

    /// Registers the description for every flavored variant of `target`.
    pub fn register(
        &mut self,
        target: BuildTarget,
        description: Arc<dyn RuleDescription>,
    ) {
        self.descriptions.insert(target.unflavored(), description);
    }
}

impl RuleDescription for RuleDescriptionRegistry {
    fn dispatch(
        &self,
        target: &BuildTarget,
        resolver: &BuildRuleResolver,
    ) -> anyhow::Result<DispatchResult> {
        match self.descriptions.get(&target.unflavored()) {
            Some(description) => description.dispatch(target, resolver),
            None => Err(ResolverError::UnknownTarget(target.dupe()).into()),
        }
    }
}

/// The memoizing rule index. Get-or-create is the only mutation, and it is
/// idempotent per target: duplicate requests return the same instance.
pub struct BuildRuleResolver {
    description: Box<dyn RuleDescription>,
    index: Mutex<HashMap<BuildTarget, Arc<dyn BuildRule>>>,
}

impl BuildRuleResolver {
    pub fn new(description: impl RuleDescription + 'static) -> BuildRuleResolver {
        BuildRuleResolver {
            description: Box::new(description),
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_rule_if_present(&self, target: &BuildTarget) -> Option<Arc<dyn BuildRule>> {
        self.index.lock().unwrap().get(target).map(|r| r.dupe())
    }

    /// Registers a rule under its own target, returning the already-present
    /// instance if one exists. Descriptions use this for sub-rules they
    /// construct eagerly.
    pub fn add_to_index(&self, rule: Arc<dyn BuildRule>) -> Arc<dyn BuildRule> {
        self.index
            .lock()
            .unwrap()
            .entry(rule.target().dupe())
            .or_insert(rule)
            .dupe()
    }

    /// Resolves a target to its rule, driving redirects until a terminal
    /// rule is produced. The result is indexed under every target on the
    /// redirect chain, so re-requesting any spelling of the target returns
    /// the same rule instance.
    pub fn require_rule(&self, target: &BuildTarget) -> anyhow::Result<Arc<dyn BuildRule>> {
        let mut chain = vec![target.dupe()];
        let mut current = target.dupe();
        for _ in 0..MAX_REDIRECTS {
            if let Some(rule) = self.get_rule_if_present(&current) {
                self.index_chain(&chain, &rule);
                return Ok(rule);
            }
            match self.description.dispatch(&current, self)? {
                DispatchResult::Redirect(next) => {
                    tracing::debug!("redirect {} -> {}", current, next);
                    chain.push(next.dupe());
                    current = next;
                }
                DispatchResult::Rule(rule) => {
                    let rule = self.add_to_index(rule);
                    self.index_chain(&chain, &rule);
                    return Ok(rule);
                }
            }
        }
        Err(ResolverError::RedirectLoop {
            requested: target.dupe(),
            last: current,
        }
        .into())
    }

    fn index_chain(&self, chain: &[BuildTarget], rule: &Arc<dyn BuildRule>) {
        let mut index = self.index.lock().unwrap();
        for target in chain {
            index.entry(target.dupe()).or_insert_with(|| rule.dupe());
        }
    }

    /// Every rule the resolver has constructed so far.
    pub fn rules(&self) -> Vec<Arc<dyn BuildRule>> {
        self.index.lock().unwrap().values().map(|r| r.dupe()).collect()
    }
}

#[cfg(test)]
mod tests {
    use lathe_core::flavor::Flavor;

    use super::*;
    use crate::rule::BuildableContext;
    use crate::step::Step;

    struct NopRule {
        target: BuildTarget,
    }

    impl BuildRule for NopRule {
        fn target(&self) -> &BuildTarget {
            &self.target
        }

        fn deps(&self) -> Vec<Arc<dyn BuildRule>> {
            Vec::new()
        }

        fn build_steps(
            &self,
            _buildable: &Arc<BuildableContext>,
        ) -> anyhow::Result<Vec<Box<dyn Step>>> {
            Ok(Vec::new())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    /// Redirects until the `canonical` flavor is present, then builds.
    struct DefaultingDescription;

    impl RuleDescription for DefaultingDescription {
        fn dispatch(
            &self,
            target: &BuildTarget,
            _resolver: &BuildRuleResolver,
        ) -> anyhow::Result<DispatchResult> {
            let canonical = Flavor::unchecked_new("canonical");
            if !target.flavors().contains(&canonical) {
                return Ok(DispatchResult::Redirect(
                    target.with_appended_flavors([canonical]),
                ));
            }
            Ok(DispatchResult::Rule(Arc::new(NopRule {
                target: target.dupe(),
            })))
        }
    }

    #[test]
    fn test_redirect_forwards_identity() -> anyhow::Result<()> {
        let resolver = BuildRuleResolver::new(DefaultingDescription);
        let bare = BuildTarget::new("a", "b")?;
        let rule = resolver.require_rule(&bare)?;
        assert!(rule.target().flavors().contains(&Flavor::unchecked_new("canonical")));

        // Both spellings resolve to the same instance.
        let again = resolver.require_rule(&bare)?;
        assert!(Arc::ptr_eq(&rule, &again));
        let canonical = resolver.require_rule(rule.target())?;
        assert!(Arc::ptr_eq(&rule, &canonical));
        Ok(())
    }

    struct LoopingDescription;

    impl RuleDescription for LoopingDescription {
        fn dispatch(
            &self,
            target: &BuildTarget,
            _resolver: &BuildRuleResolver,
        ) -> anyhow::Result<DispatchResult> {
            let n = target.flavors().len();
            Ok(DispatchResult::Redirect(target.with_appended_flavors([
                Flavor::unchecked_new(&format!("hop-{}", n)),
            ])))
        }
    }

    #[test]
    fn test_redirect_loop_is_detected() -> anyhow::Result<()> {
        let resolver = BuildRuleResolver::new(LoopingDescription);
        let err = resolver
            .require_rule(&BuildTarget::new("a", "b")?)
            .unwrap_err();
        assert!(err.to_string().contains("did not terminate"));
        Ok(())
    }
}
