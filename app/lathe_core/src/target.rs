/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dupe::Dupe;
use thiserror::Error;

use crate::flavor::Flavor;
use crate::flavor::FlavorConvertible;
use crate::flavor::FlavorDomain;
use crate::flavor::FlavorSet;

#[derive(Debug, Error)]
enum BuildTargetError {
    #[error("Invalid target base path `{0}`")]
    InvalidBasePath(String),
    #[error("Invalid target name `{0}`")]
    InvalidName(String),
}

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct BuildTargetData {
    /// Forward-slash path of the package the target lives in, e.g. `apps/demo`.
    base_path: String,
    short_name: String,
    flavors: FlavorSet,
}

/// An identifier for a node in the build graph: a package path, a short
/// name, and a set of flavors. Targets are immutable; derived targets are
/// produced by adding or removing flavors, never by mutation.
#[derive(Clone, Dupe, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BuildTarget(Arc<BuildTargetData>);

impl BuildTarget {
    pub fn new(base_path: &str, short_name: &str) -> anyhow::Result<BuildTarget> {
        if base_path.starts_with('/') || base_path.contains('\\') || base_path.contains("//") {
            return Err(BuildTargetError::InvalidBasePath(base_path.to_owned()).into());
        }
        if short_name.is_empty()
            || short_name
                .chars()
                .any(|c| c == '#' || c == ':' || c == '/' || c.is_whitespace())
        {
            return Err(BuildTargetError::InvalidName(short_name.to_owned()).into());
        }
        Ok(BuildTarget(Arc::new(BuildTargetData {
            base_path: base_path.to_owned(),
            short_name: short_name.to_owned(),
            flavors: FlavorSet::new(),
        })))
    }

    pub fn base_path(&self) -> &str {
        &self.0.base_path
    }

    pub fn short_name(&self) -> &str {
        &self.0.short_name
    }

    pub fn flavors(&self) -> &FlavorSet {
        &self.0.flavors
    }

    pub fn is_flavored(&self) -> bool {
        !self.0.flavors.is_empty()
    }

    fn with_flavor_set(&self, flavors: FlavorSet) -> BuildTarget {
        BuildTarget(Arc::new(BuildTargetData {
            base_path: self.0.base_path.clone(),
            short_name: self.0.short_name.clone(),
            flavors,
        }))
    }

    /// The same target with no flavors.
    pub fn unflavored(&self) -> BuildTarget {
        if !self.is_flavored() {
            return self.dupe();
        }
        self.with_flavor_set(FlavorSet::new())
    }

    pub fn with_appended_flavors(
        &self,
        flavors: impl IntoIterator<Item = Flavor>,
    ) -> BuildTarget {
        let mut set = self.0.flavors.clone();
        for flavor in flavors {
            set.insert(flavor);
        }
        self.with_flavor_set(set)
    }

    pub fn without_flavors<'a>(
        &self,
        flavors: impl IntoIterator<Item = &'a Flavor>,
    ) -> BuildTarget {
        let remove: HashSet<&Flavor> = flavors.into_iter().collect();
        self.with_flavor_set(
            self.0
                .flavors
                .iter()
                .filter(|f| !remove.contains(*f))
                .map(|f| f.dupe())
                .collect(),
        )
    }

    /// The same target with exactly the given flavors.
    pub fn with_flavors(&self, flavors: impl IntoIterator<Item = Flavor>) -> BuildTarget {
        self.with_flavor_set(flavors.into_iter().collect())
    }

    /// The short name plus a `#flavor,flavor` postfix, as embedded in output
    /// paths so that differently-flavored targets never collide.
    pub fn flavored_name(&self) -> String {
        if self.0.flavors.is_empty() {
            self.0.short_name.clone()
        } else {
            format!("{}#{}", self.0.short_name, self.0.flavors)
        }
    }

    /// Like [`flavored_name`](Self::flavored_name), with `,` replaced by `.`
    /// for tools that reject commas in paths handed to them.
    pub fn flavored_name_scratch_safe(&self) -> String {
        self.flavored_name().replace(',', ".")
    }

    /// Appends the domain's flavor from `from` when this target carries no
    /// flavor of that domain; used to push a wrapping rule's flavor choices
    /// down to its dependencies.
    pub fn propagate_flavor_domain<T: FlavorConvertible + Clone>(
        &self,
        domain: &FlavorDomain<T>,
        from: &BuildTarget,
    ) -> anyhow::Result<BuildTarget> {
        if domain.contains_any_of(self) {
            return Ok(self.dupe());
        }
        match domain.get_flavor_and_value(from)? {
            Some((flavor, _)) => Ok(self.with_appended_flavors([flavor])),
            None => Ok(self.dupe()),
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.0.base_path, self.0.short_name)?;
        if !self.0.flavors.is_empty() {
            write!(f, "#{}", self.0.flavors)?;
        }
        Ok(())
    }
}
