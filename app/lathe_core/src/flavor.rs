/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use derive_more::Display;
use dupe::Dupe;
use indexmap::IndexMap;
use thiserror::Error;

use crate::target::BuildTarget;

#[derive(Debug, Error)]
pub enum FlavorError {
    #[error("Invalid flavor name `{0}`")]
    InvalidFlavor(String),
    #[error(
        "In {target}, found multiple flavors from the `{domain}` domain: {}",
        itertools::join(.flavors, ", ")
    )]
    MultipleFlavors {
        domain: String,
        target: BuildTarget,
        flavors: Vec<Flavor>,
    },
    #[error("Target {target} must contain exactly one flavor from the `{domain}` domain")]
    MissingFlavor { domain: String, target: BuildTarget },
}

/// An interned tag attached to a build target, selecting a build variant
/// (platform, debug format, link style, ...). Flavors are plain tokens; the
/// meaning comes from the domain they belong to.
#[derive(Clone, Dupe, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Flavor(Arc<str>);

impl Flavor {
    pub fn new(name: &str) -> anyhow::Result<Flavor> {
        if name.is_empty()
            || name
                .chars()
                .any(|c| c == '#' || c == ',' || c.is_whitespace())
        {
            return Err(FlavorError::InvalidFlavor(name.to_owned()).into());
        }
        Ok(Flavor(Arc::from(name)))
    }

    /// For flavor constants whose validity is clear at the call site.
    pub fn unchecked_new(name: &str) -> Flavor {
        Flavor::new(name).unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An immutable set of flavors. Iteration is in sorted order, so any
/// rendering derived from a flavor set is deterministic regardless of the
/// order flavors were attached in.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FlavorSet(BTreeSet<Flavor>);

impl FlavorSet {
    pub fn new() -> FlavorSet {
        FlavorSet(BTreeSet::new())
    }

    pub fn contains(&self, flavor: &Flavor) -> bool {
        self.0.contains(flavor)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Flavor> {
        self.0.iter()
    }

    pub fn insert(&mut self, flavor: Flavor) {
        self.0.insert(flavor);
    }

    pub fn remove(&mut self, flavor: &Flavor) {
        self.0.remove(flavor);
    }
}

impl FromIterator<Flavor> for FlavorSet {
    fn from_iter<I: IntoIterator<Item = Flavor>>(iter: I) -> FlavorSet {
        FlavorSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FlavorSet {
    type Item = &'a Flavor;
    type IntoIter = btree_set::Iter<'a, Flavor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FlavorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", itertools::join(self.iter(), ","))
    }
}

/// A value convertible to the flavor naming it within its domain.
pub trait FlavorConvertible {
    fn flavor(&self) -> Flavor;
}

/// A named, closed enumeration of mutually exclusive flavors, with a lookup
/// from flavor back to the domain value. A target may carry at most one
/// flavor from any given domain.
#[derive(Clone, Debug)]
pub struct FlavorDomain<T> {
    name: String,
    translation: IndexMap<Flavor, T>,
}

impl<T: FlavorConvertible + Clone> FlavorDomain<T> {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = T>) -> FlavorDomain<T> {
        FlavorDomain {
            name: name.into(),
            translation: values.into_iter().map(|v| (v.flavor(), v)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flavors(&self) -> impl Iterator<Item = &Flavor> {
        self.translation.keys()
    }

    pub fn contains(&self, flavor: &Flavor) -> bool {
        self.translation.contains_key(flavor)
    }

    pub fn contains_any_of(&self, target: &BuildTarget) -> bool {
        target.flavors().iter().any(|f| self.contains(f))
    }

    /// The domain value a single flavor names, if the flavor belongs to
    /// this domain.
    pub fn value(&self, flavor: &Flavor) -> Option<T> {
        self.translation.get(flavor).cloned()
    }

    /// The domain flavor attached to the target, if any. Two flavors from
    /// the same domain on one target is a dispatch-layer bug.
    pub fn get_flavor_and_value(&self, target: &BuildTarget) -> anyhow::Result<Option<(Flavor, T)>> {
        let mut matches = target
            .flavors()
            .iter()
            .filter(|f| self.contains(f))
            .collect::<Vec<_>>();
        match matches.len() {
            0 => Ok(None),
            1 => {
                let flavor = matches.pop().unwrap();
                let value = self.translation.get(flavor).unwrap().clone();
                Ok(Some((flavor.dupe(), value)))
            }
            _ => Err(FlavorError::MultipleFlavors {
                domain: self.name.clone(),
                target: target.dupe(),
                flavors: matches.into_iter().map(|f| f.dupe()).collect(),
            }
            .into()),
        }
    }

    pub fn get_value(&self, target: &BuildTarget) -> anyhow::Result<Option<T>> {
        Ok(self.get_flavor_and_value(target)?.map(|(_, v)| v))
    }

    pub fn get_required_value(&self, target: &BuildTarget) -> anyhow::Result<T> {
        self.get_value(target)?.ok_or_else(|| {
            FlavorError::MissingFlavor {
                domain: self.name.clone(),
                target: target.dupe(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum TestMode {
        On,
        Off,
    }

    impl FlavorConvertible for TestMode {
        fn flavor(&self) -> Flavor {
            match self {
                TestMode::On => Flavor::unchecked_new("mode-on"),
                TestMode::Off => Flavor::unchecked_new("mode-off"),
            }
        }
    }

    fn domain() -> FlavorDomain<TestMode> {
        FlavorDomain::new("Test Mode", [TestMode::On, TestMode::Off])
    }

    fn target(flavors: &[&str]) -> BuildTarget {
        BuildTarget::new("foo/bar", "baz")
            .unwrap()
            .with_appended_flavors(flavors.iter().map(|f| Flavor::unchecked_new(f)))
    }

    #[test]
    fn test_flavor_validation() {
        assert!(Flavor::new("linkermap").is_ok());
        assert!(Flavor::new("iphoneos-arm64").is_ok());
        assert!(Flavor::new("").is_err());
        assert!(Flavor::new("a b").is_err());
        assert!(Flavor::new("a#b").is_err());
        assert!(Flavor::new("a,b").is_err());
    }

    #[test]
    fn test_get_value() -> anyhow::Result<()> {
        let d = domain();
        assert_eq!(d.get_value(&target(&[]))?, None);
        assert_eq!(d.get_value(&target(&["mode-on"]))?, Some(TestMode::On));
        assert_eq!(
            d.get_value(&target(&["mode-off", "other"]))?,
            Some(TestMode::Off)
        );
        assert!(d.get_value(&target(&["mode-on", "mode-off"])).is_err());
        Ok(())
    }

    #[test]
    fn test_required_value() {
        let d = domain();
        assert!(d.get_required_value(&target(&[])).is_err());
        assert_eq!(
            d.get_required_value(&target(&["mode-on"])).unwrap(),
            TestMode::On
        );
    }

    #[test]
    fn test_flavor_set_display_is_sorted() {
        let t = target(&["zzz", "aaa", "mmm"]);
        assert_eq!(t.flavors().to_string(), "aaa,mmm,zzz");
    }
}
