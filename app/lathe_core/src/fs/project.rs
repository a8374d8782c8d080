/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::borrow::Borrow;
use std::ops::Deref;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Display;
use ref_cast::RefCast;
use thiserror::Error;

#[derive(Debug, Error)]
enum ProjectPathError {
    #[error("Expected a forward-slash relative path, got `{0}`")]
    NotRelative(String),
    #[error("Path `{0}` must not traverse outside the project (`..`)")]
    Traversal(String),
    #[error("Expected an absolute project root, got `{0}`")]
    RootNotAbsolute(String),
}

/// A forward-slash path relative to the project root. The only path type
/// rules may use for their inputs and outputs; resolution to an absolute
/// path happens once, against a [`ProjectRoot`].
#[derive(Display, Debug, Hash, PartialEq, Eq, Ord, PartialOrd, RefCast)]
#[repr(transparent)]
pub struct ProjectRelativePath(str);

/// The owned version of [`ProjectRelativePath`], like how `PathBuf` relates
/// to `Path`.
#[derive(Clone, Display, Debug, Hash, PartialEq, Eq, Ord, PartialOrd, Default)]
pub struct ProjectRelativePathBuf(String);

impl ProjectRelativePath {
    pub fn unchecked_new<S: ?Sized + AsRef<str>>(s: &S) -> &ProjectRelativePath {
        ProjectRelativePath::ref_cast(s.as_ref())
    }

    pub fn new<S: ?Sized + AsRef<str>>(s: &S) -> anyhow::Result<&ProjectRelativePath> {
        let s = s.as_ref();
        if s.starts_with('/') || s.contains('\\') {
            return Err(ProjectPathError::NotRelative(s.to_owned()).into());
        }
        if s.split('/').any(|c| c == "..") {
            return Err(ProjectPathError::Traversal(s.to_owned()).into());
        }
        Ok(ProjectRelativePath::ref_cast(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn join(&self, path: impl AsRef<str>) -> ProjectRelativePathBuf {
        let path = path.as_ref();
        if path.is_empty() {
            self.to_buf()
        } else if self.0.is_empty() {
            ProjectRelativePathBuf(path.to_owned())
        } else {
            ProjectRelativePathBuf(format!("{}/{}", &self.0, path))
        }
    }

    pub fn parent(&self) -> Option<&ProjectRelativePath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| ProjectRelativePath::ref_cast(parent))
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map_or(&self.0, |(_, name)| name)
    }

    /// The file name with its last extension removed.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map_or(name, |(stem, _)| stem)
    }

    pub fn to_buf(&self) -> ProjectRelativePathBuf {
        ProjectRelativePathBuf(self.0.to_owned())
    }
}

impl ProjectRelativePathBuf {
    pub fn unchecked_new(s: String) -> ProjectRelativePathBuf {
        ProjectRelativePathBuf(s)
    }

    pub fn new(s: String) -> anyhow::Result<ProjectRelativePathBuf> {
        ProjectRelativePath::new(&s)?;
        Ok(ProjectRelativePathBuf(s))
    }
}

impl Deref for ProjectRelativePathBuf {
    type Target = ProjectRelativePath;

    fn deref(&self) -> &ProjectRelativePath {
        ProjectRelativePath::ref_cast(&self.0)
    }
}

impl Borrow<ProjectRelativePath> for ProjectRelativePathBuf {
    fn borrow(&self) -> &ProjectRelativePath {
        self
    }
}

impl AsRef<ProjectRelativePath> for ProjectRelativePathBuf {
    fn as_ref(&self) -> &ProjectRelativePath {
        self
    }
}

impl AsRef<ProjectRelativePath> for ProjectRelativePath {
    fn as_ref(&self) -> &ProjectRelativePath {
        self
    }
}

impl ToOwned for ProjectRelativePath {
    type Owned = ProjectRelativePathBuf;

    fn to_owned(&self) -> ProjectRelativePathBuf {
        self.to_buf()
    }
}

/// The absolute root all project-relative paths resolve against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    pub fn new(root: PathBuf) -> anyhow::Result<ProjectRoot> {
        if !root.is_absolute() {
            return Err(ProjectPathError::RootNotAbsolute(root.display().to_string()).into());
        }
        Ok(ProjectRoot { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: impl AsRef<ProjectRelativePath>) -> PathBuf {
        self.root.join(path.as_ref().as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(ProjectRelativePath::new("foo/bar").is_ok());
        assert!(ProjectRelativePath::new("").is_ok());
        assert!(ProjectRelativePath::new("/abs").is_err());
        assert!(ProjectRelativePath::new("up/../and/over").is_err());
        assert!(ProjectRelativePath::new("back\\slash").is_err());
    }

    #[test]
    fn test_join_and_parent() {
        let p = ProjectRelativePath::unchecked_new("foo/bar");
        assert_eq!(p.join("baz.txt").as_str(), "foo/bar/baz.txt");
        assert_eq!(p.parent().unwrap().as_str(), "foo");
        assert_eq!(p.parent().unwrap().parent(), None);
        assert_eq!(p.file_name(), "bar");
        let empty = ProjectRelativePath::unchecked_new("");
        assert_eq!(empty.join("x").as_str(), "x");
    }

    #[test]
    fn test_file_stem() {
        let p = ProjectRelativePath::unchecked_new("a/libfoo.so");
        assert_eq!(p.file_stem(), "libfoo");
        assert_eq!(ProjectRelativePath::unchecked_new("a/noext").file_stem(), "noext");
    }

    #[test]
    fn test_resolve() -> anyhow::Result<()> {
        assert!(ProjectRoot::new(PathBuf::from("relative")).is_err());
        let root = if cfg!(windows) { "C:\\project" } else { "/project" };
        let root = ProjectRoot::new(PathBuf::from(root))?;
        let resolved = root.resolve(ProjectRelativePath::unchecked_new("foo/bar"));
        assert!(resolved.ends_with(Path::new("foo/bar")));
        Ok(())
    }
}
