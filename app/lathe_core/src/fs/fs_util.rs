/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

// We'd love to use fs-err instead, but that code gives bad error messages and
// doesn't wrap all functions. Various bugs have been raised - if they all get
// fixed we can migrate.
use std::fs;
use std::path::Path;

use anyhow::Context;

pub fn create_dir_all<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    fs::create_dir_all(&path)
        .with_context(|| format!("create_dir_all({})", P::as_ref(&path).display()))?;
    Ok(())
}

pub fn remove_file<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    fs::remove_file(&path)
        .with_context(|| format!("remove_file({})", P::as_ref(&path).display()))?;
    Ok(())
}

/// Removes a file or directory tree if present; missing paths are not an
/// error.
pub fn remove_all<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("symlink_metadata({})", path.display()));
        }
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("remove_dir_all({})", path.display()))?;
    } else {
        fs::remove_file(path).with_context(|| format!("remove_file({})", path.display()))?;
    }
    Ok(())
}

pub fn copy_file<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> anyhow::Result<()> {
    fs::copy(&src, &dst).with_context(|| {
        format!(
            "copy(src={}, dst={})",
            P::as_ref(&src).display(),
            Q::as_ref(&dst).display()
        )
    })?;
    Ok(())
}

pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> anyhow::Result<()> {
    fs::write(&path, &contents)
        .with_context(|| format!("write({})", P::as_ref(&path).display()))?;
    Ok(())
}

pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<u8>> {
    fs::read(&path).with_context(|| format!("read({})", P::as_ref(&path).display()))
}

pub fn read_to_string<P: AsRef<Path>>(path: P) -> anyhow::Result<String> {
    fs::read_to_string(&path)
        .with_context(|| format!("read_to_string({})", P::as_ref(&path).display()))
}

pub fn try_exists<P: AsRef<Path>>(path: P) -> anyhow::Result<bool> {
    match fs::symlink_metadata(&path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("try_exists({})", P::as_ref(&path).display())),
    }
}

pub fn metadata<P: AsRef<Path>>(path: P) -> anyhow::Result<fs::Metadata> {
    fs::metadata(&path).with_context(|| format!("metadata({})", P::as_ref(&path).display()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_remove_all() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("a/b");
        create_dir_all(&nested)?;
        write(nested.join("f.txt"), b"x")?;
        remove_all(dir.path().join("a"))?;
        assert!(!try_exists(dir.path().join("a"))?);
        // Missing path is fine.
        remove_all(dir.path().join("a"))?;
        Ok(())
    }

    #[test]
    fn test_copy_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write(dir.path().join("src"), b"contents")?;
        copy_file(dir.path().join("src"), dir.path().join("dst"))?;
        assert_eq!(read(dir.path().join("dst"))?, b"contents");
        Ok(())
    }
}
