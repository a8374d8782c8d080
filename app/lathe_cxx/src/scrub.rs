/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Scrubbers applied to link outputs so that bytes depend only on declared
//! inputs, not on where the build machine keeps its checkout or when the
//! build ran.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context as _;
use lathe_build_api::steps::scrub::FileScrubber;
use thiserror::Error;

#[derive(Debug, Error)]
enum ScrubError {
    #[error("Malformed archive member header at offset {0}")]
    MalformedArchive(usize),
}

/// Rewrites occurrences of absolute build-root paths embedded in the output
/// (debug info, expanded `__FILE__`, linker-recorded object paths) with a
/// same-length stand-in, keeping every offset in the file valid. Only the
/// dependency roots are rewritten: those are the only roots rule inputs can
/// come from.
pub struct PathScrubber {
    extra_roots: Vec<PathBuf>,
}

impl PathScrubber {
    pub fn new(extra_roots: Vec<PathBuf>) -> PathScrubber {
        PathScrubber { extra_roots }
    }

    fn scrub_root(contents: &mut [u8], root: &Path) {
        let needle = root.to_string_lossy();
        let needle = needle.as_bytes();
        if needle.is_empty() {
            return;
        }
        let mut replacement = vec![b'/'; needle.len()];
        replacement[0] = b'.';
        let mut i = 0;
        while i + needle.len() <= contents.len() {
            if &contents[i..i + needle.len()] == needle {
                contents[i..i + needle.len()].copy_from_slice(&replacement);
                i += needle.len();
            } else {
                i += 1;
            }
        }
    }
}

impl FileScrubber for PathScrubber {
    fn scrub(&self, project_root: &Path, contents: &mut Vec<u8>) -> anyhow::Result<()> {
        Self::scrub_root(contents, project_root);
        for root in &self.extra_roots {
            Self::scrub_root(contents, root);
        }
        Ok(())
    }
}

/// Zeroes the modification time, uid and gid fields of every member header
/// in a `!<arch>` static archive. Non-archive files pass through untouched.
pub struct ArchiveTimestampScrubber;

const ARCHIVE_MAGIC: &[u8] = b"!<arch>\n";
const MEMBER_HEADER_LEN: usize = 60;

impl ArchiveTimestampScrubber {
    fn write_field(header: &mut [u8], range: std::ops::Range<usize>, value: &str) {
        let field = &mut header[range];
        field.fill(b' ');
        field[..value.len()].copy_from_slice(value.as_bytes());
    }
}

impl FileScrubber for ArchiveTimestampScrubber {
    fn scrub(&self, _project_root: &Path, contents: &mut Vec<u8>) -> anyhow::Result<()> {
        if !contents.starts_with(ARCHIVE_MAGIC) {
            return Ok(());
        }
        let mut offset = ARCHIVE_MAGIC.len();
        while offset < contents.len() {
            if offset + MEMBER_HEADER_LEN > contents.len() {
                return Err(ScrubError::MalformedArchive(offset).into());
            }
            let header = &mut contents[offset..offset + MEMBER_HEADER_LEN];
            // Member header layout: name[16] mtime[12] uid[6] gid[6]
            // mode[8] size[10] magic[2].
            Self::write_field(header, 16..28, "0");
            Self::write_field(header, 28..34, "0");
            Self::write_field(header, 34..40, "0");

            let size = std::str::from_utf8(&header[48..58])
                .ok()
                .map(|s| s.trim_end())
                .and_then(|s| s.parse::<usize>().ok())
                .with_context(|| ScrubError::MalformedArchive(offset))?;
            // Member data is padded to an even boundary.
            offset += MEMBER_HEADER_LEN + size + size % 2;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_scrubbing_preserves_length() -> anyhow::Result<()> {
        let root = Path::new("/home/builder/checkout");
        let mut contents =
            b"prefix /home/builder/checkout/lib/foo.o suffix".to_vec();
        let before_len = contents.len();
        PathScrubber::new(vec![]).scrub(root, &mut contents)?;
        assert_eq!(contents.len(), before_len);
        let text = String::from_utf8(contents)?;
        assert!(!text.contains("/home/builder/checkout"));
        let expected = format!("prefix .{}/lib/foo.o suffix", "/".repeat(21));
        assert_eq!(text, expected);
        Ok(())
    }

    #[test]
    fn test_path_scrubbing_is_idempotent() -> anyhow::Result<()> {
        let root = Path::new("/root/a");
        let mut contents = b"x /root/a/y".to_vec();
        PathScrubber::new(vec![]).scrub(root, &mut contents)?;
        let once = contents.clone();
        PathScrubber::new(vec![]).scrub(root, &mut contents)?;
        assert_eq!(contents, once);
        Ok(())
    }

    fn archive_with_member(name: &str, mtime: &str, data: &[u8]) -> Vec<u8> {
        let mut archive = ARCHIVE_MAGIC.to_vec();
        let mut header = vec![b' '; MEMBER_HEADER_LEN];
        header[..name.len()].copy_from_slice(name.as_bytes());
        header[16..16 + mtime.len()].copy_from_slice(mtime.as_bytes());
        let size = data.len().to_string();
        header[48..48 + size.len()].copy_from_slice(size.as_bytes());
        header[58] = b'`';
        header[59] = b'\n';
        archive.extend_from_slice(&header);
        archive.extend_from_slice(data);
        if data.len() % 2 == 1 {
            archive.push(b'\n');
        }
        archive
    }

    #[test]
    fn test_archive_timestamps_zeroed() -> anyhow::Result<()> {
        let mut archive = archive_with_member("foo.o/", "1667349246", b"hello");
        let scrubbed_twin = archive_with_member("foo.o/", "0", b"hello");
        ArchiveTimestampScrubber.scrub(Path::new("/x"), &mut archive)?;
        assert_eq!(archive, scrubbed_twin);
        Ok(())
    }

    #[test]
    fn test_non_archive_untouched() -> anyhow::Result<()> {
        let mut elf = b"\x7fELF rest of binary".to_vec();
        let before = elf.clone();
        ArchiveTimestampScrubber.scrub(Path::new("/x"), &mut elf)?;
        assert_eq!(elf, before);
        Ok(())
    }
}
