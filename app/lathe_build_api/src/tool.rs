/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use indexmap::IndexMap;

/// An external executable plus its argument prefix and environment. Pure
/// data; producing a command line is the only behavior. Every toolchain
/// binary this crate family invokes (compiler, linker, strip, objdump,
/// dsymutil, lipo) is described by one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tool {
    command_prefix: Vec<String>,
    environment: IndexMap<String, String>,
}

impl Tool {
    pub fn new(executable: impl Into<String>) -> Tool {
        Tool {
            command_prefix: vec![executable.into()],
            environment: IndexMap::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Tool {
        self.command_prefix.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Tool {
        self.environment
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn executable(&self) -> &str {
        &self.command_prefix[0]
    }

    /// The executable followed by its fixed arguments.
    pub fn command_prefix(&self) -> &[String] {
        &self.command_prefix
    }

    pub fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_prefix() {
        let tool = Tool::new("clang").with_args(["-fuse-ld=lld"]);
        assert_eq!(tool.executable(), "clang");
        assert_eq!(tool.command_prefix(), &["clang", "-fuse-ld=lld"]);
    }
}
