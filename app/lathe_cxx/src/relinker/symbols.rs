/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context as _;
use lathe_build_api::process::gather_output;
use lathe_build_api::process::GatherOutputStatus;
use lathe_build_api::tool::Tool;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

/// The parsed dynamic symbol table of a binary: every symbol defined or
/// referenced, and the subset referenced but not defined here. Derived
/// transiently per relink; never persisted beyond the scratch directory
/// unless explicitly recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Symbols {
    pub all: BTreeSet<String>,
    pub undefined: BTreeSet<String>,
}

// One objdump -T table row, e.g.
// `0000000000001135 g    DF .text  0000000000000005  Base        foo`
// or for an undefined reference
// `0000000000000000      DF *UND*  0000000000000000              bar`.
static SYMBOL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<address>[0-9a-fA-F]{8,16}) (?P<flags>.{7})\s+(?P<section>\S+)\s+(?P<size>[0-9a-fA-F]+)(?:\s+(?P<version>\S+))?\s+(?P<name>\S+)\s*$",
    )
    .unwrap()
});

const UNDEFINED_SECTION: &str = "*UND*";

impl Symbols {
    pub fn parse_objdump_output(output: &str) -> Symbols {
        let mut symbols = Symbols::default();
        for line in output.lines() {
            let captures = match SYMBOL_LINE.captures(line) {
                Some(c) => c,
                None => continue,
            };
            let name = captures.name("name").unwrap().as_str();
            symbols.all.insert(name.to_owned());
            if captures.name("section").unwrap().as_str() == UNDEFINED_SECTION {
                symbols.undefined.insert(name.to_owned());
            }
        }
        symbols
    }

    pub fn defined(&self) -> BTreeSet<String> {
        self.all.difference(&self.undefined).cloned().collect()
    }

    /// Extracts the dynamic symbol table of `binary` with the given objdump
    /// tool.
    pub async fn extract(objdump: &Tool, binary: &Path) -> anyhow::Result<Symbols> {
        let prefix = objdump.command_prefix();
        let mut cmd = Command::new(&prefix[0]);
        cmd.args(&prefix[1..]);
        cmd.arg("-T");
        cmd.arg(binary);
        cmd.envs(objdump.environment());

        let (status, stdout, stderr) = gather_output(cmd, None)
            .await
            .with_context(|| format!("Failed to run {} on {}", objdump.executable(), binary.display()))?;
        match status {
            GatherOutputStatus::Finished(status) if status.success() => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "{} failed for {}: {}",
                    objdump.executable(),
                    binary.display(),
                    String::from_utf8_lossy(&stderr)
                ));
            }
        }
        Ok(Symbols::parse_objdump_output(&String::from_utf8_lossy(
            &stdout,
        )))
    }
}
