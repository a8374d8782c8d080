/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

/// The one source file allowed to carry top-level statements; its presence
/// disables `-parse-as-library`.
pub(crate) const SWIFT_MAIN_FILENAME: &str = "main.swift";

/// Swift module names must be valid identifiers; target short names are
/// not.
pub(crate) fn normalize_swift_module_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Name of the generated Objective-C interop header.
pub(crate) fn to_swift_header_name(module_name: &str) -> String {
    format!("{}-Swift", module_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_swift_module_name() {
        assert_eq!(normalize_swift_module_name("Demo"), "Demo");
        assert_eq!(normalize_swift_module_name("my-module.v2"), "my_module_v2");
        assert_eq!(normalize_swift_module_name("weird name!"), "weird_name_");
    }

    #[test]
    fn test_header_name() {
        assert_eq!(to_swift_header_name("Demo"), "Demo-Swift");
    }
}
