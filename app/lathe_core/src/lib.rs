/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Core value types for the build tool: build targets, flavors, flavor
//! domains, and project-relative path handling.

pub mod flavor;
pub mod fs;
pub mod paths;
pub mod target;
