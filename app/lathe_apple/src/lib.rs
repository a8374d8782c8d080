/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Apple binary and bundle rule derivation: platform/arch flavor domains,
//! debug-format handling, fat-binary composition, and the dispatch state
//! machines wiring link, strip, dsym and Swift rules together.

pub mod binary;
pub mod bundle;
pub mod debug_format;
pub mod debuggable;
pub mod descriptions;
pub mod dsym;
pub mod multiarch;
pub mod platform;
