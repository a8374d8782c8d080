/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

use lathe_build_api::rule::RuleScheduleInfo;

/// Already-resolved native-toolchain configuration. An external config
/// loader produces these values; nothing here parses configuration text.
#[derive(Clone, Debug)]
pub struct CxxConfig {
    /// Scheduling weight for link and relink rules. Links are memory and IO
    /// heavy, so they typically consume more than one scheduler slot.
    pub link_schedule_info: Option<RuleScheduleInfo>,
    /// Whether link outputs are eligible for the artifact cache.
    pub cache_links: bool,
}

impl Default for CxxConfig {
    fn default() -> CxxConfig {
        CxxConfig {
            link_schedule_info: None,
            cache_links: true,
        }
    }
}

impl CxxConfig {
    pub fn link_schedule_info_or_default(&self) -> RuleScheduleInfo {
        self.link_schedule_info.unwrap_or(RuleScheduleInfo::DEFAULT)
    }
}
