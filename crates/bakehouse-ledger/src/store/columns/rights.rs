// Copyright 2024 PRAGMA
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Baking and attestation rights, one row per (level, kind, baker). Rows arrive in bulk, as whole
//! cycles, and are then only ever updated in status.

use bakehouse_kernel::{AccountId, Level, Right, RightKind};

pub type Key = (Level, RightKind, AccountId);

pub type Row = Right;

/// Smallest and largest keys at a level, for range scans.
pub fn level_range(level: Level) -> std::ops::RangeInclusive<Key> {
    (level, RightKind::Baking, AccountId::new(0))
        ..=(level, RightKind::Attestation, AccountId::new(u32::MAX))
}
