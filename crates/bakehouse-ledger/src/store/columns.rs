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

//! One module per store column, each defining the column's `Key` and `Row`. Meant to be used
//! through qualified imports, e.g. `bakers::Row`.

pub mod accounts;
pub mod baker_cycles;
pub mod bakers;
pub mod blocks;
pub mod cycles;
pub mod delegations;
pub mod rights;
pub mod seed_inputs;
pub mod staking_updates;
pub mod unstake_requests;
