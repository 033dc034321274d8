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

//! Replays the chain's own selection of bakers: a weighted alias sampler, the hash chain
//! producing per-cycle seeds, and the generation of a cycle's baking and attestation rights.

pub mod rights;
pub use rights::{generate, Assigned, CycleRights, RightsError};

pub mod sampler;
pub use sampler::{Sampler, SamplerError, SeedStream};

pub mod seed;
pub use seed::{initial_seeds, level_seed, next_seed, Purpose};
