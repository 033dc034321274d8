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

use bakehouse_kernel::{Hasher, Nonce, Seed, VdfSolution, NULL_HASH32};

/// The kind of duty a per-level draw is made for. Each purpose has its own domain of seeds so
/// that slots and rounds never share a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Baking,
    Attestation,
}

impl Purpose {
    fn tag(self) -> &'static [u8] {
        match self {
            Purpose::Baking => b"baking",
            Purpose::Attestation => b"attestation",
        }
    }
}

fn hash_pair(left: &[u8], right: &[u8]) -> Seed {
    Hasher::<256>::hash(&[left, right].concat())
}

/// Derive the seed of the next cycle from the previous one and the randomness revealed during
/// the cycle: every nonce in block order, then the VDF solution when one was revealed.
pub fn next_seed<'a>(
    previous: &Seed,
    nonces: impl IntoIterator<Item = &'a Nonce>,
    vdf: Option<&VdfSolution>,
) -> Seed {
    let mut seed = hash_pair(&previous[..], &NULL_HASH32[..]);

    for nonce in nonces {
        seed = hash_pair(&seed[..], &nonce[..]);
    }

    if let Some(vdf) = vdf {
        seed = hash_pair(&seed[..], vdf.as_ref());
    }

    seed
}

/// Seeds of the first `count` cycles, before any randomness has been revealed.
pub fn initial_seeds(count: usize) -> Vec<Seed> {
    let mut seeds = Vec::with_capacity(count);
    let mut seed = Hasher::<256>::hash(&[]);
    for _ in 0..count {
        seeds.push(seed);
        seed = next_seed(&seed, [], None);
    }
    seeds
}

/// Bytes fed to the sampler for one draw: the `index`-th slot or round at position `position` of
/// the cycle.
pub fn level_seed(seed: &Seed, purpose: Purpose, position: u32, index: u32) -> Vec<u8> {
    let tag = purpose.tag();
    let mut bytes = Vec::with_capacity(seed.len() + tag.len() + 8);
    bytes.extend_from_slice(&seed[..]);
    bytes.extend_from_slice(tag);
    bytes.extend_from_slice(&position.to_be_bytes());
    bytes.extend_from_slice(&index.to_be_bytes());
    bytes
}
