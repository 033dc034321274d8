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

use crate::{
    sampler::{Sampler, SamplerError},
    seed::{level_seed, Purpose},
};
use bakehouse_kernel::{
    AccountId, Cycle, CycleBounds, Level, Right, RightKind, RightsParameters, RightsTable,
    RoundSelection, Seed,
};
use rayon::prelude::*;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};
use tracing::{debug, instrument};

const EVENT_TARGET: &str = "bakehouse::rights";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RightsError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error("sampled baker {baker} is not part of the snapshot of cycle {cycle}")]
    UnknownBaker { cycle: Cycle, baker: AccountId },
    #[error("rounds are drawn from attestation slots but the committee is empty")]
    EmptyCommittee,
}

/// The rights drawn for one cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleRights {
    pub cycle: Cycle,

    /// One row per (level, baker) with the earliest round of that baker, by (level, round).
    pub baking: Vec<Right>,

    /// Attestation rights of every level but the last, stored at the level including them; by
    /// (level, slots desc, baker).
    pub attestations: Vec<Right>,

    /// Attestation rights of the last level. They are included in the first block of the next
    /// cycle, and belong to it.
    pub shifted: Vec<Right>,
}

impl CycleRights {
    pub fn table(&self) -> RightsTable {
        self.baking
            .iter()
            .chain(self.attestations.iter())
            .chain(self.shifted.iter())
            .collect()
    }

    /// Duties owed within the cycle itself, shifted rows excluded.
    pub fn assigned(&self) -> BTreeMap<AccountId, Assigned> {
        Assigned::tally(self.baking.iter().chain(self.attestations.iter()))
    }
}

/// Number of blocks and attestation slots assigned to a baker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Assigned {
    pub blocks: u32,
    pub attestations: u32,
}

impl Assigned {
    pub fn tally<'a>(rights: impl IntoIterator<Item = &'a Right>) -> BTreeMap<AccountId, Assigned> {
        let mut tally: BTreeMap<AccountId, Assigned> = BTreeMap::new();
        for right in rights {
            let assigned = tally.entry(right.baker).or_default();
            match right.kind {
                RightKind::Baking => assigned.blocks += 1,
                RightKind::Attestation => assigned.attestations += right.slots.unwrap_or_default(),
            }
        }
        tally
    }
}

/// Draw the baking and attestation rights of every level of `cycle`.
///
/// `stakes` is the baking power snapshot, in the order the sampler must see it. Levels are
/// drawn independently of one another and may run on any number of threads; the result only
/// depends on the inputs.
#[instrument(
    level = "debug",
    skip_all,
    name = "rights.generate",
    fields(cycle = %cycle, bakers = stakes.len()),
)]
pub fn generate(
    cycle: Cycle,
    bounds: CycleBounds,
    seed: &Seed,
    stakes: &[(AccountId, u64)],
    params: &RightsParameters,
) -> Result<CycleRights, RightsError> {
    if params.attestation_slots == 0 && params.round_selection == RoundSelection::SlotOwner {
        return Err(RightsError::EmptyCommittee);
    }

    let sampler = Sampler::new(stakes)?;
    let known: BTreeSet<AccountId> = stakes.iter().map(|(baker, _)| *baker).collect();

    let levels = bounds
        .levels()
        .into_par_iter()
        .map(|level| {
            let level = Level::new(level);
            let position = level.elapsed_since(bounds.first).unwrap_or_else(|| {
                unreachable!("level {level} drawn from the bounds of its own cycle")
            });
            draw_level(cycle, level, position, seed, &sampler, &known, params)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rights = CycleRights {
        cycle,
        baking: Vec::new(),
        attestations: Vec::new(),
        shifted: Vec::new(),
    };

    for (level, (baking, attestations)) in bounds.levels().zip(levels) {
        rights.baking.extend(baking);
        if level == bounds.last.as_u32() {
            rights
                .shifted
                .extend(attestations.into_iter().map(|right| Right {
                    cycle: cycle.next(),
                    ..right
                }));
        } else {
            rights.attestations.extend(attestations);
        }
    }

    rights.baking.sort_by_key(|right| (right.level, right.round));
    let attestation_order = |right: &Right| (right.level, Reverse(right.slots), right.baker);
    rights.attestations.sort_by_key(attestation_order);
    rights.shifted.sort_by_key(attestation_order);

    debug!(
        target: EVENT_TARGET,
        cycle = %cycle,
        baking = rights.baking.len(),
        attestations = rights.attestations.len(),
        shifted = rights.shifted.len(),
        "rights.generated"
    );

    Ok(rights)
}

fn draw_level(
    cycle: Cycle,
    level: Level,
    position: u32,
    seed: &Seed,
    sampler: &Sampler,
    known: &BTreeSet<AccountId>,
    params: &RightsParameters,
) -> Result<(Vec<Right>, Vec<Right>), RightsError> {
    let check = |baker: AccountId| {
        if known.contains(&baker) {
            Ok(baker)
        } else {
            Err(RightsError::UnknownBaker { cycle, baker })
        }
    };

    let slot_owners = (0..params.attestation_slots)
        .map(|slot| check(sampler.sample(&level_seed(seed, Purpose::Attestation, position, slot))))
        .collect::<Result<Vec<_>, _>>()?;

    let mut earliest_rounds: BTreeMap<AccountId, u32> = BTreeMap::new();
    for round in 0..=params.max_round {
        let owner = match params.round_selection {
            RoundSelection::Independent => {
                check(sampler.sample(&level_seed(seed, Purpose::Baking, position, round)))?
            }
            RoundSelection::SlotOwner => {
                slot_owners[(round % params.attestation_slots) as usize]
            }
        };
        earliest_rounds.entry(owner).or_insert(round);
    }

    let mut slots: BTreeMap<AccountId, u32> = BTreeMap::new();
    for owner in slot_owners {
        *slots.entry(owner).or_default() += 1;
    }

    let baking = earliest_rounds
        .into_iter()
        .map(|(baker, round)| Right::baking(cycle, level, baker, round))
        .collect();

    let attestations = slots
        .into_iter()
        .map(|(baker, slots)| Right::attestation(cycle, level.next(), baker, slots))
        .collect();

    Ok((baking, attestations))
}
