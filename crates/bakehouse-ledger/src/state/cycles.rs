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

//! Cycle transitions. A cycle is created `consensus_rights_delay` cycles ahead of time, when the
//! first block of the current one arrives; and settled by the last block of its own.

use crate::{
    context::BlockContext,
    evidence::{Movement, RewardKind},
    state::{InvariantError, LedgerError, Step, ValidationError},
    store::{
        columns::{baker_cycles, bakers, cycles, seed_inputs},
        ReadStore,
    },
};
use bakehouse_kernel::{
    AccountId, Block, Cycle, Mutez, RewardConstants, RightKind, Seed,
};
use bakehouse_rights::{generate, next_seed, Assigned};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

const EVENT_TARGET: &str = "bakehouse::ledger::cycles";

// Begin
// ----------------------------------------------------------------------------

/// Create every cycle up to `consensus_rights_delay` cycles after the current one.
#[instrument(level = "trace", skip_all, name = "cycle.begin", fields(cycle = %step.cycle))]
pub fn begin<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    block: &Block,
) -> Result<(), LedgerError> {
    let horizon = step.cycle + step.rules.constants.consensus_rights_delay;

    let mut next = match context.last_cycle()? {
        Some(last) => last.cycle.next(),
        None => Cycle::new(0),
    };

    while next <= horizon {
        let previous = next
            .previous()
            .ok_or(ValidationError::MissingCycle(next))?;
        let seed = derive_seed(context, step, previous)?;
        let rewards = step.rewards_for(next, &block.issuance)?;
        create(context, step, next, seed, rewards)?;
        next = next.next();
    }

    Ok(())
}

/// Seed of the cycle following `previous`, out of the randomness revealed during the cycle
/// preceding the current one.
fn derive_seed<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    previous: Cycle,
) -> Result<Seed, LedgerError> {
    let previous_seed = context
        .cycle(previous)?
        .ok_or(ValidationError::MissingCycle(previous))?
        .seed;

    let inputs = match step.cycle.previous() {
        Some(revealed) => {
            let bounds = step.eras.cycle_bounds(revealed)?;
            context.seed_inputs(bounds.first, bounds.last)?
        }
        None => Vec::new(),
    };

    let nonces = inputs.iter().filter_map(|input| match input {
        seed_inputs::Row::Nonce(nonce) => Some(nonce),
        seed_inputs::Row::Vdf(..) => None,
    });

    let vdf = inputs.iter().find_map(|input| match input {
        seed_inputs::Row::Vdf(solution) => Some(solution),
        seed_inputs::Row::Nonce(..) => None,
    });

    Ok(next_seed(&previous_seed, nonces, vdf))
}

/// Draw the rights of `cycle` out of the current baking powers, and open its settlement rows.
pub fn create<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    cycle: Cycle,
    seed: Seed,
    rewards: RewardConstants,
) -> Result<(), LedgerError> {
    let rules = step.rules;
    let bounds = step.eras.cycle_bounds(cycle)?;
    let blocks_per_cycle = step.eras.blocks_per_cycle(cycle)?;

    let mut snapshot: Vec<(bakers::Row, u64)> = context
        .bakers()?
        .into_iter()
        .filter(|baker| baker.active)
        .filter_map(|baker| rules.baking_power(&baker).map(|power| (baker, power)))
        .collect();
    snapshot.sort_by(|(a, a_power), (b, b_power)| b_power.cmp(a_power).then(a.id.cmp(&b.id)));

    let stakes: Vec<(AccountId, u64)> = snapshot
        .iter()
        .map(|(baker, power)| (baker.id, *power))
        .collect();
    let total_power: u64 = stakes.iter().map(|(_, power)| power).sum();

    let rights = generate(cycle, bounds, &seed, &stakes, &rules.rights_parameters())?;

    // Attestations of the last level of the previous cycle count towards this one.
    let carried: Vec<_> = context
        .rights_at(bounds.first)?
        .into_iter()
        .filter(|right| right.kind == RightKind::Attestation && right.cycle == cycle)
        .collect();

    let mut assigned = rights.assigned();
    for (baker, extra) in Assigned::tally(carried.iter()) {
        assigned.entry(baker).or_default().attestations += extra.attestations;
    }

    let max_bonus = rules.constants.max_block_bonus(&rewards);
    let powers: BTreeMap<AccountId, (&bakers::Row, u64)> = snapshot
        .iter()
        .map(|(baker, power)| (baker.id, (baker, *power)))
        .collect();

    let bakers_with_rows: Vec<AccountId> = powers
        .keys()
        .chain(assigned.keys())
        .copied()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    for baker in bakers_with_rows {
        let mut row = baker_cycles::Row::new(cycle, baker, step.level);

        let power = match powers.get(&baker) {
            Some((snapshot, power)) => {
                row.baking_power = *power;
                row.own_staked = snapshot.own_staked;
                row.external_staked = snapshot.external_staked;
                row.own_delegated = snapshot.balance + snapshot.own_unstaked;
                row.external_delegated = snapshot.delegated_balance + snapshot.external_unstaked;
                row.stakers_count = snapshot.stakers_count;
                row.delegators_count = snapshot.delegators_count;
                *power
            }
            None => 0,
        };

        let duties = assigned.get(&baker).copied().unwrap_or_default();
        row.future_blocks = duties.blocks;
        row.future_block_rewards = Mutez::from(duties.blocks) * (rewards.block_reward + max_bonus);
        row.future_attestations = duties.attestations;
        row.future_attestation_rewards = rules.expected_attestation_rewards(
            &rewards,
            duties.attestations,
            power,
            total_power,
            blocks_per_cycle,
        );

        context.put_baker_cycle(row)?;
    }

    context.add_rights(rights.table());

    context.put_cycle(cycles::Row {
        cycle,
        first_level: bounds.first,
        last_level: bounds.last,
        snapshot_level: step.level.previous().unwrap_or(step.level),
        seed,
        selected_bakers: u32::try_from(stakes.len()).unwrap_or(u32::MAX),
        selected_power: total_power,
        rewards,
        protocol: rules.version,
        created_at: step.level,
    })?;

    info!(
        target: EVENT_TARGET,
        cycle = %cycle,
        bakers = stakes.len(),
        power = total_power,
        carried = carried.len(),
        "cycle.created"
    );

    Ok(())
}

/// Delete the cycles created by the block, with their rights and settlement rows.
#[instrument(level = "trace", skip_all, name = "cycle.revert_begin", fields(cycle = %step.cycle))]
pub fn revert_begin<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
) -> Result<(), LedgerError> {
    let created: Vec<cycles::Row> = context.store().cycles_created_at(step.level)?.collect();

    for row in created {
        let cycle = row.cycle;

        for baker_cycle in context.baker_cycles(cycle)? {
            context.remove_baker_cycle(baker_cycle.key())?;
        }

        // Baking rights sit within the cycle, attestations one level later.
        context.remove_rights_between(row.first_level, row.last_level.next(), |right| {
            match right.kind {
                RightKind::Baking => right.level <= row.last_level,
                RightKind::Attestation => right.level > row.first_level,
            }
        })?;

        context.remove_cycle(cycle)?;

        debug!(target: EVENT_TARGET, cycle = %cycle, "cycle.deleted");
    }

    Ok(())
}

// End
// ----------------------------------------------------------------------------

/// Attesting rewards of a cycle, paid or lost, per baker.
#[derive(Default)]
struct Settlements {
    paid: BTreeMap<AccountId, baker_cycles::RewardSplit>,
    lost: BTreeMap<AccountId, Mutez>,
}

impl Settlements {
    fn from_movements(movements: &[Movement]) -> Self {
        let mut settlements = Self::default();
        for movement in movements {
            match movement {
                Movement::Reward {
                    kind: RewardKind::Attesting,
                    baker,
                    bucket,
                    amount,
                } => settlements
                    .paid
                    .entry(*baker)
                    .or_default()
                    .add(*bucket, *amount),
                Movement::LostAttestingRewards { baker, amount } => {
                    *settlements.lost.entry(*baker).or_default() += amount;
                }
                Movement::Reward { .. }
                | Movement::BlockFees { .. }
                | Movement::Stake { .. }
                | Movement::Unstake { .. }
                | Movement::Restake { .. }
                | Movement::Finalize { .. }
                | Movement::SlashStaked { .. }
                | Movement::SlashUnstaked { .. }
                | Movement::Transfer { .. }
                | Movement::Credit { .. }
                | Movement::Debit { .. } => (),
            }
        }
        settlements
    }
}

/// Settle attesting rewards of the current cycle, then check that every duty was accounted for.
#[instrument(level = "trace", skip_all, name = "cycle.end", fields(cycle = %step.cycle))]
pub fn end<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    movements: &[Movement],
) -> Result<(), LedgerError> {
    let cycle = step.cycle;
    let mut settlements = Settlements::from_movements(movements);

    for row in context.baker_cycles(cycle)? {
        let baker = row.baker;
        let expected = row.future_attestation_rewards;
        let paid = settlements.paid.remove(&baker);
        let lost = settlements.lost.remove(&baker);

        let row = context
            .baker_cycle_mut(row.key())?
            .ok_or(InvariantError::MissingBakerCycle { cycle, baker })?;

        match (paid, lost) {
            (None, None) if expected == 0 => (),
            (None, None) => {
                return Err(ValidationError::UnsettledAttestationRewards { cycle, baker }.into())
            }
            (Some(split), None) if split.total() == expected => {
                row.attestation_rewards.merge(&split, 1);
                row.future_attestation_rewards = 0;
            }
            (None, Some(amount)) if amount == expected => {
                row.missed_attestation_rewards += amount;
                row.future_attestation_rewards = 0;
            }
            (paid, lost) => {
                return Err(ValidationError::AttestationRewards {
                    cycle,
                    baker,
                    expected,
                    found: paid.map(|split| split.total()).unwrap_or_default()
                        + lost.unwrap_or_default(),
                }
                .into())
            }
        }

        if !row.is_settled() {
            return Err(InvariantError::UnsettledRights { cycle, baker }.into());
        }
    }

    if let Some(baker) = settlements
        .paid
        .keys()
        .chain(settlements.lost.keys())
        .next()
    {
        return Err(ValidationError::UnattributableReward {
            level: step.level,
            baker: *baker,
        }
        .into());
    }

    info!(target: EVENT_TARGET, cycle = %cycle, "cycle.settled");

    Ok(())
}

pub fn revert_end<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    movements: &[Movement],
) -> Result<(), LedgerError> {
    let cycle = step.cycle;
    let settlements = Settlements::from_movements(movements);

    for (baker, split) in settlements.paid {
        let row = context
            .baker_cycle_mut((cycle, baker))?
            .ok_or(InvariantError::MissingBakerCycle { cycle, baker })?;
        row.attestation_rewards.merge(&split, -1);
        row.future_attestation_rewards += split.total();
    }

    for (baker, amount) in settlements.lost {
        let row = context
            .baker_cycle_mut((cycle, baker))?
            .ok_or(InvariantError::MissingBakerCycle { cycle, baker })?;
        row.missed_attestation_rewards -= amount;
        row.future_attestation_rewards += amount;
    }

    Ok(())
}
