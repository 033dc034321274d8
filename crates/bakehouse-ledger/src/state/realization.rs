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

//! Settle the rights exercised by a block: the baking rights of its level and the attestation
//! rights of the previous one, which the block includes.

use crate::{
    context::BlockContext,
    evidence::{Movement, RewardKind},
    state::{InvariantError, LedgerError, Step, ValidationError},
    store::{columns::baker_cycles, ReadStore},
};
use bakehouse_kernel::{AccountId, Block, Cycle, Mutez, Right, RightKind, RightStatus};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

const EVENT_TARGET: &str = "bakehouse::ledger::realization";

/// Amounts a block pays for itself, as found in its evidence.
struct BlockRewards {
    expected_reward: Mutez,
    expected_bonus: Mutez,
    max_bonus: Mutez,
    rewards: Vec<(baker_cycles::Bucket, Mutez)>,
    bonuses: Vec<(baker_cycles::Bucket, Mutez)>,
}

impl BlockRewards {
    fn new<S: ReadStore>(
        context: &mut BlockContext<'_, S>,
        step: &Step<'_>,
        block: &Block,
        movements: &[Movement],
    ) -> Result<Self, LedgerError> {
        let constants = &step.rules.constants;
        let rewards = context
            .cycle(step.cycle)?
            .ok_or(ValidationError::MissingCycle(step.cycle))?
            .rewards
            .clone();

        let mut block_rewards = Self {
            expected_reward: rewards.block_reward,
            expected_bonus: rewards
                .block_bonus(block.attestation_power(), constants.consensus_threshold),
            max_bonus: constants.max_block_bonus(&rewards),
            rewards: Vec::new(),
            bonuses: Vec::new(),
        };

        for movement in movements {
            if let Movement::Reward {
                kind,
                baker,
                bucket,
                amount,
            } = movement
            {
                match kind {
                    RewardKind::Baking if *baker == block.proposer => {
                        block_rewards.rewards.push((*bucket, *amount));
                    }
                    RewardKind::Bonus if *baker == block.producer => {
                        block_rewards.bonuses.push((*bucket, *amount));
                    }
                    RewardKind::Baking | RewardKind::Bonus => {
                        return Err(ValidationError::UnattributableReward {
                            level: step.level,
                            baker: *baker,
                        }
                        .into());
                    }
                    RewardKind::Attesting
                    | RewardKind::NonceRevelation
                    | RewardKind::VdfRevelation => (),
                }
            }
        }

        Ok(block_rewards)
    }

    fn paid_reward(&self) -> Mutez {
        self.rewards.iter().map(|(_, amount)| amount).sum()
    }

    fn paid_bonus(&self) -> Mutez {
        self.bonuses.iter().map(|(_, amount)| amount).sum()
    }

    /// What a right promised when the cycle got created.
    fn full(&self) -> Mutez {
        self.expected_reward + self.max_bonus
    }
}

fn baker_cycle_mut<'c, S: ReadStore>(
    context: &'c mut BlockContext<'_, S>,
    cycle: Cycle,
    baker: AccountId,
) -> Result<&'c mut baker_cycles::Row, LedgerError> {
    Ok(context
        .baker_cycle_mut((cycle, baker))?
        .ok_or(InvariantError::MissingBakerCycle { cycle, baker })?)
}

/// The right realized by a block is the one its payload was proposed under: the proposer's
/// earliest round, up to the payload round. A block re-proposed at a later round by another baker
/// still realizes the original proposer's right.
fn proposer_right(rights: &[Right], block: &Block) -> Option<Right> {
    rights
        .iter()
        .find(|right| {
            right.kind == RightKind::Baking
                && right.baker == block.proposer
                && right.round.is_some_and(|round| round <= block.payload_round)
        })
        .cloned()
}

#[instrument(level = "trace", skip_all, name = "rights.realize", fields(level = %step.level))]
pub fn apply<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    block: &Block,
    movements: &[Movement],
) -> Result<(), LedgerError> {
    let rewards = BlockRewards::new(context, step, block, movements)?;

    if rewards.paid_reward() != rewards.expected_reward {
        return Err(ValidationError::BlockReward {
            level: step.level,
            expected: rewards.expected_reward,
            found: rewards.paid_reward(),
        }
        .into());
    }

    if rewards.paid_bonus() != rewards.expected_bonus {
        return Err(ValidationError::BlockBonus {
            level: step.level,
            expected: rewards.expected_bonus,
            found: rewards.paid_bonus(),
        }
        .into());
    }

    if block.payload_round > block.block_round {
        return Err(ValidationError::PayloadRound {
            level: step.level,
            payload_round: block.payload_round,
            block_round: block.block_round,
        }
        .into());
    }

    let rights = context.rights_at(step.level)?;

    let realized = proposer_right(&rights, block).ok_or(ValidationError::MissingBakingRight {
        level: step.level,
        proposer: block.proposer,
    })?;

    let attesters: BTreeSet<AccountId> = rights
        .iter()
        .filter(|right| right.kind == RightKind::Attestation)
        .map(|right| right.baker)
        .collect();

    for mut right in rights {
        let row = baker_cycle_mut(context, right.cycle, right.baker)?;

        match right.kind {
            RightKind::Baking => {
                row.future_blocks -= 1;
                row.future_block_rewards -= rewards.full();
                // Rounds before the payload round passed without a proposal; later ones only
                // re-proposed it.
                right.status = if right == realized {
                    row.blocks += 1;
                    row.missed_block_rewards += rewards.max_bonus - rewards.paid_bonus();
                    RightStatus::Realized
                } else if right.round.unwrap_or_default() < block.payload_round {
                    row.missed_blocks += 1;
                    row.missed_block_rewards += rewards.full();
                    RightStatus::Missed
                } else {
                    RightStatus::Uncovered
                };
            }
            RightKind::Attestation => {
                let slots = right.slots.unwrap_or_default();
                let power = block.attestation_power_of(right.baker);
                if power > slots {
                    return Err(ValidationError::ExcessAttestation {
                        level: step.level,
                        baker: right.baker,
                        slots,
                        power,
                    }
                    .into());
                }
                row.future_attestations -= slots;
                row.attestations += power;
                row.missed_attestations += slots - power;
                right.status = if power > 0 {
                    RightStatus::Realized
                } else {
                    RightStatus::Missed
                };
            }
        }

        context.put_right(right)?;
    }

    for attestation in &block.attestations {
        if !attesters.contains(&attestation.baker) {
            return Err(ValidationError::UnexpectedAttestation {
                level: step.level,
                baker: attestation.baker,
            }
            .into());
        }
    }

    let proposer = baker_cycle_or_new(context, step, block.proposer)?;
    for (bucket, amount) in &rewards.rewards {
        proposer.block_rewards.add(*bucket, *amount);
    }

    let producer = baker_cycle_or_new(context, step, block.producer)?;
    for (bucket, amount) in &rewards.bonuses {
        producer.block_rewards.add(*bucket, *amount);
    }

    debug!(
        target: EVENT_TARGET,
        proposer = %block.proposer,
        producer = %block.producer,
        payload_round = block.payload_round,
        round = block.block_round,
        power = block.attestation_power(),
        "rights.realized"
    );

    Ok(())
}

fn baker_cycle_or_new<'c, S: ReadStore>(
    context: &'c mut BlockContext<'_, S>,
    step: &Step<'_>,
    baker: AccountId,
) -> Result<&'c mut baker_cycles::Row, LedgerError> {
    Ok(context.baker_cycle_or_new((step.cycle, baker), step.level)?)
}

pub fn revert<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    block: &Block,
    movements: &[Movement],
) -> Result<(), LedgerError> {
    let rewards = BlockRewards::new(context, step, block, movements)?;

    let producer = baker_cycle_mut(context, step.cycle, block.producer)?;
    for (bucket, amount) in &rewards.bonuses {
        producer.block_rewards.add(*bucket, -amount);
    }

    let proposer = baker_cycle_mut(context, step.cycle, block.proposer)?;
    for (bucket, amount) in &rewards.rewards {
        proposer.block_rewards.add(*bucket, -amount);
    }

    for mut right in context.rights_at(step.level)? {
        let row = baker_cycle_mut(context, right.cycle, right.baker)?;

        match (right.kind, right.status) {
            (RightKind::Baking, RightStatus::Realized) => {
                row.blocks -= 1;
                row.missed_block_rewards -= rewards.max_bonus - rewards.paid_bonus();
            }
            (RightKind::Baking, RightStatus::Missed) => {
                row.missed_blocks -= 1;
                row.missed_block_rewards -= rewards.full();
            }
            (RightKind::Baking, RightStatus::Uncovered) => (),
            (RightKind::Attestation, RightStatus::Realized | RightStatus::Missed) => {
                let slots = right.slots.unwrap_or_default();
                let power = block.attestation_power_of(right.baker);
                row.attestations -= power;
                row.missed_attestations -= slots - power;
            }
            (RightKind::Baking | RightKind::Attestation, RightStatus::Future)
            | (RightKind::Attestation, RightStatus::Uncovered) => continue,
        }

        match right.kind {
            RightKind::Baking => {
                row.future_blocks += 1;
                row.future_block_rewards += rewards.full();
            }
            RightKind::Attestation => {
                row.future_attestations += right.slots.unwrap_or_default();
            }
        }

        right.status = RightStatus::Future;
        context.put_right(right)?;
    }

    Ok(())
}
