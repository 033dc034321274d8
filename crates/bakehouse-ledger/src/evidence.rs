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

//! Balance updates come in debit/credit pairs. Each pair is a single movement of funds, which is
//! what the ledger actually reasons about.

use crate::{state::ValidationError, store::columns::baker_cycles::Bucket};
use bakehouse_kernel::{
    AccountId, BalanceCategory, BalanceKind, BalanceUpdate, Cycle, Mutez, StakerRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    Baking,
    Bonus,
    Attesting,
    NonceRevelation,
    VdfRevelation,
}

impl RewardKind {
    fn from_category(category: BalanceCategory) -> Option<Self> {
        match category {
            BalanceCategory::BakingRewards => Some(RewardKind::Baking),
            BalanceCategory::BakingBonuses => Some(RewardKind::Bonus),
            BalanceCategory::AttestingRewards => Some(RewardKind::Attesting),
            BalanceCategory::NonceRevelationRewards => Some(RewardKind::NonceRevelation),
            BalanceCategory::VdfRevelationRewards => Some(RewardKind::VdfRevelation),
            BalanceCategory::Deposits
            | BalanceCategory::UnstakedDeposits
            | BalanceCategory::LostAttestingRewards
            | BalanceCategory::BlockFees
            | BalanceCategory::Punishments
            | BalanceCategory::StorageFees
            | BalanceCategory::Invoice
            | BalanceCategory::Subsidy => None,
        }
    }

    pub fn is_revelation(&self) -> bool {
        matches!(self, RewardKind::NonceRevelation | RewardKind::VdfRevelation)
    }
}

/// A classified debit/credit pair. For staking movements, `staker` is the baker itself when the
/// baker's own stake moves; slashes of the external pool as a whole have no staker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Movement {
    Reward {
        kind: RewardKind,
        baker: AccountId,
        bucket: Bucket,
        amount: Mutez,
    },
    LostAttestingRewards {
        baker: AccountId,
        amount: Mutez,
    },
    BlockFees {
        baker: AccountId,
        amount: Mutez,
    },
    Stake {
        baker: AccountId,
        staker: AccountId,
        amount: Mutez,
    },
    Unstake {
        baker: AccountId,
        staker: AccountId,
        cycle: Cycle,
        amount: Mutez,
    },
    Restake {
        baker: AccountId,
        staker: AccountId,
        cycle: Cycle,
        amount: Mutez,
    },
    Finalize {
        baker: AccountId,
        staker: AccountId,
        cycle: Cycle,
        amount: Mutez,
    },
    SlashStaked {
        baker: AccountId,
        staker: Option<AccountId>,
        amount: Mutez,
        beneficiary: Option<AccountId>,
    },
    SlashUnstaked {
        baker: AccountId,
        staker: Option<AccountId>,
        cycle: Cycle,
        amount: Mutez,
        beneficiary: Option<AccountId>,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Mutez,
    },
    /// Funds appearing on an account from outside of the ledger, e.g. subsidies.
    Credit { account: AccountId, amount: Mutez },
    /// Funds leaving an account for outside of the ledger, e.g. fees.
    Debit { account: AccountId, amount: Mutez },
}

impl Movement {
    pub fn is_staking(&self) -> bool {
        match self {
            Movement::Stake { .. }
            | Movement::Unstake { .. }
            | Movement::Restake { .. }
            | Movement::Finalize { .. }
            | Movement::SlashStaked { .. }
            | Movement::SlashUnstaked { .. } => true,
            Movement::Reward { .. }
            | Movement::LostAttestingRewards { .. }
            | Movement::BlockFees { .. }
            | Movement::Transfer { .. }
            | Movement::Credit { .. }
            | Movement::Debit { .. } => false,
        }
    }
}

/// Pair and classify every balance update of a block, in order. Zero-amount pairs are dropped.
pub fn movements(updates: &[BalanceUpdate]) -> Result<Vec<Movement>, ValidationError> {
    let mut movements = Vec::with_capacity(updates.len() / 2);
    for (n, pair) in updates.chunks(2).enumerate() {
        let index = 2 * n;
        let (debit, credit) = match pair {
            [debit, credit] => (debit, credit),
            _ => return Err(ValidationError::UnbalancedUpdate { index }),
        };

        if debit.change > 0 || debit.change + credit.change != 0 {
            return Err(ValidationError::UnbalancedUpdate { index });
        }

        if credit.change != 0 {
            movements.push(classify(index, debit, credit, credit.change)?);
        }
    }
    Ok(movements)
}

/// (baker, staker) behind a frozen-deposit reference. `None` stands for the external pool.
fn staker_of(staker: &StakerRef) -> (AccountId, Option<AccountId>) {
    match *staker {
        StakerRef::Single { contract, delegate } => (delegate, Some(contract)),
        StakerRef::Shared { delegate } => (delegate, None),
        StakerRef::Baker { baker } | StakerRef::BakerEdge { baker } => (baker, Some(baker)),
    }
}

fn reward_bucket(staker: &StakerRef) -> Option<Bucket> {
    match staker {
        StakerRef::Baker { .. } => Some(Bucket::StakedOwn),
        StakerRef::BakerEdge { .. } => Some(Bucket::StakedEdge),
        StakerRef::Shared { .. } => Some(Bucket::StakedShared),
        StakerRef::Single { .. } => None,
    }
}

fn classify(
    index: usize,
    debit: &BalanceUpdate,
    credit: &BalanceUpdate,
    amount: Mutez,
) -> Result<Movement, ValidationError> {
    use BalanceCategory as C;
    use BalanceKind as K;

    let unexpected = || ValidationError::UnexpectedMovement { index };

    let movement = match (
        (debit.kind, debit.category, debit.contract, debit.staker.as_ref()),
        (credit.kind, credit.category, credit.contract, credit.staker.as_ref()),
    ) {
        // Lost attesting rewards are minted, then burned right away.
        (
            (K::Minted, Some(C::AttestingRewards), ..),
            (K::Burned, Some(C::LostAttestingRewards), ..),
        ) => Movement::LostAttestingRewards {
            baker: credit.delegate.ok_or_else(unexpected)?,
            amount,
        },

        ((K::Minted, Some(category), ..), (K::Contract, _, Some(baker), _)) => {
            match RewardKind::from_category(category) {
                Some(kind) => Movement::Reward {
                    kind,
                    baker,
                    bucket: Bucket::Delegated,
                    amount,
                },
                None => Movement::Credit {
                    account: baker,
                    amount,
                },
            }
        }

        (
            (K::Minted, Some(category), ..),
            (K::Freezer, Some(C::Deposits), _, Some(staker)),
        ) => {
            let kind = RewardKind::from_category(category).ok_or_else(unexpected)?;
            Movement::Reward {
                kind,
                baker: staker.baker(),
                bucket: reward_bucket(staker).ok_or_else(unexpected)?,
                amount,
            }
        }

        ((K::Accumulator, Some(C::BlockFees), ..), (K::Contract, _, Some(baker), _)) => {
            Movement::BlockFees { baker, amount }
        }

        ((K::Contract, _, Some(from), _), (K::Contract, _, Some(to), _)) => {
            Movement::Transfer { from, to, amount }
        }

        ((K::Contract, _, Some(account), _), (K::Burned | K::Accumulator, ..)) => {
            Movement::Debit { account, amount }
        }

        (
            (K::Contract, _, Some(source), _),
            (K::Freezer, Some(C::Deposits), _, Some(staker)),
        ) => {
            let (baker, staker) = staker_of(staker);
            match staker {
                Some(staker) if staker == source => Movement::Stake {
                    baker,
                    staker,
                    amount,
                },
                Some(_) | None => return Err(unexpected()),
            }
        }

        (
            (K::Freezer, Some(C::Deposits), _, Some(from)),
            (K::Freezer, Some(C::UnstakedDeposits), _, Some(to)),
        ) => {
            let (baker, staker) = staker_of(from);
            if staker_of(to) != (baker, staker) {
                return Err(unexpected());
            }
            Movement::Unstake {
                baker,
                staker: staker.ok_or_else(unexpected)?,
                cycle: credit.cycle.ok_or_else(unexpected)?,
                amount,
            }
        }

        (
            (K::Freezer, Some(C::UnstakedDeposits), _, Some(from)),
            (K::Freezer, Some(C::Deposits), _, Some(to)),
        ) => {
            let (baker, staker) = staker_of(from);
            if staker_of(to) != (baker, staker) {
                return Err(unexpected());
            }
            Movement::Restake {
                baker,
                staker: staker.ok_or_else(unexpected)?,
                cycle: debit.cycle.ok_or_else(unexpected)?,
                amount,
            }
        }

        (
            (K::Freezer, Some(C::UnstakedDeposits), _, Some(from)),
            (K::Contract, _, Some(to), _),
        ) => {
            match staker_of(from) {
                (baker, Some(staker)) if staker == to => Movement::Finalize {
                    baker,
                    staker,
                    cycle: debit.cycle.ok_or_else(unexpected)?,
                    amount,
                },
                // Part of a slashed deposit goes to whoever denounced the baker.
                _ => {
                    let (baker, staker) = slashed(from).ok_or_else(unexpected)?;
                    Movement::SlashUnstaked {
                        baker,
                        staker,
                        cycle: debit.cycle.ok_or_else(unexpected)?,
                        amount,
                        beneficiary: Some(to),
                    }
                }
            }
        }

        (
            (K::Freezer, Some(C::UnstakedDeposits), _, Some(from)),
            (K::Burned, Some(C::Punishments), ..),
        ) => {
            let (baker, staker) = slashed(from).ok_or_else(unexpected)?;
            Movement::SlashUnstaked {
                baker,
                staker,
                cycle: debit.cycle.ok_or_else(unexpected)?,
                amount,
                beneficiary: None,
            }
        }

        (
            (K::Freezer, Some(C::Deposits), _, Some(from)),
            (K::Burned, Some(C::Punishments), ..),
        ) => {
            let (baker, staker) = slashed(from).ok_or_else(unexpected)?;
            Movement::SlashStaked {
                baker,
                staker,
                amount,
                beneficiary: None,
            }
        }

        ((K::Freezer, Some(C::Deposits), _, Some(from)), (K::Contract, _, Some(to), _)) => {
            let (baker, staker) = slashed(from).ok_or_else(unexpected)?;
            Movement::SlashStaked {
                baker,
                staker,
                amount,
                beneficiary: Some(to),
            }
        }

        ((K::Minted | K::Accumulator, ..), (K::Contract, _, Some(account), _)) => {
            Movement::Credit { account, amount }
        }

        _ => return Err(unexpected()),
    };

    Ok(movement)
}

/// Slashes hit either the baker's own deposits or the external pool as a whole.
fn slashed(staker: &StakerRef) -> Option<(AccountId, Option<AccountId>)> {
    match *staker {
        StakerRef::Baker { baker } => Some((baker, Some(baker))),
        StakerRef::Shared { delegate } => Some((delegate, None)),
        StakerRef::Single { .. } | StakerRef::BakerEdge { .. } => None,
    }
}
