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

use crate::{AccountId, Cycle, Mutez};
use serde::{Deserialize, Serialize};

/// A single balance update, as reported by the node in block metadata. Updates always come in
/// pairs: a debit immediately followed by the matching credit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub kind: BalanceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<BalanceCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staker: Option<StakerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Cycle>,
    pub change: Mutez,
    #[serde(default)]
    pub origin: Origin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    Contract,
    Freezer,
    Accumulator,
    Minted,
    Burned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceCategory {
    Deposits,
    UnstakedDeposits,
    BakingRewards,
    BakingBonuses,
    AttestingRewards,
    LostAttestingRewards,
    NonceRevelationRewards,
    VdfRevelationRewards,
    BlockFees,
    Punishments,
    StorageFees,
    Invoice,
    Subsidy,
}

/// Who a frozen deposit belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StakerRef {
    /// An external staker of `delegate`.
    Single {
        contract: AccountId,
        delegate: AccountId,
    },
    /// All external stakers of `delegate`, collectively.
    Shared { delegate: AccountId },
    /// The baker's own stake.
    Baker { baker: AccountId },
    /// The baker's cut on its stakers' rewards.
    BakerEdge { baker: AccountId },
}

impl StakerRef {
    pub fn baker(&self) -> AccountId {
        match self {
            StakerRef::Single { delegate, .. } | StakerRef::Shared { delegate } => *delegate,
            StakerRef::Baker { baker } | StakerRef::BakerEdge { baker } => *baker,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Block,
    Migration,
    Subsidy,
    DelayedOperation,
}

impl BalanceUpdate {
    fn new(kind: BalanceKind, category: Option<BalanceCategory>, change: Mutez) -> Self {
        Self {
            kind,
            category,
            contract: None,
            staker: None,
            delegate: None,
            cycle: None,
            change,
            origin: Origin::Block,
        }
    }

    pub fn contract(contract: AccountId, change: Mutez) -> Self {
        Self {
            contract: Some(contract),
            ..Self::new(BalanceKind::Contract, None, change)
        }
    }

    pub fn minted(category: BalanceCategory, change: Mutez) -> Self {
        Self::new(BalanceKind::Minted, Some(category), change)
    }

    pub fn burned(category: BalanceCategory, change: Mutez) -> Self {
        Self::new(BalanceKind::Burned, Some(category), change)
    }

    pub fn accumulator(category: BalanceCategory, change: Mutez) -> Self {
        Self::new(BalanceKind::Accumulator, Some(category), change)
    }

    pub fn deposits(staker: StakerRef, change: Mutez) -> Self {
        Self {
            staker: Some(staker),
            ..Self::new(BalanceKind::Freezer, Some(BalanceCategory::Deposits), change)
        }
    }

    pub fn unstaked_deposits(staker: StakerRef, cycle: Cycle, change: Mutez) -> Self {
        Self {
            staker: Some(staker),
            cycle: Some(cycle),
            ..Self::new(
                BalanceKind::Freezer,
                Some(BalanceCategory::UnstakedDeposits),
                change,
            )
        }
    }

    pub fn lost_attesting_rewards(delegate: AccountId, change: Mutez) -> Self {
        Self {
            delegate: Some(delegate),
            ..Self::burned(BalanceCategory::LostAttestingRewards, change)
        }
    }

    /// Convenience for building the debit/credit pair the node would emit for a transfer of
    /// `amount` from `source` to `destination`.
    pub fn pair(source: Self, destination: Self, amount: Mutez) -> [Self; 2] {
        [
            Self {
                change: -amount,
                ..source
            },
            Self {
                change: amount,
                ..destination
            },
        ]
    }
}
