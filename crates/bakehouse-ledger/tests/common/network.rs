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

//! A sandbox chain shared by two bakers. Rights are drawn at random, so blocks are built out of
//! the rights the ledger holds rather than out of a fixed schedule.

use super::{constants, cycle_of, hash, BLOCKS_PER_CYCLE, THRESHOLD};
use bakehouse_kernel::{
    AccountId, Attestation, BalanceCategory, BalanceUpdate, Block, Cycle, CycleEras, Delegation,
    Level, Mutez, Nonce, ProtocolVersion, RewardConstants, Right, RightKind, VdfSolution,
};
use bakehouse_ledger::{
    store::columns::{accounts, baker_cycles, bakers},
    Genesis, GenesisAccount, GenesisBaker, Ledger, MemoryStore, ReadStore, RuleRegistry,
};

pub const BAKER_A: AccountId = AccountId::new(1);
pub const BAKER_B: AccountId = AccountId::new(2);

/// Delegates to A.
pub const ALICE: AccountId = AccountId::new(10);
/// Delegates to B.
pub const BOB: AccountId = AccountId::new(11);
/// Delegates to A, and stakes with it.
pub const CAROL: AccountId = AccountId::new(12);

pub const BAKER_BALANCE: Mutez = 10_000_000;
pub const BAKER_STAKE: Mutez = 1_000_000;
pub const DELEGATOR_BALANCE: Mutez = 50_000;

pub const NONCE_TIP: Mutez = 7;
pub const VDF_TIP: Mutez = 13;

pub fn rewards() -> RewardConstants {
    RewardConstants {
        nonce_revelation_tip: NONCE_TIP,
        vdf_revelation_tip: VDF_TIP,
        ..super::rewards()
    }
}

/// Block reward plus the largest bonus: what a baking right is worth until it is exercised.
pub fn full_block_rewards() -> Mutez {
    rewards().block_reward + constants().max_block_bonus(&rewards())
}

pub fn genesis() -> Genesis {
    let baker = |id| GenesisBaker {
        id,
        balance: BAKER_BALANCE,
        staked: BAKER_STAKE,
    };
    let delegator = |id, delegate| GenesisAccount {
        id,
        balance: DELEGATOR_BALANCE,
        delegate: Some(delegate),
    };

    Genesis {
        hash: hash(0),
        protocol: ProtocolVersion(0),
        timestamp: 0,
        bakers: vec![baker(BAKER_A), baker(BAKER_B)],
        accounts: vec![
            delegator(ALICE, BAKER_A),
            delegator(BOB, BAKER_B),
            delegator(CAROL, BAKER_A),
        ],
        issuance: Vec::new(),
    }
}

/// How the next level goes. The default is the happy path: the payload is proposed at round 0,
/// produced right away, attested by everyone and every attesting reward is paid.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    /// Rank, among the level's baking rights ordered by round, of the right the payload is
    /// proposed under.
    pub proposal: usize,
    /// Rank of the right the block is finally produced under, when another baker re-proposes the
    /// payload at a later round.
    pub reproposal: Option<usize>,
    /// Attesters that stay silent.
    pub silent: Vec<AccountId>,
    /// Bakers whose attesting rewards are lost at the end of the cycle.
    pub forfeit: Vec<AccountId>,
    pub operations: Vec<BalanceUpdate>,
    pub delegations: Vec<Delegation>,
    pub deactivated: Vec<AccountId>,
    pub nonce_revelations: Vec<Nonce>,
    pub vdf_revelation: Option<VdfSolution>,
}

pub struct Chain {
    ledger: Ledger<MemoryStore>,
    blocks: Vec<Block>,
}

impl Chain {
    /// A bootstrapped chain, at level 0.
    pub fn new() -> Self {
        let eras = CycleEras::single(BLOCKS_PER_CYCLE).unwrap();
        let registry = RuleRegistry::sandbox(constants(), rewards());
        let mut ledger = Ledger::new(MemoryStore::new(), registry, eras);
        ledger.bootstrap(&genesis()).unwrap();
        Self {
            ledger,
            blocks: Vec::new(),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        self.ledger.store()
    }

    pub fn ledger(&mut self) -> &mut Ledger<MemoryStore> {
        &mut self.ledger
    }

    pub fn next_level(&self) -> u32 {
        u32::try_from(self.blocks.len()).unwrap() + 1
    }

    /// Baking rights of `level`, by round.
    pub fn baking_rights(&self, level: u32) -> Vec<Right> {
        let mut rights: Vec<Right> = self
            .store()
            .rights_at(Level::new(level))
            .unwrap()
            .filter(|right| right.kind == RightKind::Baking)
            .collect();
        rights.sort_by_key(|right| right.round);
        rights
    }

    /// Attestation rights stored at `level`, i.e. for the level before.
    pub fn attestation_rights(&self, level: u32) -> Vec<Right> {
        self.store()
            .rights_at(Level::new(level))
            .unwrap()
            .filter(|right| right.kind == RightKind::Attestation)
            .collect()
    }

    pub fn right(&self, level: u32, kind: RightKind, baker: AccountId) -> Right {
        self.store()
            .right(&(Level::new(level), kind, baker))
            .unwrap()
            .unwrap_or_else(|| panic!("no {kind:?} right for {baker} at level {level}"))
    }

    pub fn baker(&self, id: AccountId) -> bakers::Row {
        self.store().baker(&id).unwrap().unwrap()
    }

    pub fn account(&self, id: AccountId) -> accounts::Row {
        self.store().account(&id).unwrap().unwrap()
    }

    pub fn baker_cycle(&self, cycle: Cycle, baker: AccountId) -> baker_cycles::Row {
        self.store()
            .baker_cycle(&(cycle, baker))
            .unwrap()
            .unwrap_or_else(|| panic!("no row for {baker} in cycle {cycle}"))
    }

    /// The next block, going as `plan` says.
    pub fn block(&self, plan: Plan) -> Block {
        let level = self.next_level();
        let baking = self.baking_rights(level);
        let proposed = &baking[plan.proposal];
        let produced = &baking[plan.reproposal.unwrap_or(plan.proposal)];

        let attestations: Vec<Attestation> = self
            .attestation_rights(level)
            .into_iter()
            .filter(|right| !plan.silent.contains(&right.baker))
            .map(|right| Attestation {
                baker: right.baker,
                power: right.slots.unwrap(),
            })
            .collect();
        let power: u32 = attestations.iter().map(|attestation| attestation.power).sum();

        let mut balance_updates = plan.operations;
        balance_updates.extend(BalanceUpdate::pair(
            BalanceUpdate::minted(BalanceCategory::BakingRewards, 0),
            BalanceUpdate::contract(proposed.baker, 0),
            rewards().block_reward,
        ));

        let bonus = rewards().block_bonus(power, THRESHOLD);
        if bonus > 0 {
            balance_updates.extend(BalanceUpdate::pair(
                BalanceUpdate::minted(BalanceCategory::BakingBonuses, 0),
                BalanceUpdate::contract(produced.baker, 0),
                bonus,
            ));
        }

        if level % BLOCKS_PER_CYCLE == 0 {
            for row in self.store().baker_cycles(cycle_of(level)).unwrap() {
                let due = row.future_attestation_rewards;
                if due == 0 {
                    continue;
                }
                let destination = if plan.forfeit.contains(&row.baker) {
                    BalanceUpdate::lost_attesting_rewards(row.baker, 0)
                } else {
                    BalanceUpdate::contract(row.baker, 0)
                };
                balance_updates.extend(BalanceUpdate::pair(
                    BalanceUpdate::minted(BalanceCategory::AttestingRewards, 0),
                    destination,
                    due,
                ));
            }
        }

        Block {
            level: Level::new(level),
            hash: hash(level),
            predecessor: hash(level - 1),
            timestamp: i64::from(level) * 8,
            protocol: ProtocolVersion(0),
            payload_round: proposed.round.unwrap(),
            block_round: produced.round.unwrap(),
            proposer: proposed.baker,
            producer: produced.baker,
            attestations,
            balance_updates,
            nonce_revelations: plan.nonce_revelations,
            vdf_revelation: plan.vdf_revelation,
            delegations: plan.delegations,
            deactivated: plan.deactivated,
            issuance: Vec::new(),
        }
    }

    /// Build and apply the next block.
    pub fn apply(&mut self, plan: Plan) -> Block {
        let block = self.block(plan);
        self.ledger
            .apply(&block)
            .unwrap_or_else(|e| panic!("block {}: {e}", block.level));
        self.blocks.push(block.clone());
        block
    }

    /// Revert the tip.
    pub fn revert(&mut self) -> Block {
        let block = self.blocks.pop().unwrap();
        self.ledger
            .revert(&block)
            .unwrap_or_else(|e| panic!("block {}: {e}", block.level));
        block
    }

    /// Apply happy blocks until `level` is next.
    pub fn run_until(&mut self, level: u32) {
        while self.next_level() < level {
            self.apply(Plan::default());
        }
    }

    /// Apply happy blocks until the next level satisfies `wanted`, and return that level.
    pub fn advance_to(&mut self, wanted: impl Fn(&Self, u32) -> bool) -> u32 {
        let horizon = self.next_level() + 8 * BLOCKS_PER_CYCLE;
        while !wanted(self, self.next_level()) {
            assert!(
                self.next_level() < horizon,
                "no suitable level before {horizon}"
            );
            self.apply(Plan::default());
        }
        self.next_level()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// Both bakers hold a baking right at `level`.
pub fn contested(chain: &Chain, level: u32) -> bool {
    chain.baking_rights(level).len() == 2
}
