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

pub mod balances;
pub mod cycles;
pub mod delegations;
pub mod realization;
pub mod staking;

use crate::{
    context::BlockContext,
    evidence,
    genesis::Genesis,
    protocols::{IssuanceSource, ProtocolError, ProtocolRules, RuleRegistry},
    store::{
        columns::{accounts, bakers, blocks, seed_inputs},
        ReadStore, Store, StoreError,
    },
};
use bakehouse_kernel::{
    AccountId, Block, BlockHash, Cycle, CycleEras, Level, LevelArithmeticError, Mutez,
    ProtocolVersion, RewardConstants,
};
use bakehouse_rights::{initial_seeds, RightsError};
use staking::StakingError;
use tracing::{info, instrument};

const EVENT_TARGET: &str = "bakehouse::ledger";

// Errors
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid block: {0}")]
    Validation(#[from] ValidationError),
    #[error("broken invariant: {0}")]
    Invariant(#[from] InvariantError),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Rights(#[from] RightsError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("unexpected staking behavior: {0}")]
    Staking(#[from] StakingError),
    #[error(transparent)]
    Arithmetic(#[from] LevelArithmeticError),
}

/// The block does not fit the state it is applied to, or its evidence does not add up.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("block {found} does not follow tip {tip:?}")]
    Discontinuity { tip: Option<Level>, found: Level },
    #[error("block {level} does not build on the current tip")]
    PredecessorMismatch { level: Level },
    #[error("ledger already bootstrapped")]
    AlreadyBootstrapped,
    #[error("balance update #{index} is not part of a debit/credit pair")]
    UnbalancedUpdate { index: usize },
    #[error("balance updates #{index} and next do not form a known movement")]
    UnexpectedMovement { index: usize },
    #[error("proposer {proposer} has no baking right at level {level}")]
    MissingBakingRight { level: Level, proposer: AccountId },
    #[error("block {level} carries a payload of round {payload_round}, after its own {block_round}")]
    PayloadRound {
        level: Level,
        payload_round: u32,
        block_round: u32,
    },
    #[error("baker {baker} attested level {level} without a right to")]
    UnexpectedAttestation { level: Level, baker: AccountId },
    #[error("baker {baker} attested with {power} slots at level {level}, out of {slots}")]
    ExcessAttestation {
        level: Level,
        baker: AccountId,
        slots: u32,
        power: u32,
    },
    #[error("block {level} pays a baking reward of {found} instead of {expected}")]
    BlockReward {
        level: Level,
        expected: Mutez,
        found: Mutez,
    },
    #[error("block {level} pays a bonus of {found} instead of {expected}")]
    BlockBonus {
        level: Level,
        expected: Mutez,
        found: Mutez,
    },
    #[error("attestation rewards of {baker} in cycle {cycle}: expected {expected}, found {found}")]
    AttestationRewards {
        cycle: Cycle,
        baker: AccountId,
        expected: Mutez,
        found: Mutez,
    },
    #[error("attestation rewards of {baker} in cycle {cycle} were neither paid nor lost")]
    UnsettledAttestationRewards { cycle: Cycle, baker: AccountId },
    #[error("reward paid to {baker} at level {level} matches no duty")]
    UnattributableReward { level: Level, baker: AccountId },
    #[error("no expected issuance for cycle {0}")]
    MissingIssuance(Cycle),
    #[error("unknown cycle {0}")]
    MissingCycle(Cycle),
    #[error("account {account} delegates to {delegate}, which is not a baker")]
    NotABaker {
        account: AccountId,
        delegate: AccountId,
    },
    #[error("account {0} cannot change delegate this way")]
    UnexpectedDelegation(AccountId),
    #[error("unknown baker {0} deactivated")]
    UnknownBaker(AccountId),
    #[error("external staking is not enabled under protocol {protocol}, yet block {level} stakes")]
    StakingDisabled {
        level: Level,
        protocol: ProtocolVersion,
    },
}

/// The ledger's own bookkeeping broke. These are never the block's fault.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("cannot revert block {level}: not the tip ({tip:?})")]
    NotTip { level: Level, tip: Option<Level> },
    #[error("cycle {cycle} ends with unsettled duties for {baker}")]
    UnsettledRights { cycle: Cycle, baker: AccountId },
    #[error("no row for baker {baker} in cycle {cycle}")]
    MissingBakerCycle { cycle: Cycle, baker: AccountId },
    #[error("account {account} delegates to {delegate}, which is not a baker")]
    DanglingDelegate {
        account: AccountId,
        delegate: AccountId,
    },
    #[error("no account {0}")]
    MissingAccount(AccountId),
    #[error("no baker {0}")]
    MissingBaker(AccountId),
    #[error("no update precedes #{id} on its unstake request")]
    MissingStakingUpdate { id: u64 },
    #[error("slash of {baker} names external staker {staker}; shared stakes have no owner")]
    ExternalStakedSlash { baker: AccountId, staker: AccountId },
}

// Step
// ----------------------------------------------------------------------------

/// What every step of processing a block shares.
pub struct Step<'a> {
    pub level: Level,
    pub cycle: Cycle,
    pub rules: &'a ProtocolRules,
    pub eras: &'a CycleEras,
}

impl Step<'_> {
    pub fn rewards_for(
        &self,
        cycle: Cycle,
        announced: &[bakehouse_kernel::ExpectedIssuance],
    ) -> Result<RewardConstants, ValidationError> {
        match &self.rules.issuance {
            IssuanceSource::Constants(rewards) => Ok(rewards.clone()),
            IssuanceSource::Rpc => announced
                .iter()
                .find(|issuance| issuance.cycle == cycle)
                .map(|issuance| issuance.rewards.clone())
                .ok_or(ValidationError::MissingIssuance(cycle)),
        }
    }
}

// Ledger
// ----------------------------------------------------------------------------

/// The derived state of the chain, moved one block at a time, forwards or backwards.
pub struct Ledger<S> {
    store: S,
    registry: RuleRegistry,
    eras: CycleEras,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: S, registry: RuleRegistry, eras: CycleEras) -> Self {
        Self {
            store,
            registry,
            eras,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn eras(&self) -> &CycleEras {
        &self.eras
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn tip(&self) -> Result<Option<blocks::Row>, LedgerError> {
        Ok(self.store.tip()?)
    }

    /// Install the state at level 0: initial balances and delegations, and the first
    /// `consensus_rights_delay + 1` cycles along with their rights.
    #[instrument(
        level = "info",
        skip_all,
        name = "ledger.bootstrap",
        fields(protocol = %genesis.protocol, bakers = genesis.bakers.len()),
    )]
    pub fn bootstrap(&mut self, genesis: &Genesis) -> Result<(), LedgerError> {
        if self.store.tip()?.is_some() {
            return Err(ValidationError::AlreadyBootstrapped.into());
        }

        let level = Level::new(0);
        let step = self.step(level, Cycle::new(0), genesis.protocol)?;
        let rules = step.rules;

        let mut context = BlockContext::new(&self.store);

        for baker in &genesis.bakers {
            let mut row = bakers::Row::new(baker.id, level);
            row.balance = baker.balance;
            row.own_staked = baker.staked;
            context.put_baker(row)?;
        }

        for account in &genesis.accounts {
            let mut row = accounts::Row::new(level);
            row.balance = account.balance;
            row.delegate = account.delegate;
            if let Some(delegate) = account.delegate {
                let baker = context
                    .baker_mut(delegate)?
                    .ok_or(ValidationError::NotABaker {
                        account: account.id,
                        delegate,
                    })?;
                baker.delegated_balance += account.balance;
                baker.delegators_count += 1;
            }
            context.put_account(account.id, row)?;
        }

        let delay = rules.constants.consensus_rights_delay;
        for (offset, seed) in (0..=delay).zip(initial_seeds(delay as usize + 1)) {
            let cycle = Cycle::new(offset);
            let rewards = step.rewards_for(cycle, &genesis.issuance)?;
            cycles::create(&mut context, &step, cycle, seed, rewards)?;
        }

        context.put_block(blocks::Row {
            level,
            hash: genesis.hash,
            predecessor: genesis.hash,
            protocol: genesis.protocol,
            cycle: Cycle::new(0),
            producer: None,
            timestamp: genesis.timestamp,
        })?;

        context.commit(level)?;

        info!(target: EVENT_TARGET, cycles = delay + 1, "bootstrapped");

        Ok(())
    }

    /// Apply the next block. On error, the store is left untouched.
    #[instrument(
        level = "info",
        skip_all,
        name = "ledger.apply",
        fields(level = %block.level, protocol = %block.protocol),
    )]
    pub fn apply(&mut self, block: &Block) -> Result<(), LedgerError> {
        let tip = self.store.tip()?;
        match &tip {
            Some(row) if row.level.next() == block.level => {
                if row.hash != block.predecessor {
                    return Err(ValidationError::PredecessorMismatch { level: block.level }.into());
                }
            }
            Some(_) | None => {
                return Err(ValidationError::Discontinuity {
                    tip: tip.as_ref().map(|row| row.level),
                    found: block.level,
                }
                .into());
            }
        }

        let step = self.step(
            block.level,
            self.eras.level_to_cycle(block.level)?,
            block.protocol,
        )?;

        let movements = evidence::movements(&block.balance_updates)?;

        let mut context = BlockContext::new(&self.store);

        if self.eras.is_cycle_start(block.level)? {
            cycles::begin(&mut context, &step, block)?;
        }

        realization::apply(&mut context, &step, block, &movements)?;

        delegations::apply(&mut context, &step, block)?;

        balances::apply(&mut context, &step, &movements)?;

        record_seed_inputs(&mut context, block)?;

        delegations::deactivate(&mut context, &step, block)?;

        if self.eras.is_cycle_end(block.level)? {
            cycles::end(&mut context, &step, &movements)?;
        }

        context.put_block(blocks::Row::new(block, step.cycle))?;

        context.commit(block.level)?;

        info!(
            target: EVENT_TARGET,
            level = %block.level,
            cycle = %step.cycle,
            hash = %block.hash,
            "applied"
        );

        Ok(())
    }

    /// Undo the tip. Reverting anything else is an [`InvariantError::NotTip`].
    #[instrument(
        level = "info",
        skip_all,
        name = "ledger.revert",
        fields(level = %block.level),
    )]
    pub fn revert(&mut self, block: &Block) -> Result<(), LedgerError> {
        let tip = self.store.tip()?;
        if !is_tip(tip.as_ref(), block.level, &block.hash) {
            return Err(InvariantError::NotTip {
                level: block.level,
                tip: tip.map(|tip| tip.level),
            }
            .into());
        }

        let step = self.step(
            block.level,
            self.eras.level_to_cycle(block.level)?,
            block.protocol,
        )?;

        let movements = evidence::movements(&block.balance_updates)?;

        let mut context = BlockContext::new(&self.store);

        if self.eras.is_cycle_end(block.level)? {
            cycles::revert_end(&mut context, &step, &movements)?;
        }

        delegations::revert_deactivations(&mut context, &step)?;

        staking::revert(&mut context, &step)?;

        balances::revert(&mut context, &step, &movements)?;

        delegations::revert(&mut context, &step)?;

        realization::revert(&mut context, &step, block, &movements)?;

        if self.eras.is_cycle_start(block.level)? {
            cycles::revert_begin(&mut context, &step)?;
        }

        context.remove_seed_inputs_at(block.level)?;

        // Rows first seen in this block go away with it.
        for account in context.accounts_created_at(block.level) {
            context.remove_account(account)?;
        }
        for key in context.baker_cycles_created_at(block.level) {
            context.remove_baker_cycle(key)?;
        }

        context.remove_block(block.level)?;

        let previous = block
            .level
            .previous()
            .ok_or(InvariantError::NotTip {
                level: block.level,
                tip: Some(block.level),
            })?;

        context.commit(previous)?;

        info!(target: EVENT_TARGET, level = %block.level, "reverted");

        Ok(())
    }
}

impl<S> Ledger<S> {
    /// Where a block of `protocol` at `level` stands. Its rules and the configured eras must agree
    /// on the length of its cycle, or rights would be drawn over the wrong levels.
    fn step(
        &self,
        level: Level,
        cycle: Cycle,
        protocol: ProtocolVersion,
    ) -> Result<Step<'_>, LedgerError> {
        let rules = self.registry.rules(protocol)?;
        let blocks_per_cycle = self.eras.blocks_per_cycle(cycle)?;
        if rules.constants.blocks_per_cycle != blocks_per_cycle {
            return Err(ProtocolError::CycleLength {
                protocol,
                cycle,
                rules: rules.constants.blocks_per_cycle,
                eras: blocks_per_cycle,
            }
            .into());
        }

        Ok(Step {
            level,
            cycle,
            rules,
            eras: &self.eras,
        })
    }
}

fn is_tip(tip: Option<&blocks::Row>, level: Level, hash: &BlockHash) -> bool {
    tip.is_some_and(|tip| tip.level == level && &tip.hash == hash)
}

fn record_seed_inputs<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    block: &Block,
) -> Result<(), StoreError> {
    let mut index = 0;
    for nonce in &block.nonce_revelations {
        context.put_seed_input((block.level, index), seed_inputs::Row::Nonce(*nonce))?;
        index += 1;
    }
    if let Some(vdf) = &block.vdf_revelation {
        context.put_seed_input((block.level, index), seed_inputs::Row::Vdf(vdf.clone()))?;
    }
    Ok(())
}

/// Fetch a row that the ledger's bookkeeping guarantees to exist.
pub(crate) fn baker_mut<'c, S: ReadStore>(
    context: &'c mut BlockContext<'_, S>,
    baker: AccountId,
) -> Result<&'c mut bakers::Row, LedgerError> {
    Ok(context
        .baker_mut(baker)?
        .ok_or(InvariantError::MissingBaker(baker))?)
}

pub(crate) fn account_mut<'c, S: ReadStore>(
    context: &'c mut BlockContext<'_, S>,
    account: AccountId,
) -> Result<&'c mut accounts::Row, LedgerError> {
    Ok(context
        .account_mut(account)?
        .ok_or(InvariantError::MissingAccount(account))?)
}
