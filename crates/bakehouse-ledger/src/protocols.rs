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

//! Which rules apply to a block, per protocol version.
//!
//! Every protocol upgrade either keeps the rules of its predecessor or overrides some of them.
//! The registry records those overrides in version order and folds them once, at construction,
//! into fully resolved [`ProtocolRules`]. Entries are only ever added: the ledger must be able to
//! replay cycles settled under long-gone protocols.

use crate::store::columns::bakers;
use bakehouse_kernel::{
    Cycle, Mutez, ProtocolConstants, ProtocolVersion, RewardConstants, RightsParameters, RoundSelection,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("no rules known for protocol {0}")]
    UnknownVersion(ProtocolVersion),
    #[error("protocol table entries must be strictly increasing; found {found} after {previous}")]
    Unordered {
        previous: ProtocolVersion,
        found: ProtocolVersion,
    },
    #[error("the first entry of a protocol table must define every rule; {0} is missing")]
    Incomplete(&'static str),
    #[error(
        "protocol {protocol} has cycles of {rules} levels, but cycle {cycle} is configured with \
         {eras}"
    )]
    CycleLength {
        protocol: ProtocolVersion,
        cycle: Cycle,
        rules: u32,
        eras: u32,
    },
}

/// How the baking power of a baker is measured when taking a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BakingPowerRule {
    /// Everything owned or delegated counts fully.
    StakingBalance,
    /// Staked tez count fully, delegated tez are discounted and external stake is capped.
    Staking,
}

/// How the attestation rewards expected from a baker over a cycle are estimated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationRewardRule {
    /// A fixed amount per attestation slot assigned.
    RightsBased,
    /// A share of the cycle's attestation rewards proportional to the baking power.
    StakeBased,
}

/// Where the reward constants of a new cycle come from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceSource {
    /// Fixed by the protocol.
    Constants(RewardConstants),
    /// Announced by the node, in the block that starts the cycle.
    Rpc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRules {
    pub version: ProtocolVersion,
    pub name: String,
    pub constants: ProtocolConstants,
    pub round_selection: RoundSelection,
    pub baking_power: BakingPowerRule,
    pub attestation_rewards: AttestationRewardRule,
    pub issuance: IssuanceSource,

    /// Whether stake, unstake and finalize balance updates may show up at all.
    pub staking_enabled: bool,
}

impl ProtocolRules {
    pub fn rights_parameters(&self) -> RightsParameters {
        self.constants.rights_parameters(self.round_selection)
    }

    /// Baking power of a baker under these rules, or `None` when the baker does not qualify for
    /// selection at all.
    pub fn baking_power(&self, baker: &bakers::Row) -> Option<u64> {
        let constants = &self.constants;

        let power = match self.baking_power {
            BakingPowerRule::StakingBalance => baker.staking_balance(),
            BakingPowerRule::Staking => {
                if baker.own_staked < constants.minimal_frozen_stake {
                    return None;
                }
                let limit = baker
                    .own_staked
                    .saturating_mul(constants.limit_of_staking_over_baking);
                let external = baker.external_staked.min(limit);
                let overstaked = baker.external_staked - external;
                let delegated = baker.balance
                    + baker.own_unstaked
                    + baker.external_unstaked
                    + baker.delegated_balance
                    + overstaked;
                baker.own_staked
                    + external
                    + delegated / constants.delegation_over_baking_divisor.max(1)
            }
        };

        if power < constants.minimal_stake || power <= 0 {
            return None;
        }

        u64::try_from(power).ok()
    }

    /// Expected attestation rewards of a baker over a whole cycle.
    pub fn expected_attestation_rewards(
        &self,
        rewards: &RewardConstants,
        slots: u32,
        power: u64,
        total_power: u64,
        blocks_per_cycle: u32,
    ) -> Mutez {
        match self.attestation_rewards {
            AttestationRewardRule::RightsBased => {
                Mutez::from(slots) * rewards.attestation_reward_per_slot
            }
            AttestationRewardRule::StakeBased => {
                if total_power == 0 {
                    return 0;
                }
                let cycle_rewards = i128::from(rewards.attestation_reward_per_slot)
                    * i128::from(self.constants.consensus_committee_size)
                    * i128::from(blocks_per_cycle);
                let share = cycle_rewards * i128::from(power) / i128::from(total_power);
                Mutez::try_from(share).unwrap_or(Mutez::MAX)
            }
        }
    }
}

/// Changes a protocol brings over its predecessor. Unset fields are inherited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub name: Option<String>,
    pub constants: Option<ProtocolConstants>,
    pub round_selection: Option<RoundSelection>,
    pub baking_power: Option<BakingPowerRule>,
    pub attestation_rewards: Option<AttestationRewardRule>,
    pub issuance: Option<IssuanceSource>,
    pub staking_enabled: Option<bool>,
}

impl Overrides {
    fn complete(self, version: ProtocolVersion) -> Result<ProtocolRules, ProtocolError> {
        Ok(ProtocolRules {
            version,
            name: self.name.unwrap_or_else(|| version.to_string()),
            constants: self.constants.ok_or(ProtocolError::Incomplete("constants"))?,
            round_selection: self
                .round_selection
                .ok_or(ProtocolError::Incomplete("round_selection"))?,
            baking_power: self
                .baking_power
                .ok_or(ProtocolError::Incomplete("baking_power"))?,
            attestation_rewards: self
                .attestation_rewards
                .ok_or(ProtocolError::Incomplete("attestation_rewards"))?,
            issuance: self.issuance.ok_or(ProtocolError::Incomplete("issuance"))?,
            staking_enabled: self.staking_enabled.unwrap_or(false),
        })
    }

    fn inherit(self, version: ProtocolVersion, previous: &ProtocolRules) -> ProtocolRules {
        ProtocolRules {
            version,
            name: self.name.unwrap_or_else(|| version.to_string()),
            constants: self
                .constants
                .unwrap_or_else(|| previous.constants.clone()),
            round_selection: self.round_selection.unwrap_or(previous.round_selection),
            baking_power: self.baking_power.unwrap_or(previous.baking_power),
            attestation_rewards: self
                .attestation_rewards
                .unwrap_or(previous.attestation_rewards),
            issuance: self.issuance.unwrap_or_else(|| previous.issuance.clone()),
            staking_enabled: self.staking_enabled.unwrap_or(previous.staking_enabled),
        }
    }
}

/// Version-ordered table of resolved rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleRegistry {
    rules: Vec<ProtocolRules>,
}

impl RuleRegistry {
    pub fn new(
        entries: impl IntoIterator<Item = (ProtocolVersion, Overrides)>,
    ) -> Result<Self, ProtocolError> {
        let mut rules: Vec<ProtocolRules> = Vec::new();

        for (version, overrides) in entries {
            let resolved = match rules.last() {
                None => overrides.complete(version)?,
                Some(previous) if previous.version < version => {
                    overrides.inherit(version, previous)
                }
                Some(previous) => {
                    return Err(ProtocolError::Unordered {
                        previous: previous.version,
                        found: version,
                    })
                }
            };
            rules.push(resolved);
        }

        Ok(Self { rules })
    }

    /// Rules of `version`, or of the closest version registered before it.
    pub fn rules(&self, version: ProtocolVersion) -> Result<&ProtocolRules, ProtocolError> {
        self.rules
            .iter()
            .rev()
            .find(|rules| rules.version <= version)
            .ok_or(ProtocolError::UnknownVersion(version))
    }

    pub fn versions(&self) -> impl Iterator<Item = ProtocolVersion> + '_ {
        self.rules.iter().map(|rules| rules.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtocolRules> + '_ {
        self.rules.iter()
    }

    /// A single set of rules for every version, handy for test networks.
    pub fn sandbox(constants: ProtocolConstants, rewards: RewardConstants) -> Self {
        Self {
            rules: vec![ProtocolRules {
                version: ProtocolVersion(0),
                name: "sandbox".to_string(),
                constants,
                round_selection: RoundSelection::Independent,
                baking_power: BakingPowerRule::Staking,
                attestation_rewards: AttestationRewardRule::RightsBased,
                issuance: IssuanceSource::Constants(rewards),
                staking_enabled: true,
            }],
        }
    }

    /// The sequence of upgrades of the main network, from the introduction of rounds onward.
    pub fn mainnet() -> Self {
        let ithaca = ProtocolConstants {
            blocks_per_cycle: 8192,
            consensus_rights_delay: 5,
            consensus_committee_size: 7000,
            consensus_threshold: 4667,
            max_round: 4,
            minimal_stake: 6_000_000_000,
            minimal_frozen_stake: 600_000_000,
            delegation_over_baking_divisor: 1,
            limit_of_staking_over_baking: 0,
        };

        let mumbai = ProtocolConstants {
            blocks_per_cycle: 16384,
            ..ithaca.clone()
        };

        let paris = ProtocolConstants {
            blocks_per_cycle: 24576,
            consensus_rights_delay: 2,
            delegation_over_baking_divisor: 3,
            limit_of_staking_over_baking: 5,
            ..mumbai.clone()
        };

        let quebec = ProtocolConstants {
            blocks_per_cycle: 30720,
            ..paris.clone()
        };

        let entries = [
            (
                ProtocolVersion(12),
                Overrides {
                    name: Some("ithaca".to_string()),
                    constants: Some(ithaca),
                    round_selection: Some(RoundSelection::Independent),
                    baking_power: Some(BakingPowerRule::StakingBalance),
                    attestation_rewards: Some(AttestationRewardRule::RightsBased),
                    issuance: Some(IssuanceSource::Constants(RewardConstants {
                        block_reward: 10_000_000,
                        block_bonus_per_slot: 4_286,
                        attestation_reward_per_slot: 2_857,
                        nonce_revelation_tip: 1_250_000,
                        vdf_revelation_tip: 0,
                    })),
                    staking_enabled: Some(false),
                },
            ),
            (
                ProtocolVersion(15),
                Overrides {
                    name: Some("lima".to_string()),
                    issuance: Some(IssuanceSource::Constants(RewardConstants {
                        block_reward: 10_000_000,
                        block_bonus_per_slot: 4_286,
                        attestation_reward_per_slot: 2_857,
                        nonce_revelation_tip: 1_250_000,
                        vdf_revelation_tip: 1_250_000,
                    })),
                    ..Overrides::default()
                },
            ),
            (
                ProtocolVersion(16),
                Overrides {
                    name: Some("mumbai".to_string()),
                    constants: Some(mumbai),
                    issuance: Some(IssuanceSource::Constants(RewardConstants {
                        block_reward: 5_000_000,
                        block_bonus_per_slot: 2_143,
                        attestation_reward_per_slot: 1_428,
                        nonce_revelation_tip: 625_000,
                        vdf_revelation_tip: 625_000,
                    })),
                    ..Overrides::default()
                },
            ),
            (
                ProtocolVersion(19),
                Overrides {
                    name: Some("paris".to_string()),
                    constants: Some(paris),
                    baking_power: Some(BakingPowerRule::Staking),
                    attestation_rewards: Some(AttestationRewardRule::StakeBased),
                    issuance: Some(IssuanceSource::Rpc),
                    staking_enabled: Some(true),
                    ..Overrides::default()
                },
            ),
            (
                ProtocolVersion(21),
                Overrides {
                    name: Some("quebec".to_string()),
                    constants: Some(quebec),
                    ..Overrides::default()
                },
            ),
        ];

        Self::new(entries).unwrap_or_else(|e| unreachable!("built-in mainnet table is valid: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakehouse_kernel::{AccountId, Level};
    use test_case::test_case;

    #[test_case(12 => Ok("ithaca".to_string()); "first entry")]
    #[test_case(14 => Ok("ithaca".to_string()); "falls back to predecessor")]
    #[test_case(16 => Ok("mumbai".to_string()); "exact match")]
    #[test_case(20 => Ok("paris".to_string()); "between entries")]
    #[test_case(42 => Ok("quebec".to_string()); "beyond the last entry")]
    #[test_case(11 => Err(ProtocolError::UnknownVersion(ProtocolVersion(11))); "before the first entry")]
    fn mainnet_lookup(version: u16) -> Result<String, ProtocolError> {
        RuleRegistry::mainnet()
            .rules(ProtocolVersion(version))
            .map(|rules| rules.name.clone())
    }

    #[test]
    fn overrides_inherit_unset_fields() {
        let registry = RuleRegistry::mainnet();
        let lima = registry.rules(ProtocolVersion(15)).unwrap();
        let ithaca = registry.rules(ProtocolVersion(12)).unwrap();
        assert_eq!(lima.constants, ithaca.constants);
        assert_eq!(lima.baking_power, BakingPowerRule::StakingBalance);
        assert_ne!(lima.issuance, ithaca.issuance);

        let quebec = registry.rules(ProtocolVersion(21)).unwrap();
        assert_eq!(quebec.issuance, IssuanceSource::Rpc);
        assert!(quebec.staking_enabled);
        assert_eq!(quebec.constants.blocks_per_cycle, 30720);
        assert_eq!(quebec.constants.consensus_rights_delay, 2);
    }

    #[test]
    fn table_must_be_ordered() {
        let result = RuleRegistry::new([
            (
                ProtocolVersion(3),
                RuleRegistry::mainnet()
                    .rules(ProtocolVersion(12))
                    .map(|rules| Overrides {
                        name: Some(rules.name.clone()),
                        constants: Some(rules.constants.clone()),
                        round_selection: Some(rules.round_selection),
                        baking_power: Some(rules.baking_power),
                        attestation_rewards: Some(rules.attestation_rewards),
                        issuance: Some(rules.issuance.clone()),
                        staking_enabled: Some(rules.staking_enabled),
                    })
                    .unwrap(),
            ),
            (ProtocolVersion(3), Overrides::default()),
        ]);
        assert_eq!(
            result,
            Err(ProtocolError::Unordered {
                previous: ProtocolVersion(3),
                found: ProtocolVersion(3)
            })
        );
    }

    #[test]
    fn first_entry_must_be_complete() {
        assert_eq!(
            RuleRegistry::new([(ProtocolVersion(1), Overrides::default())]),
            Err(ProtocolError::Incomplete("constants"))
        );
    }

    fn baker(own_staked: i64, external_staked: i64, balance: i64, delegated: i64) -> bakers::Row {
        bakers::Row {
            own_staked,
            external_staked,
            balance,
            delegated_balance: delegated,
            ..bakers::Row::new(AccountId::new(1), Level::new(0))
        }
    }

    #[test]
    fn staking_power_discounts_delegation_and_caps_external_stake() {
        let rules = RuleRegistry::mainnet()
            .rules(ProtocolVersion(19))
            .unwrap()
            .clone();
        let row = baker(
            10_000_000_000,
            60_000_000_000,
            3_000_000_000,
            6_000_000_000,
        );
        // 10k own, 50k external within the limit, (3k + 6k + 10k overstaked) / 3 delegated.
        assert_eq!(
            rules.baking_power(&row),
            Some(10_000_000_000 + 50_000_000_000 + 19_000_000_000 / 3)
        );
    }

    #[test]
    fn small_bakers_are_not_selected() {
        let rules = RuleRegistry::mainnet()
            .rules(ProtocolVersion(19))
            .unwrap()
            .clone();
        assert_eq!(rules.baking_power(&baker(100, 0, 0, 0)), None);

        let ithaca = RuleRegistry::mainnet()
            .rules(ProtocolVersion(12))
            .unwrap()
            .clone();
        assert_eq!(
            ithaca.baking_power(&baker(0, 0, 5_000_000_000, 2_000_000_000)),
            Some(7_000_000_000)
        );
        assert_eq!(ithaca.baking_power(&baker(0, 0, 5_000_000_000, 0)), None);
    }

    #[test_case(AttestationRewardRule::RightsBased, 10, 500, 1_000 => 20; "per slot")]
    #[test_case(AttestationRewardRule::StakeBased, 10, 500, 1_000 => 2 * 4 * 8 / 2; "per stake")]
    #[test_case(AttestationRewardRule::StakeBased, 10, 0, 0 => 0; "empty snapshot")]
    fn expected_attestation_rewards(
        rule: AttestationRewardRule,
        slots: u32,
        power: u64,
        total: u64,
    ) -> Mutez {
        let mut rules = RuleRegistry::mainnet()
            .rules(ProtocolVersion(12))
            .unwrap()
            .clone();
        rules.attestation_rewards = rule;
        rules.constants.consensus_committee_size = 4;
        let rewards = RewardConstants {
            attestation_reward_per_slot: 2,
            ..RewardConstants::default()
        };
        rules.expected_attestation_rewards(&rewards, slots, power, total, 8)
    }
}
