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

use bakehouse_kernel::{CycleEras, Level, ProtocolConstants, ProtocolVersion, RewardConstants};
use bakehouse_ledger::{
    protocols::{Overrides, ProtocolError},
    RuleRegistry,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

const EVENT_TARGET: &str = "bakehouse::config";

/// Levels per cycle on the main network, before any upgrade resized them.
pub const MAINNET_BLOCKS_PER_CYCLE: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid protocol table: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("no protocol has cycles of {blocks_per_cycle} levels, as the era at {first_level} does")]
    CycleLength {
        first_level: Level,
        blocks_per_cycle: u32,
    },
}

/// Which table of protocol rules the engine follows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocols {
    /// The upgrades of the main network.
    #[default]
    Mainnet,

    /// One set of rules for every version.
    Sandbox {
        constants: ProtocolConstants,
        rewards: RewardConstants,
    },

    /// An arbitrary sequence of upgrades, each inheriting from its predecessor.
    Custom(Vec<(ProtocolVersion, Overrides)>),
}

impl Protocols {
    pub fn registry(&self) -> Result<RuleRegistry, ProtocolError> {
        match self {
            Self::Mainnet => Ok(RuleRegistry::mainnet()),
            Self::Sandbox { constants, rewards } => {
                Ok(RuleRegistry::sandbox(constants.clone(), rewards.clone()))
            }
            Self::Custom(entries) => RuleRegistry::new(entries.iter().cloned()),
        }
    }
}

/// Network description shared by every command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub eras: CycleEras,
    #[serde(default)]
    pub protocols: Protocols,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eras: CycleEras::single(MAINNET_BLOCKS_PER_CYCLE)
                .unwrap_or_else(|e| unreachable!("a single era is always well-formed: {e}")),
            protocols: Protocols::Mainnet,
        }
    }
}

impl Config {
    /// Read the configuration at `path`, or fall back to the main network's.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let config: Self = load_json(path)?;
                config.validate()?;
                debug!(
                    target: EVENT_TARGET,
                    path = %path.display(),
                    eras = config.eras.eras().len(),
                    "config.loaded"
                );
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn registry(&self) -> Result<RuleRegistry, ConfigError> {
        Ok(self.protocols.registry()?)
    }

    /// Every era must match the cycle length of at least one protocol. Which protocol actually
    /// governs each block is checked by the ledger as it goes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let registry = self.registry()?;
        for era in self.eras.eras() {
            let known = registry
                .iter()
                .any(|rules| rules.constants.blocks_per_cycle == era.blocks_per_cycle);
            if !known {
                return Err(ConfigError::CycleLength {
                    first_level: era.first_level,
                    blocks_per_cycle: era.blocks_per_cycle,
                });
            }
        }
        Ok(())
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakehouse_kernel::Cycle;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_to_mainnet() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.protocols, Protocols::Mainnet);
        assert_eq!(
            config.eras.blocks_per_cycle(Cycle::new(0)).unwrap(),
            MAINNET_BLOCKS_PER_CYCLE
        );
    }

    #[test]
    fn sandbox_from_file() {
        let file = write(
            r#"{
                "eras": [{ "first_level": 1, "first_cycle": 0, "blocks_per_cycle": 8 }],
                "protocols": {
                    "sandbox": {
                        "constants": {
                            "blocks_per_cycle": 8,
                            "consensus_rights_delay": 2,
                            "consensus_committee_size": 16,
                            "consensus_threshold": 11,
                            "max_round": 3,
                            "minimal_stake": 1000,
                            "minimal_frozen_stake": 100,
                            "delegation_over_baking_divisor": 1,
                            "limit_of_staking_over_baking": 5
                        },
                        "rewards": {
                            "block_reward": 100,
                            "block_bonus_per_slot": 10,
                            "attestation_reward_per_slot": 5,
                            "nonce_revelation_tip": 1,
                            "vdf_revelation_tip": 1
                        }
                    }
                }
            }"#,
        );

        let config = Config::load(Some(file.path())).unwrap();
        let registry = config.registry().unwrap();
        let rules = registry.rules(ProtocolVersion(42)).unwrap();
        assert_eq!(rules.constants.consensus_committee_size, 16);
        assert_eq!(config.eras.blocks_per_cycle(Cycle::new(3)).unwrap(), 8);
    }

    #[test]
    fn protocols_are_optional() {
        let file =
            write(r#"{ "eras": [{ "first_level": 1, "first_cycle": 0, "blocks_per_cycle": 8192 }] }"#);
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.protocols, Protocols::Mainnet);
    }

    #[test]
    fn eras_follow_mainnet_resizes() {
        let file = write(
            r#"{ "eras": [
                { "first_level": 1, "first_cycle": 0, "blocks_per_cycle": 8192 },
                { "first_level": 81921, "first_cycle": 10, "blocks_per_cycle": 16384 },
                { "first_level": 245761, "first_cycle": 20, "blocks_per_cycle": 24576 }
            ] }"#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.eras.blocks_per_cycle(Cycle::new(25)).unwrap(), 24576);
    }

    #[test]
    fn eras_unknown_to_every_protocol_are_rejected() {
        let file =
            write(r#"{ "eras": [{ "first_level": 1, "first_cycle": 0, "blocks_per_cycle": 4 }] }"#);
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::CycleLength {
                blocks_per_cycle: 4,
                ..
            })
        ));
    }

    #[test]
    fn default_config_is_consistent() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn missing_file_names_its_path() {
        let error = Config::load(Some(Path::new("/nonexistent/bakehouse.json"))).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/bakehouse.json"));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let file = write(r#"{ "eras": "#);
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Json { .. })
        ));
    }
}
