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

//! The state at level 0, as announced by the chain's parameters.

use bakehouse_kernel::{AccountId, BlockHash, ExpectedIssuance, Mutez, ProtocolVersion};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub hash: BlockHash,
    pub protocol: ProtocolVersion,
    #[serde(default)]
    pub timestamp: i64,
    pub bakers: Vec<GenesisBaker>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,

    /// Reward constants of the first cycles, for protocols announcing them.
    #[serde(default)]
    pub issuance: Vec<ExpectedIssuance>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBaker {
    pub id: AccountId,
    pub balance: Mutez,
    #[serde(default)]
    pub staked: Mutez,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub id: AccountId,
    pub balance: Mutez,
    #[serde(default)]
    pub delegate: Option<AccountId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn optional_fields_default() {
        let genesis: Genesis = serde_json::from_str(
            r#"{
                "hash": "0000000000000000000000000000000000000000000000000000000000000000",
                "protocol": 19,
                "bakers": [{ "id": 1, "balance": 8000000000 }]
            }"#,
        )
        .unwrap();

        assert_eq!(genesis.bakers[0].staked, 0);
        assert!(genesis.accounts.is_empty());
        assert!(genesis.issuance.is_empty());
    }
}
