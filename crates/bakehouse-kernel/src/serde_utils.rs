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

use crate::Pseudotokens;
use serde::{Deserialize, Deserializer, Serializer};
use std::str::FromStr;

pub fn hex_to_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    hex::decode(s).map_err(serde::de::Error::custom)
}

pub fn bytes_to_hex<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&hex::encode(bytes.as_ref()))
}

/// Pseudotokens are serialised as decimal strings; JSON numbers cannot hold them.
pub mod pseudotokens {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Pseudotokens, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pseudotokens, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Pseudotokens::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub mod option_pseudotokens {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Pseudotokens>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Pseudotokens>, D::Error> {
        let s: Option<String> = Deserialize::deserialize(deserializer)?;
        s.map(|s| Pseudotokens::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
