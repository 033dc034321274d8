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

use bakehouse::config::{load_json, Config};
use bakehouse_kernel::{AccountId, Cycle, Hash, ProtocolVersion, Seed};
use bakehouse_rights::{generate, initial_seeds};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
pub struct Args {
    /// Cycle to draw the rights of.
    #[arg(long, value_name = "CYCLE")]
    cycle: u32,

    /// JSON-formatted file listing the baking power of every selected baker, as
    /// `[{ "baker": <id>, "power": <mutez> }, ...]`.
    #[arg(long, value_name = "FILE", env = "BAKEHOUSE_STAKES")]
    stakes: PathBuf,

    /// Hex-encoded seed of the cycle. Defaults to the seed the cycle has when no randomness was
    /// ever revealed.
    #[arg(long, value_name = "HEX", value_parser = parse_seed)]
    seed: Option<Seed>,

    /// Protocol whose rules apply. Defaults to the latest known one.
    #[arg(long, value_name = "VERSION")]
    protocol: Option<u16>,

    /// JSON-formatted file describing cycle eras and protocol rules. Defaults to the main
    /// network.
    #[arg(long, value_name = "FILE", env = "BAKEHOUSE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Stake {
    baker: AccountId,
    power: u64,
}

fn parse_seed(s: &str) -> Result<Seed, String> {
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| format!("expected 32 bytes, got {}", bytes.len()))?;
    Ok(Hash::from(bytes))
}

pub fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args.config.as_deref())?;
    let registry = config.registry()?;

    let version = match args.protocol {
        Some(version) => ProtocolVersion(version),
        None => registry
            .versions()
            .last()
            .ok_or("the protocol table is empty")?,
    };
    let rules = registry.rules(version)?;

    let cycle = Cycle::new(args.cycle);
    let bounds = config.eras.cycle_bounds(cycle)?;

    let seed = match args.seed {
        Some(seed) => seed,
        None => initial_seeds(args.cycle as usize + 1)
            .pop()
            .ok_or("no initial seed")?,
    };

    let mut stakes: Vec<(AccountId, u64)> = load_json::<Vec<Stake>>(&args.stakes)?
        .into_iter()
        .map(|stake| (stake.baker, stake.power))
        .collect();
    stakes.sort_by(|(a, power_a), (b, power_b)| power_b.cmp(power_a).then(a.cmp(b)));

    info!(
        cycle = %cycle,
        protocol = %rules.version,
        bakers = stakes.len(),
        seed = %seed,
        "Running command rights",
    );

    let rights = generate(cycle, bounds, &seed, &stakes, &rules.rights_parameters())?;

    for (baker, assigned) in rights.assigned() {
        info!(
            baker = %baker,
            blocks = assigned.blocks,
            attestations = assigned.attestations,
            "rights.assigned"
        );
    }

    super::print_json_lines(
        rights
            .baking
            .iter()
            .chain(rights.attestations.iter())
            .chain(rights.shifted.iter()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_must_be_32_bytes() {
        assert!(parse_seed(&"ab".repeat(32)).is_ok());
        assert!(parse_seed(&"ab".repeat(31)).is_err());
        assert!(parse_seed("not hex").is_err());
    }
}
