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

use bakehouse::config::{load_json, Config, ConfigError};
use bakehouse_kernel::{Block, Level};
use bakehouse_ledger::{
    store::columns::{bakers, blocks, cycles},
    Genesis, Ledger, LedgerError, MemoryStore, ReadStore,
};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
pub struct Args {
    /// JSON-formatted file describing the state at level 0.
    #[arg(long, value_name = "FILE", env = "BAKEHOUSE_GENESIS")]
    genesis: PathBuf,

    /// Directory of JSON-formatted blocks, one per file.
    #[arg(long, value_name = "DIR", env = "BAKEHOUSE_BLOCKS_DIR")]
    blocks_dir: PathBuf,

    /// JSON-formatted file describing cycle eras and protocol rules. Defaults to the main
    /// network.
    #[arg(long, value_name = "FILE", env = "BAKEHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after applying the block at this level.
    #[arg(long, value_name = "LEVEL", env = "BAKEHOUSE_UNTIL_LEVEL")]
    until_level: Option<u32>,

    /// Number of blocks to revert once every block is applied.
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    revert: usize,
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unable to list blocks in {path}: {source}")]
    BlocksDir { path: PathBuf, source: io::Error },
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] LedgerError),
    #[error("block {level} could not be applied: {source}")]
    Apply { level: Level, source: LedgerError },
    #[error("block {level} could not be reverted: {source}")]
    Revert { level: Level, source: LedgerError },
    #[error("cannot revert {requested} blocks, only {applied} were applied")]
    RevertTooFar { requested: usize, applied: usize },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What the ledger looks like once the replay is over.
#[derive(Debug, Serialize)]
struct Summary {
    tip: Option<blocks::Row>,
    last_cycle: Option<cycles::Row>,
    bakers: Vec<bakers::Row>,
}

pub fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        genesis = %args.genesis.display(),
        blocks_dir = %args.blocks_dir.display(),
        until_level = ?args.until_level,
        revert = args.revert,
        "Running command replay",
    );

    let summary = replay(&args)?;

    super::print_json_lines([summary])
}

fn replay(args: &Args) -> Result<Summary, ReplayError> {
    let config = Config::load(args.config.as_deref())?;
    let genesis: Genesis = load_json(&args.genesis)?;
    let blocks = load_blocks(&args.blocks_dir, args.until_level)?;

    let mut ledger = Ledger::new(MemoryStore::new(), config.registry()?, config.eras);

    ledger.bootstrap(&genesis).map_err(ReplayError::Bootstrap)?;

    for block in &blocks {
        ledger.apply(block).map_err(|source| ReplayError::Apply {
            level: block.level,
            source,
        })?;
    }

    info!(applied = blocks.len(), "replay.applied");

    if args.revert > blocks.len() {
        return Err(ReplayError::RevertTooFar {
            requested: args.revert,
            applied: blocks.len(),
        });
    }

    for block in blocks.iter().rev().take(args.revert) {
        ledger.revert(block).map_err(|source| ReplayError::Revert {
            level: block.level,
            source,
        })?;
    }

    if args.revert > 0 {
        info!(reverted = args.revert, "replay.reverted");
    }

    let store = ledger.store();
    let mut bakers: Vec<bakers::Row> = store.iter_bakers().map_err(LedgerError::from)?.collect();
    bakers.sort_by_key(|row| row.id);

    Ok(Summary {
        tip: ledger.tip()?,
        last_cycle: store.last_cycle().map_err(LedgerError::from)?,
        bakers,
    })
}

/// Read every `*.json` file of `dir` as a block, in parallel, and order them by level.
fn load_blocks(dir: &Path, until_level: Option<u32>) -> Result<Vec<Block>, ReplayError> {
    let blocks_dir_error = |source| ReplayError::BlocksDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(blocks_dir_error)? {
        let path = entry.map_err(blocks_dir_error)?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        } else {
            warn!(path = %path.display(), "replay.skipped_file");
        }
    }

    let mut blocks = paths
        .par_iter()
        .map(|path| load_json::<Block>(path))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(until) = until_level {
        blocks.retain(|block| block.level.as_u32() <= until);
    }

    blocks.sort_by_key(|block| block.level);

    Ok(blocks)
}
