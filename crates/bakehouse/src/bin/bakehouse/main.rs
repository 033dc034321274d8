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

use bakehouse::{
    observability::{setup_observability, Color},
    panic::{panic_handler, version},
};

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::sync::LazyLock;
use tracing::info;

mod cmd;

/// Version string including git commit SHA.
static VERSION: LazyLock<String> = LazyLock::new(version);

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a chain from its genesis and print the resulting state.
    ///
    /// Blocks are read from a directory of JSON files, one block per file, and applied in level
    /// order. Optionally, the last few blocks are reverted afterwards, which exercises the very
    /// path taken on a chain reorganisation.
    #[clap(verbatim_doc_comment)]
    Replay(cmd::replay::Args),

    /// Compute the baking and attestation rights of a cycle from a stake distribution.
    Rights(cmd::rights::Args),
}

#[derive(Debug, Parser)]
#[clap(name = "Bakehouse")]
#[clap(bin_name = "bakehouse")]
#[clap(author, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[clap(long, action, env("BAKEHOUSE_WITH_JSON_TRACES"))]
    with_json_traces: bool,

    #[clap(long, action, env("BAKEHOUSE_COLOR"))]
    color: Option<Color>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    panic_handler();

    let matches = <Cli as CommandFactory>::command()
        .version(VERSION.as_str())
        .get_matches();
    let args = <Cli as FromArgMatches>::from_arg_matches(&matches)?;

    setup_observability(args.with_json_traces, Color::is_enabled(args.color));

    info!(
        with_json_traces = args.with_json_traces,
        "Started with global arguments"
    );

    match args.command {
        Command::Replay(args) => cmd::replay::run(args),
        Command::Rights(args) => cmd::rights::run(args),
    }
}
