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

//! Last words of a panicking process.
//!
//! A panic while replaying means the derived state can no longer be trusted. The hook prints what
//! it takes to reproduce it: the command line, the failing thread and the build. It then exits
//! with a status distinct from a rejected block's.

use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    env,
    panic::{self, PanicHookInfo},
    process::exit,
    thread,
};

/// Exit status after a panic. Rejected blocks and bad inputs exit with 1.
pub const PANIC_EXIT_CODE: i32 = 101;

const ISSUES: &str = "https://github.com/pragma-org/bakehouse/issues";

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Crate version and the commit it was built from, e.g. `0.1.0 (3f2a1bc+dirty)`.
pub fn version() -> String {
    let version = built_info::PKG_VERSION;
    match (built_info::GIT_COMMIT_HASH_SHORT, built_info::GIT_DIRTY) {
        (Some(sha), Some(true)) => format!("{version} ({sha}+dirty)"),
        (Some(sha), Some(false) | None) => format!("{version} ({sha})"),
        (None, _) => version.to_string(),
    }
}

pub fn panic_handler() {
    panic::set_hook(Box::new(|info| {
        eprintln!("{}", Report::new(info));

        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            eprintln!("{backtrace}");
        }

        exit(PANIC_EXIT_CODE);
    }));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub command: Vec<String>,
    pub thread: String,
    pub location: Option<String>,
    pub message: String,
}

impl Report {
    pub fn new(info: &PanicHookInfo<'_>) -> Self {
        Self {
            command: env::args().collect(),
            thread: thread::current().name().unwrap_or("<unnamed>").to_string(),
            location: info.location().map(ToString::to_string),
            message: payload_message(info.payload()),
        }
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = indoc::formatdoc! {
            "
            bakehouse panicked on thread '{thread}' at {location}:
                {message}

            The derived state cannot be trusted past this point. This is a bug, please report it
            at {ISSUES} along with the genesis and blocks leading to it.

                command:  {command}
                version:  {version}
                platform: {os}/{arch}
            ",
            thread = self.thread,
            location = self.location.as_deref().unwrap_or("an unknown location"),
            message = self.message,
            command = self.command.join(" "),
            version = version(),
            os = built_info::CFG_OS,
            arch = built_info::CFG_TARGET_ARCH,
        };
        f.write_str(&report)
    }
}

/// Panics carry a `&str` or a `String`, unless raised with `panic_any`.
fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string payload>".to_string()
    }
}
