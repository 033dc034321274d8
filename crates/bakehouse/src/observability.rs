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

use std::{
    env::VarError,
    error::Error,
    io::{self, IsTerminal},
    str::FromStr,
};
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::format::{FmtSpan, JsonFields},
    prelude::*,
    EnvFilter,
};

const BAKEHOUSE_LOG_VAR: &str = "BAKEHOUSE_LOG";

const DEFAULT_BAKEHOUSE_LOG_FILTER: &str = "bakehouse=info";

const BAKEHOUSE_TRACE_VAR: &str = "BAKEHOUSE_TRACE";

const DEFAULT_BAKEHOUSE_TRACE_FILTER: &str = "bakehouse=trace";

type DelayedWarning = Option<Box<dyn FnOnce()>>;

// -----------------------------------------------------------------------------
// ENV FILTER
// -----------------------------------------------------------------------------

fn new_default_filter(var: &str, default: &str) -> (EnvFilter, DelayedWarning) {
    match EnvFilter::try_from_env(var) {
        Ok(filter) => (filter, None),
        Err(e) => {
            // Notice stashed for when the tracing system is up.
            let fallback = default.to_string();
            let var = var.to_string();
            let warning = match e.source().and_then(|e| e.downcast_ref::<VarError>()) {
                Some(VarError::NotPresent) => {
                    Box::new(move || info!(var, fallback, "unspecified ENV variable"))
                        as Box<dyn FnOnce()>
                }
                Some(VarError::NotUnicode(_)) | None => {
                    Box::new(move || warn!(var, fallback, reason = %e, "invalid ENV variable"))
                        as Box<dyn FnOnce()>
                }
            };

            #[expect(clippy::expect_used)]
            let filter = EnvFilter::try_new(default).expect("invalid default filter");
            (filter, Some(warning))
        }
    }
}

// -----------------------------------------------------------------------------
// SETUP
// -----------------------------------------------------------------------------

/// Install the global subscriber: compact logs on stderr, filtered by `BAKEHOUSE_LOG`, and
/// optionally JSON traces on stdout, filtered by `BAKEHOUSE_TRACE`.
pub fn setup_observability(with_json_traces: bool, color: bool) {
    let (log_filter, warning_log) =
        new_default_filter(BAKEHOUSE_LOG_VAR, DEFAULT_BAKEHOUSE_LOG_FILTER);

    let logs = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr as fn() -> io::Stderr)
        .event_format(tracing_subscriber::fmt::format().with_ansi(color).compact())
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(log_filter);

    let (traces, warning_json) = if with_json_traces {
        let (trace_filter, warning) =
            new_default_filter(BAKEHOUSE_TRACE_VAR, DEFAULT_BAKEHOUSE_TRACE_FILTER);
        let layer = tracing_subscriber::fmt::layer()
            .event_format(
                tracing_subscriber::fmt::format()
                    .json()
                    .with_span_list(false),
            )
            .fmt_fields(JsonFields::new())
            .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
            .with_filter(trace_filter);
        (Some(layer), warning)
    } else {
        (None, None)
    };

    tracing_subscriber::registry().with(logs).with(traces).init();

    for notify in [warning_log, warning_json].into_iter().flatten() {
        notify();
    }
}

// -----------------------------------------------------------------------------
// COLOR
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Never,
    Always,
    Auto,
}

impl FromStr for Color {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Color::Never),
            "always" => Ok(Color::Always),
            "auto" => Ok(Color::Auto),
            _ => Err("valid color settings are 'never', 'always' or 'auto'"),
        }
    }
}

impl Color {
    pub fn is_enabled(this: Option<Self>) -> bool {
        match this {
            Some(Color::Never) => false,
            Some(Color::Always) => true,
            Some(Color::Auto) => io::stderr().is_terminal(),
            None => {
                if std::env::var("NO_COLOR").iter().any(|s| !s.is_empty()) {
                    false
                } else {
                    io::stderr().is_terminal()
                }
            }
        }
    }
}
