// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing_subscriber::{
    fmt::{format::DefaultFields, FormattedFields},
    prelude::*,
    registry::Registry,
    EnvFilter,
};

// Inspired heavily by bevy_log

#[derive(Clone, Debug, Default, StructOpt)]
pub struct TraceLogOpts {
    /// Capture a chrome-format execution trace.
    #[structopt(short = "T", long)]
    trace: bool,

    /// Where to write the chrome trace; defaults to a timestamped file
    /// in the working directory.
    #[structopt(long)]
    trace_file: Option<PathBuf>,
}

impl TraceLogOpts {
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// Keeps the chrome trace open; the trace is flushed when this drops.
pub struct TraceLog {
    guard: Option<tracing_chrome::FlushGuard>,
}

impl TraceLog {
    pub fn is_tracing(&self) -> bool {
        self.guard.is_some()
    }
}

/// Install the process-wide logger. Without --trace this is plain
/// env_logger; with it, log records are bridged into a tracing registry
/// that also captures spans into a chrome trace.
pub fn init(opts: &TraceLogOpts) -> Result<TraceLog> {
    if !opts.trace {
        env_logger::try_init()?;
        return Ok(TraceLog { guard: None });
    }

    tracing_log::LogTracer::init()?;

    let subscriber = Registry::default();
    let subscriber = subscriber.with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    let subscriber = subscriber.with(tracing_error::ErrorLayer::default());
    let (chrome_layer, guard) = {
        let mut builder = tracing_chrome::ChromeLayerBuilder::new().name_fn(Box::new(
            |event_or_span| match event_or_span {
                tracing_chrome::EventOrSpan::Event(event) => event.metadata().name().into(),
                tracing_chrome::EventOrSpan::Span(span) => {
                    if let Some(fields) = span.extensions().get::<FormattedFields<DefaultFields>>()
                    {
                        format!("{}: {}", span.metadata().name(), fields.fields.as_str())
                    } else {
                        span.metadata().name().into()
                    }
                }
            },
        ));
        if let Some(path) = &opts.trace_file {
            builder = builder.file(path.clone());
        }
        builder.build()
    };

    let fmt_layer = tracing_subscriber::fmt::Layer::default();
    let subscriber = subscriber.with(fmt_layer);
    let subscriber = subscriber.with(chrome_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| anyhow!("could not set global tracing subscriber: {}", err))?;

    Ok(TraceLog { guard: Some(guard) })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_trace_defaults_off() {
        let opts = TraceLogOpts::from_iter(["test"]);
        assert!(!opts.trace);
        assert!(opts.trace_file.is_none());
        assert!(opts.with_trace(true).trace);
    }

    #[test]
    fn test_parse_trace_file() {
        let opts = TraceLogOpts::from_iter(["test", "-T", "--trace-file", "out.json"]);
        assert!(opts.trace);
        assert_eq!(opts.trace_file, Some(PathBuf::from("out.json")));
    }
}
