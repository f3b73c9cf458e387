use std::str::FromStr;

use clap_verbosity_flag::log::LevelFilter;
use console::style;
use tracing_core::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::{self, Format, Writer},
    },
    registry::LookupSpan,
};

/// Prints the output of build scripts as bare lines and everything else in
/// the default `tracing` format.
pub struct TracingFormatter;

impl<S, N> FormatEvent<S, N> for TracingFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let mut buffer = String::new();
        let mut custom_writer = Writer::new(&mut buffer);

        if metadata.target().starts_with("bat_runner") && *metadata.level() <= Level::INFO {
            let mut message = MessageOnly(String::new());
            event.record(&mut message);
            if *metadata.level() == Level::INFO {
                custom_writer.write_str(&message.0)?;
            } else {
                custom_writer.write_str(&style(&message.0).yellow().to_string())?;
            }
            custom_writer.write_char('\n')?;
        } else {
            let default_format = Format::default();
            default_format.format_event(ctx, custom_writer, event)?;
        }

        writer.write_str(&buffer)
    }
}

/// Collects the `message` field of an event, dropping the structured fields
/// like `build_id` that are only interesting to machine readers.
struct MessageOnly(String);

impl tracing_core::field::Visit for MessageOnly {
    fn record_debug(&mut self, field: &tracing_core::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing_core::Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }
}

/// Constructs a default [`EnvFilter`] that is used when the user did not specify a custom RUST_LOG.
pub fn get_default_env_filter(verbose: LevelFilter) -> EnvFilter {
    let level = level_name(verbose);
    let mut result = EnvFilter::new("warn");
    for target in ["bat_runner", "bat_runner_script"] {
        if let Ok(directive) = Directive::from_str(&format!("{target}={level}")) {
            result = result.add_directive(directive);
        }
    }
    result
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
