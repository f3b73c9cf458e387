//! This is the main entry point for the `bat-runner` binary.

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bat_runner_script::{
    BatScriptRunner, build_script_file,
    env_file::{
        clean_exported_variables, clean_gate_values, read_exported_variables, read_gate_values,
    },
};

mod console_utils;
mod opt;

use crate::{
    console_utils::{TracingFormatter, get_default_env_filter},
    opt::{App, RunOpts, ScriptOpts, SubCommands},
};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = App::parse();

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => get_default_env_filter(args.verbose.log_level_filter()),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(TracingFormatter),
        )
        .init();

    match args.subcommand {
        SubCommands::Run(args) => run_from_args(args).await,
        SubCommands::Generate(args) => generate_from_args(args),
    }
}

async fn run_from_args(args: RunOpts) -> miette::Result<()> {
    let request = args.script.to_request().into_diagnostic()?;

    if !args.keep_exported {
        clean_exported_variables(&request.output_dir, &request.build_id).into_diagnostic()?;
        clean_gate_values(&request.output_dir).into_diagnostic()?;
    }

    let runner = BatScriptRunner::new();
    runner
        .execute(&request, &args.run_options())
        .await
        .into_diagnostic()?;

    let encoding = request.encoding.encoding();
    let exported = read_exported_variables(&request.output_dir, &request.build_id, encoding)
        .into_diagnostic()?;
    let gate_values = read_gate_values(&request.output_dir, encoding).into_diagnostic()?;

    let summary = serde_json::json!({
        "variables": exported,
        "gate_values": gate_values,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).into_diagnostic()?
    );

    Ok(())
}

fn generate_from_args(args: ScriptOpts) -> miette::Result<()> {
    let request = args.to_request().into_diagnostic()?;
    let path = build_script_file(&request)
        .into_diagnostic()?
        .keep()
        .into_diagnostic()?;

    tracing::info!("Build script created at {}", path.display());
    println!("{}", path.display());
    Ok(())
}
