//! Command-line options.

use std::{collections::HashSet, error::Error, ffi::OsString, path::PathBuf};

use bat_runner_script::{RunOptions, ScriptEncoding, ScriptRequest};
use clap::{Args, Parser, crate_version};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use indexmap::IndexMap;

/// Application subcommands.
#[derive(Parser)]
pub enum SubCommands {
    /// Run a build step script with cmd.exe
    ///
    /// The script is wrapped into a batch file that declares the given
    /// variables and provides the `:setEnv` and `:setGateValue` subroutines.
    /// After the script has finished, the exported values are printed as JSON.
    Run(RunOpts),

    /// Write the batch file for a build step script without running it
    Generate(ScriptOpts),
}

/// Runs CI build step scripts as cmd.exe batch files.
#[derive(Parser)]
#[clap(version = crate_version!())]
pub struct App {
    /// Subcommand.
    #[clap(subcommand)]
    pub subcommand: SubCommands,

    /// Verbosity
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// Options describing the script and its environment.
#[derive(Args, Debug, Clone)]
pub struct ScriptOpts {
    /// A file containing the script body
    #[arg(required_unless_present = "command", conflicts_with = "command")]
    pub script: Option<PathBuf>,

    /// The script body given inline
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Identifier of the build, names the exported variables file
    #[arg(long, env = "BUILD_ID", default_value = "local")]
    pub build_id: String,

    /// Directory exposed to the script as `WORKSPACE`
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Directory the script runs in and where exported values are written.
    /// Defaults to the work directory.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Declare a variable in the script (KEY=VALUE). Can be repeated.
    #[arg(long = "var", value_parser = parse_key_val)]
    pub variables: Vec<(String, String)>,

    /// Declare all variables of the current environment in the script
    #[arg(long)]
    pub inherit_env: bool,

    /// Never declare this variable in the script. Can be repeated.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// The encoding of the generated script and of the script output
    #[arg(long, value_enum, default_value_t = ScriptEncoding::SystemDefault)]
    pub encoding: ScriptEncoding,

    /// Directory for generated scripts, defaults to the system temp directory
    #[arg(long, env = "BAT_RUNNER_TMP_DIR")]
    pub temp_dir: Option<PathBuf>,
}

impl ScriptOpts {
    /// Read the script body and build the request.
    pub fn to_request(&self) -> std::io::Result<ScriptRequest> {
        let script = match (&self.command, &self.script) {
            (Some(command), _) => command.clone(),
            (None, Some(path)) => fs_err::read_to_string(path)?,
            (None, None) => String::new(),
        };

        let mut runtime_variables = IndexMap::new();
        if self.inherit_env {
            runtime_variables.extend(inherited_env_vars(std::env::vars_os()));
        }
        runtime_variables.extend(self.variables.iter().cloned());

        Ok(ScriptRequest {
            script,
            build_id: self.build_id.clone(),
            runtime_variables,
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| self.work_dir.clone()),
            work_dir: self.work_dir.clone(),
            excluded_names: self.exclude.iter().cloned().collect::<HashSet<_>>(),
            encoding: self.encoding,
            temp_dir: self.temp_dir.clone(),
        })
    }
}

/// Options for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub script: ScriptOpts,

    /// Prefix for every logged line of script output
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// The step the script belongs to
    #[arg(long, env = "STEP_ID")]
    pub step_id: Option<String>,

    /// Message logged when the script fails
    #[arg(long)]
    pub error_message: Option<String>,

    /// Do not forward the script output to the log
    #[arg(long)]
    pub quiet_output: bool,

    /// Keep variables and gate values exported by an earlier run
    #[arg(long)]
    pub keep_exported: bool,
}

impl RunOpts {
    /// The presentation options of the run.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            prefix: self.prefix.clone(),
            print_to_logger: !self.quiet_output,
            step_id: self.step_id.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// The variables of `vars` whose name and value are valid Unicode.
fn inherited_env_vars(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> impl Iterator<Item = (String, String)> {
    vars.into_iter().filter_map(|(name, value)| {
        match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                let name = name.unwrap_or_else(|name| name.to_string_lossy().into_owned());
                tracing::debug!("Skipping environment variable {name}, it is not valid Unicode");
                None
            }
        }
    })
}

/// Parse a single key-value pair
fn parse_key_val(s: &str) -> Result<(String, String), Box<dyn Error + Send + Sync + 'static>> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}
