//! Batch script generation and execution for CI build steps.
//!
//! A build step's script body is wrapped into a `cmd.exe` batch file that
//! declares the step's runtime variables and provides two subroutines,
//! `:setEnv` and `:setGateValue`, through which the script exports values
//! back to the agent. The file is then run with `cmd.exe /C`.

pub mod encoding;
pub mod env_file;
pub mod env_filter;
mod script_file;
pub mod template;

pub use encoding::ScriptEncoding;
pub use script_file::{
    BuildScriptError, GeneratedScriptFile, SCRIPT_FILE_PREFIX, ScriptRequest, build_script_file,
    render_script,
};

#[cfg(feature = "execution")]
mod execution;
#[cfg(feature = "execution")]
mod runner;

#[cfg(feature = "execution")]
pub use execution::{
    CommandExecutor, ExecuteOptions, ExecutionError, LineDecoder, ProcessExecutor, run_command,
};
#[cfg(feature = "execution")]
pub use runner::{BatScriptRunner, DEFAULT_ERROR_MESSAGE, RunOptions, ScriptError, cmd_exe_command};
