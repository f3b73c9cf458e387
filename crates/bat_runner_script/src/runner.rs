//! Generates a batch script for a build step and runs it with `cmd.exe`.

use std::path::{Path, PathBuf};

use crate::{
    execution::{CommandExecutor, ExecuteOptions, ExecutionError, ProcessExecutor},
    script_file::{BuildScriptError, ScriptRequest, build_script_file},
};

/// Logged when a script fails and the caller did not provide a message.
pub const DEFAULT_ERROR_MESSAGE: &str = "Fail to execute bat script";

/// Presentation options for a script run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Prepended to every logged output line
    pub prefix: String,
    /// Whether the output of the script is forwarded to the logger
    pub print_to_logger: bool,
    /// The step the script belongs to
    pub step_id: Option<String>,
    /// Logged instead of [`DEFAULT_ERROR_MESSAGE`] when the script fails
    pub error_message: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            print_to_logger: true,
            step_id: None,
            error_message: None,
        }
    }
}

/// Error returned from [`BatScriptRunner::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script file could not be generated
    #[error("failed to generate the script for build {build_id}")]
    Build {
        build_id: String,
        #[source]
        source: BuildScriptError,
    },

    /// The generated script could not be run or exited unsuccessfully
    #[error("failed to execute {} for build {build_id}", script.display())]
    Execute {
        build_id: String,
        script: PathBuf,
        #[source]
        source: ExecutionError,
    },
}

impl ScriptError {
    /// The output captured before the script failed, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            ScriptError::Execute {
                source: ExecutionError::Failed { output, .. },
                ..
            } => Some(output),
            _ => None,
        }
    }
}

/// The command line running `script` with `cmd.exe`.
pub fn cmd_exe_command(script: &Path) -> Vec<String> {
    vec![
        "cmd.exe".to_string(),
        "/C".to_string(),
        script.to_string_lossy().into_owned(),
    ]
}

/// Runs build step scripts through `cmd.exe`.
#[derive(Debug, Default, Clone)]
pub struct BatScriptRunner<E = ProcessExecutor> {
    executor: E,
}

impl BatScriptRunner {
    /// A runner spawning `cmd.exe` as a child process.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: CommandExecutor> BatScriptRunner<E> {
    /// A runner delegating execution to `executor`.
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Generate the script for `request`, run it and return its output.
    ///
    /// The generated file is removed once the script has finished. Dropping
    /// the returned future stops the script before its file is removed.
    pub async fn execute(
        &self,
        request: &ScriptRequest,
        options: &RunOptions,
    ) -> Result<String, ScriptError> {
        let result = self.run(request, options).await;
        if let Err(err) = &result {
            let message = options
                .error_message
                .as_deref()
                .unwrap_or(DEFAULT_ERROR_MESSAGE);
            tracing::warn!("{}: {}", message, format_error_chain(err));
        }
        result
    }

    async fn run(
        &self,
        request: &ScriptRequest,
        options: &RunOptions,
    ) -> Result<String, ScriptError> {
        let file = build_script_file(request).map_err(|source| ScriptError::Build {
            build_id: request.build_id.clone(),
            source,
        })?;

        let script =
            dunce::canonicalize(file.path()).unwrap_or_else(|_| file.path().to_path_buf());
        let command = cmd_exe_command(&script);

        let execute_options = ExecuteOptions {
            cwd: request.output_dir.clone(),
            prefix: options.prefix.clone(),
            print_to_logger: options.print_to_logger,
            build_id: request.build_id.clone(),
            step_id: options.step_id.clone(),
            encoding: request.encoding.encoding(),
        };

        let output = self
            .executor
            .execute(&command, &execute_options)
            .await
            .map_err(|source| ScriptError::Execute {
                build_id: request.build_id.clone(),
                script,
                source,
            })?;

        drop(file);
        Ok(output)
    }
}

fn format_error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
