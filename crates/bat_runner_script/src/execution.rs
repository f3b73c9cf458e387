//! Running a composed command line and capturing its output.

use std::{io, path::PathBuf, process::Stdio};

use encoding_rs::Encoding;
use futures::StreamExt;
use tokio_util::{
    bytes::BytesMut,
    codec::{Decoder, FramedRead},
};

/// Options forwarded to a [`CommandExecutor`].
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// The working directory of the process
    pub cwd: PathBuf,
    /// Prepended to every logged output line
    pub prefix: String,
    /// Whether output lines are forwarded to the logger
    pub print_to_logger: bool,
    /// The build the command belongs to
    pub build_id: String,
    /// The step the command belongs to
    pub step_id: Option<String>,
    /// The encoding used to decode the process output
    pub encoding: &'static Encoding,
}

/// Error raised while executing a command.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The process could not be started
    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Waiting for the process failed
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// The process exited unsuccessfully
    #[error("`{command}` failed with exit code {}", display_code(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

/// Something that can run a command line to completion.
pub trait CommandExecutor {
    /// Run `command` (program followed by its arguments) and return the
    /// captured output lines joined by `\n`.
    ///
    /// Dropping the returned future before it completes must stop the
    /// command.
    fn execute(
        &self,
        command: &[String],
        options: &ExecuteOptions,
    ) -> impl Future<Output = Result<String, ExecutionError>> + Send;
}

/// Spawns the command as a child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        command: &[String],
        options: &ExecuteOptions,
    ) -> Result<String, ExecutionError> {
        run_command(command, options).await
    }
}

/// Output lines longer than this are split into several lines.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Spawn a process, log its output line by line and collect it.
///
/// The process is killed if the returned future is dropped before it
/// completes.
pub async fn run_command(
    command: &[String],
    options: &ExecuteOptions,
) -> Result<String, ExecutionError> {
    let command_line = command.join(" ");
    let (program, args) = command.split_first().ok_or_else(|| ExecutionError::Spawn {
        command: command_line.clone(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
    })?;

    tracing::debug!("Running `{}` in {}", command_line, options.cwd.display());

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .current_dir(&options.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("failed to capture stderr"))?;

    let mut stdout_lines =
        FramedRead::new(stdout, LineDecoder::new_with_max_length(MAX_LINE_LENGTH));
    let mut stderr_lines =
        FramedRead::new(stderr, LineDecoder::new_with_max_length(MAX_LINE_LENGTH));

    let mut output = Vec::new();
    let mut closed = (false, false);

    loop {
        let (line, is_stderr) = tokio::select! {
            line = stdout_lines.next(), if !closed.0 => (line, false),
            line = stderr_lines.next(), if !closed.1 => (line, true),
            else => break,
        };

        match line {
            Some(Ok(bytes)) => {
                let (line, _) = options.encoding.decode_without_bom_handling(&bytes);
                let line = line.into_owned();
                if options.print_to_logger {
                    log_line(options, &line, is_stderr);
                }
                output.push(line);
            }
            Some(Err(e)) => {
                tracing::warn!("Error reading output: {:?}", e);
                break;
            }
            None if is_stderr => closed.1 = true,
            None => closed.0 = true,
        }
    }

    let status = child.wait().await?;
    let output = output.join("\n");

    if !status.success() {
        return Err(ExecutionError::Failed {
            command: command_line,
            code: status.code(),
            output,
        });
    }

    Ok(output)
}

fn log_line(options: &ExecuteOptions, line: &str, is_stderr: bool) {
    let build_id = options.build_id.as_str();
    let step_id = options.step_id.as_deref().unwrap_or_default();
    if is_stderr {
        tracing::warn!(build_id, step_id, "{}{}", options.prefix, line);
    } else {
        tracing::info!(build_id, step_id, "{}{}", options.prefix, line);
    }
}

/// Splits a byte stream into lines. `\n`, `\r\n` and a lone `\r` all end a
/// line, the terminators are not part of the yielded lines.
#[derive(Debug)]
pub struct LineDecoder {
    last_was_cr: bool,
    // Bytes before this index were already searched for a terminator.
    next_index: usize,
    max_length: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new_with_max_length(usize::MAX)
    }
}

impl LineDecoder {
    /// A decoder that yields at most `max_length` bytes per line. Longer lines
    /// are split, so the buffered data stays bounded.
    pub fn new_with_max_length(max_length: usize) -> Self {
        Self {
            last_was_cr: false,
            next_index: 0,
            max_length: max_length.max(1),
        }
    }

    /// The maximum length of a yielded line.
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Decoder for LineDecoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.last_was_cr && src.first() == Some(&b'\n') {
            let _ = src.split_to(1);
            self.last_was_cr = false;
        }

        let start = self.next_index.min(src.len());
        let end = src.len().min(self.max_length.saturating_add(1));
        let terminator = src[start..end.max(start)]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r');

        match terminator {
            Some(offset) => {
                self.next_index = 0;
                let line = src.split_to(start + offset);
                let terminator = src.split_to(1);
                self.last_was_cr = terminator[0] == b'\r';
                if self.last_was_cr && src.first() == Some(&b'\n') {
                    let _ = src.split_to(1);
                    self.last_was_cr = false;
                }
                Ok(Some(line))
            }
            None if src.len() > self.max_length => {
                self.next_index = 0;
                self.last_was_cr = false;
                Ok(Some(src.split_to(self.max_length)))
            }
            None => {
                self.next_index = src.len();
                if !src.is_empty() {
                    self.last_was_cr = false;
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                self.next_index = 0;
                Ok(Some(src.split_off(0)))
            }
        }
    }
}
