//! Materializes a batch script for a build step into a temporary file.

use std::{
    collections::HashSet,
    io::{self, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use tempfile::TempPath;

use crate::{
    encoding::{ScriptEncoding, encode_lossy},
    env_file::{env_file_path, gate_value_file_path},
    env_filter::{escape_value, is_filtered},
    template::{
        CRLF, normalize_line_endings, set_env_subroutine, set_gate_value_subroutine,
        variable_assignment,
    },
};

/// File name prefix of generated scripts.
pub const SCRIPT_FILE_PREFIX: &str = "paas_build_script_";

/// Everything needed to generate a batch script for a build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    /// The body of the script as written by the user
    pub script: String,
    /// Identifier of the build, names the exported variables file
    pub build_id: String,
    /// Variables to declare before the body runs
    pub runtime_variables: IndexMap<String, String>,
    /// Directory exposed to the script as `WORKSPACE`
    pub work_dir: PathBuf,
    /// Directory the script runs in and where exported values are written
    pub output_dir: PathBuf,
    /// Variables the caller binds by other means and that must not be declared
    pub excluded_names: HashSet<String>,
    /// The encoding the script file is written in
    pub encoding: ScriptEncoding,
    /// Directory for the generated file, defaults to the system temp directory
    pub temp_dir: Option<PathBuf>,
}

impl ScriptRequest {
    /// A request running `script` with `work_dir` as both the workspace and
    /// the output directory.
    pub fn new(
        script: impl Into<String>,
        build_id: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let work_dir = work_dir.into();
        Self {
            script: script.into(),
            build_id: build_id.into(),
            runtime_variables: IndexMap::new(),
            output_dir: work_dir.clone(),
            work_dir,
            excluded_names: HashSet::new(),
            encoding: ScriptEncoding::default(),
            temp_dir: None,
        }
    }
}

/// Error raised while writing the script file.
#[derive(Debug, thiserror::Error)]
pub enum BuildScriptError {
    /// The temporary file could not be created
    #[error("failed to create a script file in {}", dir.display())]
    CreateTempFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The script contents could not be written
    #[error("failed to write script file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A generated script on disk. The file is removed when this is dropped,
/// unless [`GeneratedScriptFile::keep`] is called.
#[derive(Debug)]
pub struct GeneratedScriptFile {
    path: TempPath,
}

impl GeneratedScriptFile {
    /// Path of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file on disk and return its path.
    pub fn keep(self) -> io::Result<PathBuf> {
        self.path.keep().map_err(|e| e.error)
    }
}

/// Render the full script text for `request`. `script_path` is the location
/// the script is going to be written to.
pub fn render_script(request: &ScriptRequest, script_path: &Path) -> String {
    let mut script = String::new();

    script.push_str("@echo off");
    script.push_str(CRLF);
    script.push_str(&format!(
        "set WORKSPACE={}{CRLF}",
        absolute(&request.work_dir).display()
    ));
    script.push_str(&format!(
        "set DEVOPS_BUILD_SCRIPT_FILE={}{CRLF}",
        script_path.display()
    ));
    script.push_str(CRLF);

    for (name, value) in &request.runtime_variables {
        if is_filtered(name, value, &request.excluded_names) {
            tracing::trace!("Not declaring variable {name} in the script");
            continue;
        }
        script.push_str(&variable_assignment(name, &escape_value(value)));
    }

    script.push_str(&normalize_line_endings(&request.script));
    script.push_str(CRLF);
    script.push_str("exit");
    script.push_str(CRLF);

    script.push_str(&set_env_subroutine(&env_file_path(
        &request.output_dir,
        &request.build_id,
    )));
    script.push_str(&set_gate_value_subroutine(&gate_value_file_path(
        &request.output_dir,
    )));

    script
}

/// Write the script for `request` to a new temporary file.
///
/// The file is either fully written or removed again before an error is
/// returned.
pub fn build_script_file(request: &ScriptRequest) -> Result<GeneratedScriptFile, BuildScriptError> {
    let temp_dir = request
        .temp_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);

    let mut file = tempfile::Builder::new()
        .prefix(SCRIPT_FILE_PREFIX)
        .suffix(".bat")
        .tempfile_in(&temp_dir)
        .map_err(|source| BuildScriptError::CreateTempFile {
            dir: temp_dir.clone(),
            source,
        })?;

    let script_path = absolute(file.path());
    let contents = render_script(request, &script_path);

    let encoding = request.encoding.encoding();
    tracing::info!("The script charset is {}", encoding.name());

    let (bytes, had_unmappable) = encode_lossy(encoding, &contents);
    if had_unmappable {
        tracing::warn!(
            "Some characters of the script cannot be represented in {} and were replaced",
            encoding.name()
        );
    }

    file.write_all(&bytes)
        .and_then(|_| file.flush())
        .map_err(|source| BuildScriptError::Write {
            path: script_path.clone(),
            source,
        })?;

    tracing::debug!(
        "Created script file {} ({} bytes)",
        script_path.display(),
        bytes.len()
    );

    Ok(GeneratedScriptFile {
        path: file.into_temp_path(),
    })
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
