//! Fixed fragments of every generated batch script.

use std::path::Path;

/// Placeholder for the exported variables file in [`SET_ENV_SUBROUTINE`].
pub const RESULT_FILE_PLACEHOLDER: &str = "##resultFile##";

/// Placeholder for the gate values file in [`SET_GATE_VALUE_SUBROUTINE`].
pub const GATE_VALUE_FILE_PLACEHOLDER: &str = "##gateValueFile##";

/// Line terminator required by `cmd.exe`.
pub const CRLF: &str = "\r\n";

/// Callback used as `call :setEnv NAME VALUE` to export a build variable.
pub const SET_ENV_SUBROUTINE: &str = concat!(
    ":setEnv\r\n",
    "    set file_save_dir=\"##resultFile##\"\r\n",
    "    echo %~1=%~2 >>%file_save_dir%\r\n",
    "    set %~1=%~2\r\n",
    "    goto:eof\r\n",
);

/// Callback used as `call :setGateValue NAME VALUE` to export a quality gate value.
pub const SET_GATE_VALUE_SUBROUTINE: &str = concat!(
    ":setGateValue\r\n",
    "    set file_save_dir=\"##gateValueFile##\"\r\n",
    "    echo %~1=%~2 >>%file_save_dir%\r\n",
    "    set %~1=%~2\r\n",
    "    goto:eof\r\n",
);

/// The `:setEnv` subroutine writing to `result_file`.
pub fn set_env_subroutine(result_file: &Path) -> String {
    SET_ENV_SUBROUTINE.replace(RESULT_FILE_PLACEHOLDER, &result_file.to_string_lossy())
}

/// The `:setGateValue` subroutine writing to `gate_value_file`.
pub fn set_gate_value_subroutine(gate_value_file: &Path) -> String {
    SET_GATE_VALUE_SUBROUTINE.replace(
        GATE_VALUE_FILE_PLACEHOLDER,
        &gate_value_file.to_string_lossy(),
    )
}

/// The two lines assigning an already escaped value to `name`.
///
/// The value is quoted first so that embedded spaces survive the `set`, then
/// the quotes are stripped again with a substring expansion.
pub fn variable_assignment(name: &str, escaped_value: &str) -> String {
    format!("set {name}=\"{escaped_value}\"{CRLF}set {name}=%{name}:~1,-1%{CRLF}")
}

/// Convert all line endings to CRLF. Existing CRLF pairs are kept as is.
pub fn normalize_line_endings(script: &str) -> String {
    script.replace(CRLF, "\n").replace('\n', CRLF)
}
