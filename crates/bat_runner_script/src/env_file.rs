//! Files that generated scripts append exported variables to.
//!
//! Both files hold one `name=value` pair per line. They are written by the
//! `:setEnv` and `:setGateValue` subroutines of the script (through `echo`),
//! and read back by the host once the script has finished.

use std::{
    io,
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use indexmap::IndexMap;

/// Suffix of the file holding exported build variables.
pub const RESULT_FILE_SUFFIX: &str = "result.log";

/// Name of the file holding exported quality gate values.
pub const QUALITY_GATE_FILE: &str = "gatewayValueFile.ini";

/// File name of the exported variables file for the given build.
pub fn env_file_name(build_id: &str) -> String {
    format!("{build_id}-{RESULT_FILE_SUFFIX}")
}

/// Absolute path of the exported variables file for the given build.
pub fn env_file_path(output_dir: &Path, build_id: &str) -> PathBuf {
    absolute(&output_dir.join(env_file_name(build_id)))
}

/// Absolute path of the quality gate values file.
pub fn gate_value_file_path(output_dir: &Path) -> PathBuf {
    absolute(&output_dir.join(QUALITY_GATE_FILE))
}

/// Read the variables a script exported with `call :setEnv`.
pub fn read_exported_variables(
    output_dir: &Path,
    build_id: &str,
    encoding: &'static Encoding,
) -> io::Result<IndexMap<String, String>> {
    read_env_file(&output_dir.join(env_file_name(build_id)), encoding)
}

/// Read the values a script exported with `call :setGateValue`.
pub fn read_gate_values(
    output_dir: &Path,
    encoding: &'static Encoding,
) -> io::Result<IndexMap<String, String>> {
    read_env_file(&output_dir.join(QUALITY_GATE_FILE), encoding)
}

/// Remove the exported variables file of a build so that a following step
/// does not pick up stale values.
pub fn clean_exported_variables(output_dir: &Path, build_id: &str) -> io::Result<()> {
    remove_if_exists(&output_dir.join(env_file_name(build_id)))
}

/// Remove the quality gate values file. Its name is shared by all builds
/// writing to `output_dir`, so values of earlier runs would be reported again.
pub fn clean_gate_values(output_dir: &Path) -> io::Result<()> {
    remove_if_exists(&output_dir.join(QUALITY_GATE_FILE))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs_err::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn read_env_file(path: &Path, encoding: &'static Encoding) -> io::Result<IndexMap<String, String>> {
    if path.is_dir() {
        return Ok(IndexMap::new());
    }
    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(IndexMap::new()),
        Err(e) => return Err(e),
    };
    let (contents, _) = encoding.decode_with_bom_removal(&bytes);
    Ok(parse_env_lines(&contents))
}

/// Parse `name=value` lines. Lines without `=` are skipped, names and values
/// are trimmed and a later assignment overrides an earlier one.
pub fn parse_env_lines(contents: &str) -> IndexMap<String, String> {
    contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_file_is_keyed_by_build_id() {
        assert_eq!(env_file_name("b-123"), "b-123-result.log");
    }

    #[test]
    fn parse_skips_malformed_lines_and_trims() {
        let parsed = parse_env_lines("A=1 \r\nnot a pair\r\nB = two words \r\nC=x=y\r\nA=3\r\n");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["A"], "3");
        assert_eq!(parsed["B"], "two words");
        assert_eq!(parsed["C"], "x=y");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let vars = read_exported_variables(tmp.path(), "nope", encoding_rs::UTF_8).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn directory_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs_err::create_dir(tmp.path().join(QUALITY_GATE_FILE)).unwrap();
        let values = read_gate_values(tmp.path(), encoding_rs::UTF_8).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn reads_gbk_encoded_values() {
        let tmp = tempfile::tempdir().unwrap();
        let (bytes, _, _) = encoding_rs::GBK.encode("GREETING=你好 \r\n");
        fs_err::write(tmp.path().join(env_file_name("42")), &bytes).unwrap();

        let vars = read_exported_variables(tmp.path(), "42", encoding_rs::GBK).unwrap();
        assert_eq!(vars["GREETING"], "你好");
    }

    #[test]
    fn clean_removes_file_and_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(env_file_name("7"));
        fs_err::write(&path, "A=1\r\n").unwrap();

        clean_exported_variables(tmp.path(), "7").unwrap();
        assert!(!path.exists());
        clean_exported_variables(tmp.path(), "7").unwrap();
    }

    #[test]
    fn clean_gate_values_drops_earlier_values() {
        let tmp = tempfile::tempdir().unwrap();
        fs_err::write(tmp.path().join(QUALITY_GATE_FILE), "SCORE=10\r\n").unwrap();
        fs_err::write(tmp.path().join(env_file_name("7")), "A=1\r\n").unwrap();

        clean_gate_values(tmp.path()).unwrap();
        let values = read_gate_values(tmp.path(), encoding_rs::UTF_8).unwrap();
        assert!(values.is_empty());
        assert!(tmp.path().join(env_file_name("7")).exists());
        clean_gate_values(tmp.path()).unwrap();
    }
}
