use bat_runner_script::{
    ScriptEncoding, ScriptRequest, build_script_file,
    env_file::{env_file_name, read_exported_variables},
};
use indexmap::IndexMap;

fn request(dir: &std::path::Path, vars: &[(&str, &str)]) -> ScriptRequest {
    let mut request = ScriptRequest::new("echo hi", "build-1", dir);
    request.temp_dir = Some(dir.to_path_buf());
    request.encoding = ScriptEncoding::Utf8;
    request.runtime_variables = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<IndexMap<_, _>>();
    request
}

fn generate(request: &ScriptRequest) -> String {
    let file = build_script_file(request).unwrap();
    fs_err::read_to_string(file.path()).unwrap()
}

#[test]
fn test_context_variables_are_not_declared() {
    let tmp = tempfile::tempdir().unwrap();
    let script = generate(&request(
        tmp.path(),
        &[("BUILD_NO", "5"), ("variables.secret", "x")],
    ));

    assert!(script.contains("set BUILD_NO=\"5\"\r\nset BUILD_NO=%BUILD_NO:~1,-1%\r\n"));
    assert!(!script.contains("variables.secret"));
    assert!(script.contains("\r\necho hi\r\nexit\r\n"));
}

#[test]
fn test_embedded_quote_is_escaped() {
    let tmp = tempfile::tempdir().unwrap();
    let script = generate(&request(tmp.path(), &[("QUOTED", "a\"b")]));

    let assignment = script
        .lines()
        .find(|line| line.starts_with("set QUOTED=\""))
        .unwrap();
    assert_eq!(assignment, "set QUOTED=\"a\\\"b\"");
}

#[test]
fn test_each_variable_takes_two_lines() {
    let tmp = tempfile::tempdir().unwrap();
    let script = generate(&request(
        tmp.path(),
        &[("A", "1"), ("B", "x & y"), ("C", "<p>"), ("D", "a|b")],
    ));

    for name in ["A", "B", "C", "D"] {
        assert_eq!(script.matches(&format!("set {name}=")).count(), 2);
    }
    assert!(script.contains("set B=\"x ^& y\"\r\n"));
    assert!(script.contains("set C=\"^<p^>\"\r\n"));
    assert!(script.contains("set D=\"a^|b\"\r\n"));
}

#[test]
fn test_subroutines_point_at_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let script = generate(&request(tmp.path(), &[]));

    let result_file = std::path::absolute(tmp.path().join(env_file_name("build-1"))).unwrap();
    assert!(script.contains(&format!(
        "    set file_save_dir=\"{}\"\r\n",
        result_file.display()
    )));
    assert!(script.contains("gatewayValueFile.ini\"\r\n"));
    assert!(!script.contains("##resultFile##"));
    assert!(!script.contains("##gateValueFile##"));
}

#[test]
fn test_exported_variables_round_trip_through_result_file() {
    let tmp = tempfile::tempdir().unwrap();
    // this is what `echo %~1=%~2 >>file` produces
    fs_err::write(
        tmp.path().join(env_file_name("build-1")),
        "RESULT=done \r\nVERSION=1.2.3 \r\n",
    )
    .unwrap();

    let vars = read_exported_variables(tmp.path(), "build-1", encoding_rs::UTF_8).unwrap();
    assert_eq!(
        vars.into_iter().collect::<Vec<_>>(),
        vec![
            ("RESULT".to_string(), "done".to_string()),
            ("VERSION".to_string(), "1.2.3".to_string()),
        ]
    );
}
