/// Integration test suite: drives the compiled `code-flow` binary against a small layered
/// project built in a temp dir from the fixtures in `tests/fixtures/`.
///
/// The `CARGO_BIN_EXE_code-flow` environment variable is set by Cargo during `cargo test`
/// to point to the compiled binary for the current profile.
use std::path::{Path, PathBuf};
use std::process::Command;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_code-flow"))
}

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

const SOURCES: &[&str] = &[
    "src/Web/Create.cs",
    "src/UseCases/CreateContributorCommand.cs",
    "src/UseCases/CreateContributorHandler.cs",
    "src/Core/IRepository.cs",
    "src/Core/Contributor.cs",
    "src/Infrastructure/EfRepository.cs",
];

/// Temp project: one source file per fixture unit and the descriptor stream at its
/// default location.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (i, rel) in SOURCES.iter().enumerate() {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("// source {i}\n")).unwrap();
    }
    std::fs::copy(
        fixtures().join("descriptors.jsonl"),
        dir.path().join("descriptors.jsonl"),
    )
    .unwrap();
    dir
}

fn fixture(name: &str) -> String {
    fixtures().join(name).to_string_lossy().into_owned()
}

fn path_arg(dir: &Path) -> &str {
    dir.to_str().unwrap()
}

/// Run a code-flow command and assert it exits successfully.
/// Returns stdout as a String.
fn run_success(args: &[&str]) -> String {
    let out = Command::new(binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke code-flow binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        out.status.success(),
        "command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
        args,
        out.status,
        stdout,
        stderr
    );
    stdout
}

/// Run a code-flow command and assert it exits with a non-zero status.
/// Returns (stdout, stderr) as Strings.
fn run_failure(args: &[&str]) -> (String, String) {
    let out = Command::new(binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke code-flow binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        !out.status.success(),
        "command {:?} expected to fail but exited successfully\nstdout: {}\nstderr: {}",
        args,
        stdout,
        stderr
    );
    (stdout, stderr)
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("output is not valid JSON: {e}\n{stdout}"))
}

// ---------------------------------------------------------------------------
// scan / update / refresh
// ---------------------------------------------------------------------------

#[test]
fn test_scan_summary() {
    let dir = project();
    let stdout = run_success(&["scan", path_arg(dir.path())]);
    assert!(stdout.contains("Scanned 6 files"), "stdout: {stdout}");
    assert!(stdout.contains("1 flows"), "stdout: {stdout}");
    assert!(dir.path().join(".code-flow/state.bin").exists());
}

#[test]
fn test_scan_json_reports_malformed_unit() {
    let dir = project();
    let parsed = parse_json(&run_success(&["scan", path_arg(dir.path()), "--format", "json"]));
    assert_eq!(parsed["files"], 6);
    assert_eq!(parsed["classes"], 6);
    assert_eq!(parsed["flows"], 1);
    let diagnostics = parsed["diagnostics"].as_array().unwrap();
    assert!(
        diagnostics
            .iter()
            .any(|d| d["kind"] == "malformed_descriptor" && d["subject"] == "src/Broken.cs")
    );
}

#[test]
fn test_update_without_state_falls_back_to_scan() {
    let dir = project();
    let parsed = parse_json(&run_success(&["update", path_arg(dir.path()), "--format", "json"]));
    assert_eq!(parsed["status"], "full_scan");
    assert_eq!(parsed["files"], 6);
}

#[test]
fn test_update_after_scan_is_up_to_date() {
    let dir = project();
    run_success(&["scan", path_arg(dir.path())]);
    let stdout = run_success(&["update", path_arg(dir.path())]);
    assert!(stdout.contains("No changes detected"), "stdout: {stdout}");
}

#[test]
fn test_update_reports_impact_of_edit() {
    let dir = project();
    let tests = fixture("tests.json");
    run_success(&["scan", path_arg(dir.path())]);
    std::fs::write(dir.path().join("src/Core/IRepository.cs"), "// edited\n").unwrap();

    let parsed = parse_json(&run_success(&[
        "update",
        path_arg(dir.path()),
        "--tests",
        &tests,
        "--format",
        "json",
    ]));
    assert_eq!(parsed["status"], "updated");
    assert_eq!(parsed["changes"]["modified"][0], "src/Core/IRepository.cs");
    let impact = &parsed["impact"];
    assert_eq!(impact["changed_keys"][0], "Core.IRepository");
    assert_eq!(impact["flows"][0]["name"], "Create Contributor");
    assert_eq!(impact["tests"][0]["name"], "CreateContributorHandlerTests");
    assert_eq!(impact["risk"], "medium");

    let stdout = run_success(&["update", path_arg(dir.path())]);
    assert!(stdout.contains("No changes detected"), "stdout: {stdout}");
}

#[test]
fn test_refresh_rebuilds_corrupt_state() {
    let dir = project();
    std::fs::create_dir_all(dir.path().join(".code-flow")).unwrap();
    std::fs::write(dir.path().join(".code-flow/state.bin"), b"not a state file").unwrap();
    let stdout = run_success(&["refresh", path_arg(dir.path())]);
    assert!(stdout.contains("Scanned 6 files"), "stdout: {stdout}");
    let stdout = run_success(&["update", path_arg(dir.path())]);
    assert!(stdout.contains("No changes detected"), "stdout: {stdout}");
}

// ---------------------------------------------------------------------------
// impact
// ---------------------------------------------------------------------------

#[test]
fn test_impact_compact() {
    let dir = project();
    let stdout = run_success(&[
        "impact",
        path_arg(dir.path()),
        "--files",
        "src/Core/IRepository.cs",
    ]);
    assert!(
        stdout.contains("class direct UseCases.CreateContributorHandler"),
        "stdout: {stdout}"
    );
    assert!(stdout.contains("flow direct Create Contributor"), "stdout: {stdout}");
    assert!(stdout.contains("endpoint POST /api/Contributors"), "stdout: {stdout}");
    assert!(stdout.contains("risk medium"), "stdout: {stdout}");
}

#[test]
fn test_impact_json_with_tests() {
    let dir = project();
    let tests = fixture("tests.json");
    let parsed = parse_json(&run_success(&[
        "impact",
        path_arg(dir.path()),
        "--files",
        "src/Core/Contributor.cs",
        "--tests",
        &tests,
        "--format",
        "json",
    ]));
    assert_eq!(parsed["changed_keys"][0], "Core.Contributor");
    let tests: Vec<&str> = parsed["tests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(tests.contains(&"ContributorTests"), "tests: {tests:?}");
    assert_eq!(parsed["flows"][0]["name"], "Create Contributor");
    assert_eq!(parsed["endpoints"][0], "POST /api/Contributors");
}

#[test]
fn test_impact_table() {
    let dir = project();
    let stdout = run_success(&[
        "impact",
        path_arg(dir.path()),
        "--files",
        "src/Core/IRepository.cs",
        "--format",
        "table",
    ]);
    assert!(stdout.contains("Changed: Core.IRepository"), "stdout: {stdout}");
    assert!(stdout.contains("Risk: medium"), "stdout: {stdout}");
}

#[test]
fn test_impact_requires_files() {
    let dir = project();
    let (_stdout, stderr) = run_failure(&["impact", path_arg(dir.path())]);
    assert!(stderr.contains("--files"), "stderr: {stderr}");
}

// ---------------------------------------------------------------------------
// flows / export / stats
// ---------------------------------------------------------------------------

#[test]
fn test_flows_json() {
    let dir = project();
    let raises = fixture("raises.json");
    let parsed = parse_json(&run_success(&[
        "flows",
        path_arg(dir.path()),
        "--raises",
        &raises,
        "--format",
        "json",
    ]));
    let flows = parsed.as_array().unwrap();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0]["name"], "Create Contributor");
    assert_eq!(flows[0]["entry"], "POST /api/Contributors");
    assert_eq!(flows[0]["side_effects"][0], "ContributorCreatedEvent");
    assert_eq!(flows[0]["steps"][0]["key"], "Web.Create");
}

#[test]
fn test_flows_table() {
    let dir = project();
    let stdout = run_success(&["flows", path_arg(dir.path()), "--format", "table"]);
    assert!(stdout.contains("Create Contributor (POST /api/Contributors)"), "stdout: {stdout}");
    assert!(stdout.contains("entity: Contributor"), "stdout: {stdout}");
}

#[test]
fn test_export_dot_to_stdout() {
    let dir = project();
    let stdout = run_success(&["export", path_arg(dir.path()), "--format", "dot"]);
    assert!(stdout.starts_with("digraph code_flow {"), "stdout: {stdout}");
    assert!(stdout.contains("UseCases_CreateContributorHandler -> Core_IRepository"));
}

#[test]
fn test_export_json_to_file() {
    let dir = project();
    let out = dir.path().join("out/graph.json");
    run_success(&[
        "export",
        path_arg(dir.path()),
        "--key",
        "Core.IRepository",
        "-o",
        out.to_str().unwrap(),
    ]);
    let parsed = parse_json(&std::fs::read_to_string(&out).unwrap());
    let keys: Vec<&str> = parsed["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["key"].as_str().unwrap())
        .collect();
    assert_eq!(
        keys,
        vec![
            "Core.IRepository",
            "Infrastructure.EfRepository",
            "UseCases.CreateContributorHandler"
        ]
    );
}

#[test]
fn test_stats_json() {
    let dir = project();
    let parsed = parse_json(&run_success(&["stats", path_arg(dir.path()), "--format", "json"]));
    assert_eq!(parsed["class_count"], 6);
    assert_eq!(parsed["projects"], 4);
    assert_eq!(parsed["flows"], 1);
    assert_eq!(parsed["by_role"]["handler"], 1);
    assert!(parsed["cycles"].as_array().unwrap().is_empty());
}

#[test]
fn test_missing_descriptor_stream_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_stdout, stderr) = run_failure(&["flows", path_arg(dir.path())]);
    assert!(stderr.contains("failed to read descriptor stream"), "stderr: {stderr}");
}

#[test]
fn test_config_excludes_files() {
    let dir = project();
    std::fs::write(
        dir.path().join("code-flow.toml"),
        "exclude = [\"src/Infrastructure/**\"]\n",
    )
    .unwrap();
    let parsed = parse_json(&run_success(&["scan", path_arg(dir.path()), "--format", "json"]));
    assert_eq!(parsed["files"], 5);
}
