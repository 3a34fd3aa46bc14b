use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const MODEL: &str = r#"{
    "instructions": [
        {
            "name": "ADD_INT",
            "parts": [
                {
                    "kind": "uop",
                    "name": "ADD_INT",
                    "inputs": [{ "name": "left" }, { "name": "right" }],
                    "outputs": [{ "name": "result" }],
                    "body": { "file": "bytecodes.c", "line": 3, "text": "{\n    result = left + right;\n}" }
                }
            ]
        },
        {
            "name": "NOP",
            "parts": [{ "kind": "uop", "name": "NOP", "body": { "text": "{\n}" } }]
        }
    ]
}"#;

const BROKEN: &str = r#"{
    "instructions": [
        {
            "name": "BROKEN",
            "entry_depth": 0,
            "parts": [
                {
                    "kind": "uop",
                    "name": "BROKEN",
                    "inputs": [{ "name": "value" }],
                    "body": { "file": "bytecodes.c", "line": 9, "text": "{\n    use(value);\n}" }
                }
            ]
        }
    ]
}"#;

fn casegen(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("casegen").expect("binary");
    cmd.current_dir(dir).env_remove("CASEGEN_LOG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_generates_output_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("model.json"), MODEL).expect("write model");

    casegen(dir.path())
        .args(["model.json", "-o", "gen/cases.c.h"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote 2 instructions"));

    let text = std::fs::read_to_string(dir.path().join("gen/cases.c.h")).expect("output");
    assert!(text.starts_with("// This file is generated by casegen-core\n"));
    let add = text.find("TARGET(ADD_INT)").expect("ADD_INT block");
    let nop = text.find("TARGET(NOP)").expect("NOP block");
    assert!(add < nop);
    assert!(text.ends_with("#undef TIER_ONE\n"));
}

#[test]
fn test_line_directives_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("model.json"), MODEL).expect("write model");

    casegen(dir.path())
        .args(["model.json", "-o", "cases.c.h", "--emit-line-directives"])
        .assert()
        .success();

    let text = std::fs::read_to_string(dir.path().join("cases.c.h")).expect("output");
    assert!(text.contains("#line 4 \"bytecodes.c\""), "{text}");
}

#[test]
fn test_parallel_output_matches_serial() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("model.json"), MODEL).expect("write model");

    casegen(dir.path()).args(["model.json", "-o", "serial.c.h"]).assert().success();
    casegen(dir.path())
        .args(["model.json", "-o", "parallel.c.h", "-j", "4"])
        .assert()
        .success();

    let serial = std::fs::read(dir.path().join("serial.c.h")).expect("serial");
    let parallel = std::fs::read(dir.path().join("parallel.c.h")).expect("parallel");
    assert_eq!(serial, parallel);
}

#[test]
fn test_analysis_error_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("broken.json"), BROKEN).expect("write model");

    casegen(dir.path())
        .args(["broken.json", "-o", "cases.c.h"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Error: Stack underflow popping 'value' in BROKEN at bytecodes.c:9",
        ));
    assert!(!dir.path().join("cases.c.h").exists());
}

#[test]
fn test_missing_input_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    casegen(dir.path())
        .args(["nowhere.json", "-o", "cases.c.h"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_config_file_supplies_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("model.json"), MODEL).expect("write model");
    std::fs::write(
        dir.path().join("casegen.toml"),
        "input_paths = [\"model.json\"]\noutput_path = \"from_config.c.h\"\n",
    )
    .expect("write config");

    casegen(dir.path()).args(["--config", "casegen.toml"]).assert().success();
    assert!(dir.path().join("from_config.c.h").exists());
}
