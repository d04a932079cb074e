use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const PROGRAM: &str = r#"<xml xmlns="https://developers.google.com/blockly/xml">
  <block type="python_assign" x="10" y="10">
    <field name="VAR">total</field>
    <value name="VALUE"><block type="python_number"><field name="NUM">3</field></block></value>
    <next>
      <block type="python_print">
        <value name="VALUE">
          <block type="myblock_expr_double"><field name="ARGS">total</field></block>
        </value>
      </block>
    </next>
  </block>
</xml>"#;

const CUSTOM: &str = r#"[{"name": "double", "params": ["x"], "body_code": "return x * 2"}]"#;

#[test]
fn test_compiles_to_stdout() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("program.xml");
    let custom = dir.path().join("custom.json");
    fs::write(&input, PROGRAM).expect("write input");
    fs::write(&custom, CUSTOM).expect("write custom blocks");

    Command::cargo_bin("pyblocks")
        .expect("binary exists")
        .arg(&input)
        .arg("--custom-blocks")
        .arg(&custom)
        .assert()
        .success()
        .stdout("def double(x):\n  return x * 2\n\ntotal = 3\nprint(double(total))\n")
        .stderr(predicate::str::contains("[Compile] Generating Python..."));
}

#[test]
fn test_writes_output_and_bundle() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("program.xml");
    let custom = dir.path().join("custom.json");
    let output = dir.path().join("out").join("main.py");
    let bundle = dir.path().join("program.pyblocks");
    fs::write(&input, PROGRAM).expect("write input");
    fs::write(&custom, CUSTOM).expect("write custom blocks");

    Command::cargo_bin("pyblocks")
        .expect("binary exists")
        .arg(&input)
        .arg(&output)
        .arg("--custom-blocks")
        .arg(&custom)
        .arg("--no-prologue")
        .arg("--indent")
        .arg("4")
        .arg("--bundle")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert_eq!(
        fs::read_to_string(&output).expect("read output"),
        "total = 3\nprint(double(total))\n"
    );

    // the bundle carries its custom blocks, so no --custom-blocks here
    Command::cargo_bin("pyblocks")
        .expect("binary exists")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("def double(x):\n  return x * 2\n"));
}

#[test]
fn test_prints_categories() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("program.xml");
    let custom = dir.path().join("custom.json");
    fs::write(&input, PROGRAM).expect("write input");
    fs::write(&custom, CUSTOM).expect("write custom blocks");

    Command::cargo_bin("pyblocks")
        .expect("binary exists")
        .arg(&input)
        .arg("--custom-blocks")
        .arg(&custom)
        .arg("--categories")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Variables\""))
        .stdout(predicate::str::contains("\"myblock_call_double\""));
}

#[test]
fn test_unknown_block_is_reported() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("program.xml");
    fs::write(&input, PROGRAM).expect("write input");

    Command::cargo_bin("pyblocks")
        .expect("binary exists")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown block type 'myblock_expr_double'"));
}

#[test]
fn test_missing_input_fails() {
    Command::cargo_bin("pyblocks")
        .expect("binary exists")
        .arg("does-not-exist.xml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}
