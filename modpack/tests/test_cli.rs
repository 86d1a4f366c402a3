// Allow deprecated APIs (assert_cmd::cargo_bin is deprecated but still works)
#![allow(deprecated)]

use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command; // Run programs
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/main.mjs",
        "import { greet } from './greet.js';\nconsole.log(greet('modpack'));\n",
    );
    write(
        dir.path(),
        "src/greet.js",
        "exports.greet = name => `hello ${name}`;\n",
    );
    dir
}

#[test]
fn test_bundle_runs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = project();
    let output = dir.path().join("dist/main.mjs");

    Command::cargo_bin("modpack")?
        .arg("-i").arg(dir.path().join("src/main.mjs"))
        .arg("-o").arg(&output)
        .assert()
        .success();

    assert!(output.exists());

    if node_available() {
        Command::new("node")
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("hello modpack"));
    }

    Ok(())
}

#[test]
fn test_dev_bundle_keys_modules_by_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = project();
    let output = dir.path().join("main.dev.mjs");

    Command::cargo_bin("modpack")?
        .arg("--input").arg(dir.path().join("src/main.mjs"))
        .arg("--output").arg(&output)
        .arg("--dev")
        .assert()
        .success();

    let greet = fs::canonicalize(dir.path().join("src/greet.js"))?;
    let code = fs::read_to_string(&output)?;
    assert!(code.contains(&greet.to_string_lossy().to_string()));
    assert!(code.contains("__load_commonjs_module_for_es("));

    Ok(())
}

#[test]
fn test_commonjs_output_for_es_entry_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = project();
    let output = dir.path().join("main.cjs");

    Command::cargo_bin("modpack")?
        .arg("-i").arg(dir.path().join("src/main.mjs"))
        .arg("-o").arg(&output)
        .arg("--commonjs")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("CommonJS bundle"));

    assert!(!output.exists());

    Ok(())
}

#[test]
fn test_missing_module_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write(dir.path(), "main.mjs", "import './missing.mjs';\n");

    Command::cargo_bin("modpack")?
        .arg("-i").arg(&input)
        .arg("-o").arg(dir.path().join("out.mjs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot resolve \"./missing.mjs\""));

    Ok(())
}

#[test]
fn test_alias_and_external() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = write(
        dir.path(),
        "main.mjs",
        "import config from 'config';\nconst lazy = () => import('left-pad');\nexport default [config, lazy];\n",
    );
    write(dir.path(), "config/prod.mjs", "export default 'prod';\n");
    let output = dir.path().join("out.mjs");

    Command::cargo_bin("modpack")?
        .current_dir(dir.path())
        .arg("-i").arg(&input)
        .arg("-o").arg(&output)
        .arg("--alias").arg("config=config/prod.mjs")
        .arg("--external").arg("left-pad")
        .arg("--minify").arg("false")
        .assert()
        .success();

    let code = fs::read_to_string(&output)?;
    assert!(code.contains("const __default_export = 'prod';"));
    assert!(code.contains("import(\"left-pad\")"));

    Ok(())
}

#[test]
fn test_invalid_alias_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = project();

    Command::cargo_bin("modpack")?
        .arg("-i").arg(dir.path().join("src/main.mjs"))
        .arg("-o").arg(dir.path().join("out.mjs"))
        .arg("--alias").arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<specifier>=<path>"));

    Ok(())
}
