use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn strata() -> assert_cmd::Command {
    cargo_bin_cmd!("strata")
}

/// A service directory whose install step runs locally without a registry.
fn init_service(dir: &Path, install_command: &str) {
    std::fs::write(dir.join("requirements.txt"), "flask==3.0\n").unwrap();
    std::fs::write(dir.join("main.py"), "app = object()\n").unwrap();
    std::fs::write(
        dir.join("strata.toml"),
        format!("[build]\npull = false\ninstall_command = {install_command:?}\n"),
    )
    .unwrap();
}

// ── Help / Version ──

#[test]
fn shows_help() {
    strata()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cache-layered service images"));
}

#[test]
fn shows_version() {
    strata()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strata"));
}

// ── Init Command ──

#[test]
fn init_creates_config_and_dockerignore() {
    let tmp = TempDir::new().unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created strata.toml"));

    let config = std::fs::read_to_string(tmp.path().join("strata.toml")).unwrap();
    assert!(config.contains("[launch]"));
    let ignore = std::fs::read_to_string(tmp.path().join(".dockerignore")).unwrap();
    assert!(ignore.contains(".strata/"));
}

#[test]
fn init_skips_existing_config() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("strata.toml"), "[image]\ntag = \"api\"\n").unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    let config = std::fs::read_to_string(tmp.path().join("strata.toml")).unwrap();
    assert_eq!(config, "[image]\ntag = \"api\"\n");
}

// ── Dockerfile / Eject ──

#[test]
fn dockerfile_prints_cache_friendly_order() {
    let tmp = TempDir::new().unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("dockerfile")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "COPY requirements.txt .\nRUN pip install --no-cache-dir -r requirements.txt\nCOPY . .\nEXPOSE 8001",
        ))
        .stdout(predicate::str::contains(
            r#"CMD ["uvicorn", "main:app", "--host", "0.0.0.0", "--port", "8001"]"#,
        ));
}

#[test]
fn eject_writes_dockerfile_once() {
    let tmp = TempDir::new().unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ejected"));
    assert!(tmp.path().join(".strata/Dockerfile").exists());

    strata()
        .current_dir(tmp.path())
        .arg("eject")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already ejected"));
}

#[test]
fn ejected_dockerfile_drives_the_plan() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "true");
    std::fs::create_dir_all(tmp.path().join(".strata")).unwrap();
    std::fs::write(
        tmp.path().join(".strata/Dockerfile"),
        "FROM python:3.12-slim\nWORKDIR /srv\nCOPY requirements.txt .\nRUN true\nCOPY . .\nEXPOSE 9000\nCMD [\"uvicorn\", \"main:app\", \"--host\", \"0.0.0.0\", \"--port\", \"9000\"]\n",
    )
    .unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("FROM python:3.12-slim"))
        .stdout(predicate::str::contains("--port 9000"));
}

#[test]
fn plan_rejects_source_copy_before_install() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "true");
    std::fs::create_dir_all(tmp.path().join(".strata")).unwrap();
    std::fs::write(
        tmp.path().join(".strata/Dockerfile"),
        "FROM python:3.11-slim\nWORKDIR /app\nCOPY . .\nRUN pip install -r requirements.txt\nEXPOSE 8001\nCMD [\"uvicorn\", \"main:app\", \"--host\", \"0.0.0.0\", \"--port\", \"8001\"]\n",
    )
    .unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("plan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("precedes RUN"));
}

#[test]
fn port_mismatch_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("strata.toml"),
        "[build]\nexpose_port = 8000\n\n[launch]\nport = 8001\n",
    )
    .unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("dockerfile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not match launch port"));
}

// ── Plan / Build / Launch ──

#[test]
fn plan_reports_uncached_layers() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "true");

    strata()
        .current_dir(tmp.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("0/5 layers cached"));
}

#[cfg(unix)]
#[test]
fn rebuild_reuses_every_layer() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "echo installed > .deps");

    strata()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("0/5 layers cached"));

    strata()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("5/5 layers cached"));
}

#[cfg(unix)]
#[test]
fn source_edit_keeps_install_layer() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "echo installed > .deps");
    strata().current_dir(tmp.path()).arg("build").assert().success();

    std::fs::write(tmp.path().join("main.py"), "app = 'v2'\n").unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("3/5 layers cached"));
}

#[cfg(unix)]
#[test]
fn failing_install_exit_code_passes_through() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "exit 7");

    strata()
        .current_dir(tmp.path())
        .arg("build")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("exit 7"));

    assert!(!tmp.path().join(".strata/images/app.json").exists());
}

#[cfg(unix)]
#[test]
fn launch_dry_run_prints_command_line() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "true");
    strata()
        .current_dir(tmp.path())
        .args(["build", "--tag", "web"])
        .assert()
        .success();

    strata()
        .current_dir(tmp.path())
        .args(["launch", "--tag", "web", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "uvicorn main:app --host 0.0.0.0 --port 8001",
        ));
}

#[cfg(unix)]
#[test]
fn inspect_prints_manifest() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "true");
    strata().current_dir(tmp.path()).arg("build").assert().success();

    strata()
        .current_dir(tmp.path())
        .arg("inspect")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"exposed_port\": 8001"))
        .stdout(predicate::str::contains("\"tag\": \"app\""));
}

#[test]
fn launch_without_image_fails() {
    let tmp = TempDir::new().unwrap();

    strata()
        .current_dir(tmp.path())
        .args(["launch", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("strata build"));
}

#[cfg(unix)]
#[test]
fn clean_removes_cached_layers() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "true");
    strata().current_dir(tmp.path()).arg("build").assert().success();

    strata()
        .current_dir(tmp.path())
        .args(["clean", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));

    strata()
        .current_dir(tmp.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("0/5 layers cached"));
}

#[cfg(unix)]
#[test]
fn install_writes_stay_in_the_layer() {
    let tmp = TempDir::new().unwrap();
    init_service(tmp.path(), "echo installed > .deps");
    strata().current_dir(tmp.path()).arg("build").assert().success();

    assert!(!tmp.path().join(".deps").exists());
    let layered = std::fs::read_dir(tmp.path().join(".strata/layers"))
        .unwrap()
        .any(|entry| entry.unwrap().path().join("rootfs/app/.deps").is_file());
    assert!(layered);
}

#[cfg(unix)]
#[test]
fn launch_starts_in_image_workdir() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("requirements.txt"), "").unwrap();
    std::fs::write(tmp.path().join("serve.sh"), "pwd > launched-from\n").unwrap();
    std::fs::write(
        tmp.path().join("strata.toml"),
        "[build]\npull = false\ninstall_command = \"true\"\n\n\
         [launch]\nserver_tool = \"sh\"\nentrypoint = \"serve.sh\"\n",
    )
    .unwrap();
    strata().current_dir(tmp.path()).arg("build").assert().success();

    // `sh serve.sh --host 0.0.0.0 --port 8001` resolves the script from the workdir.
    strata().current_dir(tmp.path()).arg("launch").assert().success();

    assert!(!tmp.path().join("launched-from").exists());
    let launched = std::fs::read_dir(tmp.path().join(".strata/layers"))
        .unwrap()
        .any(|entry| entry.unwrap().path().join("rootfs/app/launched-from").is_file());
    assert!(launched);
}

#[test]
fn cache_dir_at_context_root_is_rejected() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("strata.toml"), "[build]\ncache_dir = \"./\"\n").unwrap();

    strata()
        .current_dir(tmp.path())
        .arg("plan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is the build context itself"));
}
