use strata_core::StrataConfig;
use tempfile::TempDir;

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = StrataConfig::load(tmp.path()).unwrap();

    assert_eq!(config.image.tag, "app");
    assert_eq!(config.build.base_image, "python:3.11-slim");
    assert_eq!(config.build.workdir, "/app");
    assert_eq!(config.build.manifest, "requirements.txt");
    assert_eq!(
        config.build.install_command,
        "pip install --no-cache-dir -r requirements.txt"
    );
    assert!(config.build.expose_port.is_none());
    assert!(config.build.pull);
    assert_eq!(config.build.cache_dir, ".strata");
    assert_eq!(config.launch.server_tool, "uvicorn");
    assert_eq!(config.launch.entrypoint, "main:app");
    assert_eq!(config.launch.host, "0.0.0.0");
    assert_eq!(config.launch.port, 8001);
    assert_eq!(config.declared_port(), 8001);
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[image]
tag = "csv-api"

[build]
base_image = "python:3.12-slim"
workdir = "/srv"
manifest = "deps/requirements.txt"
install_command = "pip install -r deps/requirements.txt"
expose_port = 9000
pull = false
cache_dir = "build-cache"

[launch]
server_tool = "hypercorn"
entrypoint = "service:api"
host = "127.0.0.1"
port = 9000
"#;
    std::fs::write(tmp.path().join("strata.toml"), toml).unwrap();

    let config = StrataConfig::load(tmp.path()).unwrap();

    assert_eq!(config.image.tag, "csv-api");
    assert_eq!(config.build.base_image, "python:3.12-slim");
    assert_eq!(config.build.workdir, "/srv");
    assert_eq!(config.build.manifest, "deps/requirements.txt");
    assert_eq!(config.build.install_command, "pip install -r deps/requirements.txt");
    assert_eq!(config.build.expose_port, Some(9000));
    assert!(!config.build.pull);
    assert_eq!(config.cache_dir(tmp.path()), tmp.path().join("build-cache"));
    assert_eq!(config.launch.server_tool, "hypercorn");
    assert_eq!(config.launch.entrypoint, "service:api");
    assert_eq!(config.launch.host, "127.0.0.1");
    assert_eq!(config.launch.port, 9000);
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[launch]
entrypoint = "app.main:app"
"#;
    std::fs::write(tmp.path().join("strata.toml"), toml).unwrap();

    let config = StrataConfig::load(tmp.path()).unwrap();

    assert_eq!(config.launch.entrypoint, "app.main:app");
    // Defaults preserved
    assert_eq!(config.launch.port, 8001);
    assert_eq!(config.build.base_image, "python:3.11-slim");
    assert_eq!(config.image.tag, "app");
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("strata.toml"), "not valid {{{{ toml").unwrap();

    let result = StrataConfig::load(tmp.path());
    assert!(result.is_err());

    let err = result.unwrap_err().to_string();
    assert!(err.contains("parse"));
}

#[test]
fn load_empty_config_returns_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("strata.toml"), "").unwrap();

    let config = StrataConfig::load(tmp.path()).unwrap();
    assert_eq!(config.launch.port, 8001);
}

#[test]
fn expose_port_overrides_declared_port() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("strata.toml"), "[build]\nexpose_port = 8080\n").unwrap();

    let config = StrataConfig::load(tmp.path()).unwrap();
    assert_eq!(config.declared_port(), 8080);
    assert_eq!(config.launch.port, 8001);
}

#[test]
fn cache_dir_at_context_root_is_rejected() {
    for cache_dir in [".", "./", "", "././"] {
        let tmp = TempDir::new().unwrap();
        let toml = format!("[build]\ncache_dir = {cache_dir:?}\n");
        std::fs::write(tmp.path().join("strata.toml"), toml).unwrap();

        let err = StrataConfig::load(tmp.path()).unwrap_err();
        assert!(
            matches!(err, strata_core::Error::InvalidCacheDir { .. }),
            "{cache_dir:?} should be rejected"
        );
    }
}

#[test]
fn cache_dir_outside_context_is_accepted() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("strata.toml"),
        "[build]\ncache_dir = \"../strata-cache\"\n",
    )
    .unwrap();

    assert!(StrataConfig::load(tmp.path()).is_ok());
}

#[test]
fn configured_host_reaches_launch_descriptor() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("strata.toml"), "[launch]\nhost = \"127.0.0.1\"\n").unwrap();

    let config = StrataConfig::load(tmp.path()).unwrap();
    let plan = strata_core::BuildPlan::from_config(&config).unwrap();

    assert_eq!(plan.launch.listen_host, "127.0.0.1");
    assert_eq!(
        plan.launch.argv(),
        vec!["uvicorn", "main:app", "--host", "127.0.0.1", "--port", "8001"]
    );
}
