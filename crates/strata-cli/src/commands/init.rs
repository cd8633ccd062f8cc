use std::path::Path;

use strata_core::CONFIG_FILE;

const CONFIG_TEMPLATE: &str = r#"[image]
# tag = "app"

[build]
# base_image = "python:3.11-slim"
# workdir = "/app"
# manifest = "requirements.txt"
# install_command = "pip install --no-cache-dir -r requirements.txt"
# expose_port = 8001
# Steps run in docker containers; false runs RUN with the host shell.
# pull = true
# cache_dir = ".strata"

[launch]
# server_tool = "uvicorn"
# entrypoint = "main:app"
# host = "0.0.0.0"
# port = 8001
"#;

const DOCKERIGNORE_TEMPLATE: &str = r#".strata/
.git/
.venv/
__pycache__/
*.pyc
"#;

/// Initialize strata in an existing service directory.
pub fn init_project() -> anyhow::Result<()> {
    let mut created = Vec::new();

    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() {
        eprintln!("{CONFIG_FILE} already exists, skipping");
    } else {
        std::fs::write(config_path, CONFIG_TEMPLATE)?;
        created.push(CONFIG_FILE);
    }

    let dockerignore_path = Path::new(".dockerignore");
    if dockerignore_path.exists() {
        eprintln!(".dockerignore already exists, skipping");
    } else {
        std::fs::write(dockerignore_path, DOCKERIGNORE_TEMPLATE)?;
        created.push(".dockerignore");
    }

    if created.is_empty() {
        println!("Nothing to create, already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. List dependencies in requirements.txt");
    println!();
    println!("  2. Check the layer plan:");
    println!("     strata plan");
    println!();
    println!("  3. Build and start:");
    println!("     strata build");
    println!("     strata launch");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::StrataConfig;

    #[test]
    fn template_parses_to_defaults() {
        let config: StrataConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.launch.port, 8001);
        assert_eq!(config.build.manifest, "requirements.txt");
    }
}
