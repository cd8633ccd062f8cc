use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::step::normalize_context_path;

/// Name of the config file looked up in the build context root.
pub const CONFIG_FILE: &str = "strata.toml";

/// strata.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub launch: LaunchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Tag the built image manifest is stored under
    #[serde(default = "default_tag")]
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Pinned runtime base image
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Working directory inside the image
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Dependency manifest, copied on its own before the install step
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Dependency installation command
    #[serde(default = "default_install_command")]
    pub install_command: String,
    /// Port recorded in the image metadata (defaults to `launch.port`)
    #[serde(default)]
    pub expose_port: Option<u16>,
    /// Pull the base image and run RUN steps in docker containers over the
    /// layer filesystem. When false nothing is pulled, the base layer starts
    /// empty, and RUN uses the host shell inside the layer's workdir.
    #[serde(default = "default_pull")]
    pub pull: bool,
    /// Layer cache and image manifests, relative to the build context.
    /// Must not be the context root, which would exclude every file.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Process-serving tool invoked at container start
    #[serde(default = "default_server_tool")]
    pub server_tool: String,
    /// Application object reference (`module:attribute`)
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
    /// Bind host, `0.0.0.0` by default. Other values are passed through
    /// unchecked; a loopback host is unreachable from outside the container.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { tag: default_tag() }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            workdir: default_workdir(),
            manifest: default_manifest(),
            install_command: default_install_command(),
            expose_port: None,
            pull: default_pull(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            server_tool: default_server_tool(),
            entrypoint: default_entrypoint(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl StrataConfig {
    /// Load from strata.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            let config: Self = toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path.clone(),
                source: e,
            })?;
            config.validate()?;
            tracing::debug!(path = %config_path.display(), "loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Checks settings that parse but cannot work.
    pub fn validate(&self) -> crate::Result<()> {
        let cache_dir = &self.build.cache_dir;
        let is_context_root = cache_dir.trim().is_empty()
            || matches!(normalize_context_path(cache_dir).as_deref(), Ok("."));
        if is_context_root {
            return Err(crate::Error::InvalidCacheDir {
                path: cache_dir.clone(),
            });
        }
        Ok(())
    }

    /// Absolute location of the cache directory for `project_dir`.
    pub fn cache_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.build.cache_dir)
    }

    /// Port the image declares: `build.expose_port`, else `launch.port`.
    pub fn declared_port(&self) -> u16 {
        self.build.expose_port.unwrap_or(self.launch.port)
    }
}

fn default_tag() -> String {
    "app".to_owned()
}

fn default_base_image() -> String {
    "python:3.11-slim".to_owned()
}

fn default_workdir() -> String {
    "/app".to_owned()
}

fn default_manifest() -> String {
    "requirements.txt".to_owned()
}

fn default_install_command() -> String {
    "pip install --no-cache-dir -r requirements.txt".to_owned()
}

fn default_pull() -> bool {
    true
}

fn default_cache_dir() -> String {
    ".strata".to_owned()
}

fn default_server_tool() -> String {
    "uvicorn".to_owned()
}

fn default_entrypoint() -> String {
    "main:app".to_owned()
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8001
}
