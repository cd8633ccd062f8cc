use std::path::Path;

use strata_build::executor::{ExecError, workdir_path};
use strata_core::Image;

use crate::executor::{ContainerServerTool, ProcessServerTool, ServerTool};

/// Starts the process an image describes, parameterized over the server
/// tool for testability.
pub struct Launcher<T: ServerTool = ProcessServerTool> {
    tool: T,
}

impl Launcher<ProcessServerTool> {
    /// Spawns the tool the descriptor names on the host, from the image's
    /// working directory inside `rootfs` (the top layer's filesystem).
    pub fn on_host(image: &Image, rootfs: &Path) -> Self {
        Self {
            tool: ProcessServerTool::new(image.command()).in_dir(workdir_path(rootfs, &image.workdir)),
        }
    }
}

impl Launcher<ContainerServerTool> {
    /// Runs the tool in a docker container whose filesystem is `rootfs`.
    /// `scratch` holds the import tarball while the image is created.
    pub fn in_container(image: &Image, rootfs: &Path, scratch: &Path) -> Self {
        Self {
            tool: ContainerServerTool::new(
                image.command(),
                container_reference(image),
                rootfs,
                image.workdir.clone(),
                scratch.join("launch.tar"),
            ),
        }
    }
}

/// Docker image name for `image`: `strata/<tag>:<short id>`, lowercased as
/// docker requires.
pub fn container_reference(image: &Image) -> String {
    let repository: String = image
        .tag
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let repository = repository.trim_matches('-');
    let repository = if repository.is_empty() { "image" } else { repository };
    let version = image.id().map_or("latest", |fp| fp.short());
    format!("strata/{repository}:{version}")
}

impl<T: ServerTool> Launcher<T> {
    pub fn with_tool(tool: T) -> Self {
        Self { tool }
    }

    /// Checks the image's ports agree without starting anything and returns
    /// the argv that [`launch`](Self::launch) would run.
    pub fn prepare(&self, image: &Image) -> Result<Vec<String>, LaunchError> {
        image.check_launch_port().map_err(|_| LaunchError::PortMismatch {
            tag: image.tag.clone(),
            exposed: image.exposed_port,
            launch: image.launch.listen_port,
        })?;
        Ok(image.launch.argv())
    }

    /// Runs the server tool in the foreground. The returned exit code is the
    /// tool's, unchanged.
    pub async fn launch(&self, image: &Image) -> Result<i32, LaunchError> {
        let argv = self.prepare(image)?;
        tracing::info!(tag = %image.tag, "exec {}", argv.join(" "));

        let launch = &image.launch;
        let code = self
            .tool
            .start(&launch.entrypoint, &launch.listen_host, launch.listen_port)
            .await?;

        if code == 0 {
            tracing::info!("{} exited", launch.server_tool);
        } else {
            tracing::warn!(code, "{} exited with non-zero status", launch.server_tool);
        }
        Ok(code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{program} not found on PATH")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to start {program}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error(
        "image {tag} exposes port {exposed} but its launch descriptor listens on {launch}; rebuild the image"
    )]
    PortMismatch { tag: String, exposed: u16, launch: u16 },

    #[error("failed to prepare container image {reference}")]
    Image {
        reference: String,
        source: ExecError,
    },
}

#[cfg(test)]
mod tests {
    use strata_core::LaunchDescriptor;

    use super::*;

    fn image(tag: &str) -> Image {
        Image {
            tag: tag.to_owned(),
            layers: vec!["0123456789ab".repeat(6)[..64].parse().unwrap()],
            launch: LaunchDescriptor {
                server_tool: "uvicorn".to_owned(),
                entrypoint: "main:app".to_owned(),
                listen_host: "0.0.0.0".to_owned(),
                listen_port: 8001,
            },
            exposed_port: 8001,
            workdir: "/app".to_owned(),
        }
    }

    #[test]
    fn container_reference_is_docker_safe() {
        assert_eq!(container_reference(&image("My_App.v2")), "strata/my-app-v2:0123456789ab");
        assert_eq!(container_reference(&image("__")), "strata/image:0123456789ab");
    }
}
