use std::path::PathBuf;
use std::process::Stdio;

use strata_build::executor::{ExecError, image_exists, import_rootfs};

use crate::launcher::LaunchError;

/// Abstraction over the server tool that hosts the application.
///
/// Production code uses [`ProcessServerTool`] or [`ContainerServerTool`],
/// tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait ServerTool: Send + Sync {
    /// Start the server in the foreground and wait for it to exit.
    /// Returns the process exit code.
    async fn start(&self, entrypoint: &str, host: &str, port: u16) -> Result<i32, LaunchError>;
}

/// Spawns the named program on the host with inherited stdio.
pub struct ProcessServerTool {
    program: String,
    dir: Option<PathBuf>,
}

impl ProcessServerTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            dir: None,
        }
    }

    /// Start the program from `dir` instead of the caller's directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }
}

impl ServerTool for ProcessServerTool {
    async fn start(&self, entrypoint: &str, host: &str, port: u16) -> Result<i32, LaunchError> {
        let port = port.to_string();
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args([entrypoint, "--host", host, "--port", port.as_str()])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.dir {
            tracing::debug!(dir = %dir.display(), "{} working directory", self.program);
            command.current_dir(dir);
        }

        let status = command.status().await.map_err(|e| spawn_error(&self.program, e))?;
        Ok(exit_code(&status))
    }
}

/// Runs the server tool inside a docker container built from the image's
/// top layer rootfs, publishing the listen port on the host.
pub struct ContainerServerTool {
    program: String,
    reference: String,
    rootfs: PathBuf,
    workdir: String,
    archive: PathBuf,
}

impl ContainerServerTool {
    /// `reference` names the docker image the rootfs is imported as, once.
    /// `archive` is scratch space for the import tarball.
    pub fn new(
        program: impl Into<String>,
        reference: impl Into<String>,
        rootfs: impl Into<PathBuf>,
        workdir: impl Into<String>,
        archive: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            reference: reference.into(),
            rootfs: rootfs.into(),
            workdir: workdir.into(),
            archive: archive.into(),
        }
    }

    fn run_args(&self, entrypoint: &str, host: &str, port: u16) -> Vec<String> {
        let publish = format!("{port}:{port}");
        let port = port.to_string();
        [
            "run",
            "--rm",
            "-p",
            publish.as_str(),
            "-w",
            self.workdir.as_str(),
            self.reference.as_str(),
            self.program.as_str(),
            entrypoint,
            "--host",
            host,
            "--port",
            port.as_str(),
        ]
        .map(str::to_owned)
        .to_vec()
    }

    async fn ensure_image(&self) -> Result<(), LaunchError> {
        let image_error = |source: ExecError| LaunchError::Image {
            reference: self.reference.clone(),
            source,
        };
        if image_exists(&self.reference).await.map_err(image_error)? {
            return Ok(());
        }
        tracing::info!(reference = %self.reference, "importing image rootfs");
        import_rootfs(&self.rootfs, &self.archive, Some(self.reference.as_str()))
            .await
            .map_err(image_error)?;
        Ok(())
    }
}

impl ServerTool for ContainerServerTool {
    async fn start(&self, entrypoint: &str, host: &str, port: u16) -> Result<i32, LaunchError> {
        self.ensure_image().await?;

        let status = tokio::process::Command::new("docker")
            .args(self.run_args(entrypoint, host, port))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| spawn_error("docker", e))?;
        Ok(exit_code(&status))
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> LaunchError {
    match e.kind() {
        std::io::ErrorKind::NotFound => LaunchError::NotFound {
            program: program.to_owned(),
            source: e,
        },
        _ => LaunchError::Spawn {
            program: program.to_owned(),
            source: e,
        },
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| signal_exit_code(status))
}

#[cfg(unix)]
fn signal_exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| 128 + sig).unwrap_or(1)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: &std::process::ExitStatus) -> i32 {
    1
}
