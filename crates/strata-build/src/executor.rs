use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Abstraction over the external tools a build step reaches for.
///
/// Production code uses [`HostExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait StepExecutor: Send + Sync {
    /// Resolve a base image reference to a pinned identifier.
    async fn resolve_base(&self, reference: &str) -> Result<String, ExecError>;

    /// Populate `rootfs` with the filesystem of the resolved base image.
    async fn unpack_base(&self, base_id: &str, rootfs: &Path) -> Result<(), ExecError>;

    /// Run a shell command against the image filesystem at `rootfs`, with
    /// `workdir` (an image path) as working directory. Changes the command
    /// makes must land in `rootfs`. Returns the command's exit code.
    async fn run(&self, command: &str, rootfs: &Path, workdir: &str) -> Result<i32, ExecError>;
}

/// The executor selected by the `build.pull` setting.
pub enum HostExecutor {
    Docker(DockerExecutor),
    Shell(ShellExecutor),
}

impl HostExecutor {
    pub fn new(pull: bool) -> Self {
        if pull {
            Self::Docker(DockerExecutor)
        } else {
            Self::Shell(ShellExecutor)
        }
    }
}

impl Default for HostExecutor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StepExecutor for HostExecutor {
    async fn resolve_base(&self, reference: &str) -> Result<String, ExecError> {
        match self {
            Self::Docker(executor) => executor.resolve_base(reference).await,
            Self::Shell(executor) => executor.resolve_base(reference).await,
        }
    }

    async fn unpack_base(&self, base_id: &str, rootfs: &Path) -> Result<(), ExecError> {
        match self {
            Self::Docker(executor) => executor.unpack_base(base_id, rootfs).await,
            Self::Shell(executor) => executor.unpack_base(base_id, rootfs).await,
        }
    }

    async fn run(&self, command: &str, rootfs: &Path, workdir: &str) -> Result<i32, ExecError> {
        match self {
            Self::Docker(executor) => executor.run(command, rootfs, workdir).await,
            Self::Shell(executor) => executor.run(command, rootfs, workdir).await,
        }
    }
}

/// Runs every RUN step inside a container whose filesystem is the layer
/// rootfs.
///
/// The base layer holds the exported filesystem of the pulled image. A RUN
/// step imports the current rootfs as a throwaway image, runs the command in
/// it, and exports the container back over the rootfs on success.
pub struct DockerExecutor;

impl StepExecutor for DockerExecutor {
    async fn resolve_base(&self, reference: &str) -> Result<String, ExecError> {
        tracing::debug!(reference, "docker pull");
        let id = capture("docker", ["pull", "--quiet", reference]).await?;
        Ok(if id.is_empty() { reference.to_owned() } else { id })
    }

    async fn unpack_base(&self, base_id: &str, rootfs: &Path) -> Result<(), ExecError> {
        let container = capture("docker", ["create", base_id]).await?;
        let archive = rootfs.with_file_name("base.tar");

        let exported = export_into(&container, &archive, rootfs).await;
        remove_container(&container).await;
        remove_archive(&archive);
        exported
    }

    async fn run(&self, command: &str, rootfs: &Path, workdir: &str) -> Result<i32, ExecError> {
        let archive = rootfs.with_file_name("rootfs.tar");
        let image = import_rootfs(rootfs, &archive, None).await?;
        let container = container_name(rootfs);

        tracing::debug!(command, workdir, image = %image, "docker run");
        let outcome = stream("docker", run_args(&container, &image, workdir, command)).await;
        let result = match outcome {
            Ok(0) => export_into(&container, &archive, rootfs).await.map(|()| 0),
            other => other,
        };

        remove_container(&container).await;
        if let Err(e) = capture("docker", ["rmi", image.as_str()]).await {
            tracing::warn!(image = %image, error = %e, "failed to remove step image");
        }
        remove_archive(&archive);
        result
    }
}

/// Runs RUN steps with the host shell in `<rootfs>/<workdir>`.
///
/// Nothing is pulled and the base layer starts empty. Commands see the host
/// filesystem outside the working directory, so only the files they write
/// under it are captured in the layer.
pub struct ShellExecutor;

impl StepExecutor for ShellExecutor {
    async fn resolve_base(&self, reference: &str) -> Result<String, ExecError> {
        Ok(reference.to_owned())
    }

    async fn unpack_base(&self, base_id: &str, _rootfs: &Path) -> Result<(), ExecError> {
        tracing::debug!(base_id, "shell executor: base filesystem not unpacked");
        Ok(())
    }

    async fn run(&self, command: &str, rootfs: &Path, workdir: &str) -> Result<i32, ExecError> {
        let dir = workdir_path(rootfs, workdir);
        tracing::debug!(command, dir = %dir.display(), "sh -c");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| ExecError::Spawn { dir, source: e })?;

        Ok(exit_code(&status))
    }
}

/// Host path of an image working directory inside `rootfs`.
pub fn workdir_path(rootfs: &Path, workdir: &str) -> PathBuf {
    rootfs.join(workdir.trim_start_matches('/'))
}

/// Imports `rootfs` as a docker image, tagged `reference` when given.
/// `archive` is scratch space for the tarball and is removed afterwards.
/// Returns the image id.
pub async fn import_rootfs(
    rootfs: &Path,
    archive: &Path,
    reference: Option<&str>,
) -> Result<String, ExecError> {
    let packed = capture(
        "tar",
        [
            OsStr::new("-c"),
            OsStr::new("-f"),
            archive.as_os_str(),
            OsStr::new("-C"),
            rootfs.as_os_str(),
            OsStr::new("."),
        ],
    )
    .await;
    let imported = match packed {
        Ok(_) => {
            let mut args = vec![OsStr::new("import"), archive.as_os_str()];
            args.extend(reference.map(OsStr::new));
            capture("docker", args).await
        }
        Err(e) => Err(e),
    };
    remove_archive(archive);
    imported
}

/// Whether the docker daemon already has an image named `reference`.
pub async fn image_exists(reference: &str) -> Result<bool, ExecError> {
    let status = tokio::process::Command::new("docker")
        .args(["image", "inspect", reference])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| ExecError::NotFound {
            program: "docker".to_owned(),
            source: e,
        })?;
    Ok(status.success())
}

fn run_args(container: &str, image: &str, workdir: &str, command: &str) -> Vec<String> {
    [
        "run", "--name", container, "-w", workdir, image, "sh", "-c", command,
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Docker container names cannot repeat, so derive one from the pending
/// layer directory, which is unique per fingerprint.
fn container_name(rootfs: &Path) -> String {
    let layer = rootfs
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().replace(".partial", ""))
        .unwrap_or_default();
    let short: String = layer.chars().take(12).collect();
    format!("strata-run-{short}-{}", std::process::id())
}

/// Replaces the contents of `rootfs` with the filesystem of `container`.
async fn export_into(container: &str, archive: &Path, rootfs: &Path) -> Result<(), ExecError> {
    capture(
        "docker",
        [
            OsStr::new("export"),
            OsStr::new("-o"),
            archive.as_os_str(),
            OsStr::new(container),
        ],
    )
    .await?;

    if rootfs.exists() {
        std::fs::remove_dir_all(rootfs).map_err(|e| ExecError::Io {
            path: rootfs.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(rootfs).map_err(|e| ExecError::Io {
        path: rootfs.to_path_buf(),
        source: e,
    })?;

    capture(
        "tar",
        [
            OsStr::new("--no-same-owner"),
            OsStr::new("--exclude=.dockerenv"),
            OsStr::new("-x"),
            OsStr::new("-f"),
            archive.as_os_str(),
            OsStr::new("-C"),
            rootfs.as_os_str(),
        ],
    )
    .await?;
    Ok(())
}

async fn remove_container(container: &str) {
    if let Err(e) = capture("docker", ["rm", "--force", container]).await {
        tracing::warn!(container, error = %e, "failed to remove container");
    }
}

fn remove_archive(archive: &Path) {
    if archive.exists() {
        if let Err(e) = std::fs::remove_file(archive) {
            tracing::warn!(path = %archive.display(), error = %e, "failed to remove archive");
        }
    }
}

/// Runs `program` to completion and returns its trimmed stdout.
async fn capture<I, S>(program: &str, args: I) -> Result<String, ExecError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ExecError::NotFound {
            program: program.to_owned(),
            source: e,
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    } else {
        Err(ExecError::CommandFailed {
            program: program.to_owned(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Runs `program` with inherited output and returns its exit code.
async fn stream<I, S>(program: &str, args: I) -> Result<i32, ExecError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let status = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| ExecError::NotFound {
            program: program.to_owned(),
            source: e,
        })?;
    Ok(exit_code(&status))
}

/// Killed by a signal: report the shell convention 128 + n where known.
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

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{program} not found on PATH")]
    NotFound {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn shell in {dir}")]
    Spawn {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to prepare {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
