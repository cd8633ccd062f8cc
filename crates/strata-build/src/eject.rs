use std::io::Write;
use std::path::{Path, PathBuf};

/// Location of a project's hand-maintained Dockerfile: `.strata/Dockerfile`
/// in the build context.
///
/// Once the file exists it replaces strata.toml as the source of the build
/// plan. strata never rewrites it.
#[derive(Debug, Clone)]
pub struct EjectedDockerfile {
    path: PathBuf,
}

impl EjectedDockerfile {
    const DIR: &'static str = ".strata";
    const FILE: &'static str = "Dockerfile";

    pub fn in_project(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(Self::DIR).join(Self::FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Creates the file with `content`. An existing file is an error and is
    /// left untouched, even when two ejects race.
    pub fn create(&self, content: &str) -> Result<(), EjectError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| EjectError::CreateDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => EjectError::AlreadyEjected {
                    path: self.path.clone(),
                },
                _ => EjectError::Write {
                    path: self.path.clone(),
                    source: e,
                },
            })?;
        file.write_all(content.as_bytes())
            .map_err(|e| EjectError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        tracing::debug!(path = %self.path.display(), bytes = content.len(), "ejected Dockerfile");
        Ok(())
    }

    pub fn read(&self) -> Result<String, EjectError> {
        std::fs::read_to_string(&self.path).map_err(|e| EjectError::Read {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Writes `dockerfile_content` as the project's ejected Dockerfile and
/// returns where it went.
pub fn eject(project_dir: &Path, dockerfile_content: &str) -> Result<PathBuf, EjectError> {
    let ejected = EjectedDockerfile::in_project(project_dir);
    ejected.create(dockerfile_content)?;
    Ok(ejected.path)
}

pub fn is_ejected(project_dir: &Path) -> bool {
    EjectedDockerfile::in_project(project_dir).exists()
}

pub fn load_ejected_dockerfile(project_dir: &Path) -> Result<String, EjectError> {
    EjectedDockerfile::in_project(project_dir).read()
}

#[derive(Debug, thiserror::Error)]
pub enum EjectError {
    #[error("cannot create {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("build plan already ejected to {path}; edit it in place, or delete it and eject again")]
    AlreadyEjected { path: PathBuf },
    #[error("cannot write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
