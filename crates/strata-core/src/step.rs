use std::fmt;

use serde::{Deserialize, Serialize};

/// The four kinds of build step a pipeline is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    SetBase,
    CopyFiles,
    RunCommand,
    DeclarePort,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetBase => "SET_BASE",
            Self::CopyFiles => "COPY_FILES",
            Self::RunCommand => "RUN_COMMAND",
            Self::DeclarePort => "DECLARE_PORT",
        }
    }

    /// Whether a step of this kind changes the image filesystem.
    pub fn mutates_filesystem(&self) -> bool {
        matches!(self, Self::SetBase | Self::CopyFiles | Self::RunCommand)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subset of the build context, expressed in context-relative paths.
///
/// A path covers itself and, when it names a directory, everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "paths", rename_all = "snake_case")]
pub enum FileSet {
    /// Exactly the listed paths (e.g. the dependency manifest).
    Only(Vec<String>),
    /// Everything in the context except the listed paths.
    AllExcept(Vec<String>),
}

impl FileSet {
    /// Returns true if `path` (context-relative, `/`-separated) is selected.
    pub fn contains(&self, path: &str) -> bool {
        match self {
            Self::Only(paths) => paths.iter().any(|p| covers(p, path)),
            Self::AllExcept(paths) => !paths.iter().any(|p| covers(p, path)),
        }
    }

    pub fn paths(&self) -> &[String] {
        match self {
            Self::Only(paths) | Self::AllExcept(paths) => paths,
        }
    }
}

/// Whether `prefix` names `path` itself or a directory containing it.
pub fn covers(prefix: &str, path: &str) -> bool {
    prefix == "." || path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Normalizes a context-relative path: strips `./` prefixes and trailing `/`.
///
/// Absolute paths and paths escaping the context with `..` are rejected.
pub fn normalize_context_path(path: &str) -> crate::Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(crate::Error::InvalidContextPath {
            path: path.to_owned(),
            reason: "path is empty",
        });
    }
    if trimmed.starts_with('/') {
        return Err(crate::Error::InvalidContextPath {
            path: path.to_owned(),
            reason: "path must be relative to the build context",
        });
    }

    let parts: Vec<&str> = trimmed
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.contains(&"..") {
        return Err(crate::Error::InvalidContextPath {
            path: path.to_owned(),
            reason: "path must not escape the build context",
        });
    }

    if parts.is_empty() {
        Ok(".".to_owned())
    } else {
        Ok(parts.join("/"))
    }
}

/// What a step consumes. The step kind is derived from the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepInputs {
    Image { reference: String },
    Files { files: FileSet, destination: String },
    Command { command: String },
    Port { port: u16 },
}

/// One ordered, immutable build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub inputs: StepInputs,
    /// Absolute working directory inside the image the step runs in.
    pub workdir: String,
}

impl BuildStep {
    pub fn set_base(reference: impl Into<String>) -> Self {
        Self {
            inputs: StepInputs::Image {
                reference: reference.into(),
            },
            workdir: "/".to_owned(),
        }
    }

    pub fn copy(files: FileSet, destination: impl Into<String>, workdir: impl Into<String>) -> Self {
        Self {
            inputs: StepInputs::Files {
                files,
                destination: destination.into(),
            },
            workdir: workdir.into(),
        }
    }

    pub fn run(command: impl Into<String>, workdir: impl Into<String>) -> Self {
        Self {
            inputs: StepInputs::Command {
                command: command.into(),
            },
            workdir: workdir.into(),
        }
    }

    pub fn declare_port(port: u16, workdir: impl Into<String>) -> Self {
        Self {
            inputs: StepInputs::Port { port },
            workdir: workdir.into(),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self.inputs {
            StepInputs::Image { .. } => StepKind::SetBase,
            StepInputs::Files { .. } => StepKind::CopyFiles,
            StepInputs::Command { .. } => StepKind::RunCommand,
            StepInputs::Port { .. } => StepKind::DeclarePort,
        }
    }

    /// The file set of a COPY step, if this is one.
    pub fn files(&self) -> Option<&FileSet> {
        match &self.inputs {
            StepInputs::Files { files, .. } => Some(files),
            _ => None,
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inputs {
            StepInputs::Image { reference } => write!(f, "FROM {reference}"),
            StepInputs::Files {
                files: FileSet::Only(paths),
                destination,
            } => write!(f, "COPY {} {destination}", paths.join(" ")),
            StepInputs::Files {
                files: FileSet::AllExcept(paths),
                destination,
            } if paths.is_empty() => write!(f, "COPY . {destination}"),
            StepInputs::Files {
                files: FileSet::AllExcept(paths),
                destination,
            } => write!(f, "COPY . {destination} (except {})", paths.join(", ")),
            StepInputs::Command { command } => write!(f, "RUN {command}"),
            StepInputs::Port { port } => write!(f, "EXPOSE {port}"),
        }
    }
}
