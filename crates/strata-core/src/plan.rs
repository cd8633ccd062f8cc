use serde::{Deserialize, Serialize};

use crate::config::StrataConfig;
use crate::image::LaunchDescriptor;
use crate::step::{BuildStep, FileSet, StepInputs, StepKind, covers, normalize_context_path};

/// An ordered step list plus the launch descriptor the image will carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub steps: Vec<BuildStep>,
    pub launch: LaunchDescriptor,
}

impl BuildPlan {
    /// Builds the canonical pipeline from `strata.toml`:
    /// base, manifest copy, install, rest-of-source copy, port declaration.
    pub fn from_config(config: &StrataConfig) -> crate::Result<Self> {
        let build = &config.build;
        let manifest = normalize_context_path(&build.manifest)?;
        if manifest == "." {
            return Err(crate::Error::InvalidContextPath {
                path: build.manifest.clone(),
                reason: "manifest must name a file, not the whole context",
            });
        }
        let workdir = build.workdir.as_str();

        let steps = vec![
            BuildStep::set_base(&build.base_image),
            BuildStep::copy(FileSet::Only(vec![manifest.clone()]), ".", workdir),
            BuildStep::run(&build.install_command, workdir),
            BuildStep::copy(FileSet::AllExcept(vec![manifest]), ".", workdir),
            BuildStep::declare_port(config.declared_port(), workdir),
        ];

        let plan = Self {
            steps,
            launch: LaunchDescriptor {
                server_tool: config.launch.server_tool.clone(),
                entrypoint: config.launch.entrypoint.clone(),
                listen_host: config.launch.host.clone(),
                listen_port: config.launch.port,
            },
        };
        plan.validate()?;
        Ok(plan)
    }

    /// The port recorded by the DECLARE_PORT step, if any.
    pub fn declared_port(&self) -> Option<u16> {
        self.steps.iter().find_map(|step| match step.inputs {
            StepInputs::Port { port } => Some(port),
            _ => None,
        })
    }

    /// Checks the ordering rules cache-sensitive layering depends on.
    ///
    /// - one SET_BASE, first
    /// - an explicit (manifest) COPY before the first RUN
    /// - no full-source COPY before any RUN
    /// - a full-source COPY excludes every path copied explicitly before it
    /// - exactly one DECLARE_PORT, equal to the launch port
    ///
    /// The launch host is not checked. It defaults to `0.0.0.0` and a
    /// configured value is passed to the server tool as-is.
    pub fn validate(&self) -> crate::Result<()> {
        let bases: Vec<usize> = self.indices_of(StepKind::SetBase).collect();
        match bases.as_slice() {
            [] => return Err(crate::Error::MissingBase),
            [0] => {}
            [index] => return Err(crate::Error::BaseNotFirst { index: *index }),
            _ => return Err(crate::Error::MultipleBases),
        }

        let mut explicit: Vec<&str> = Vec::new();
        let mut source_copy: Option<usize> = None;
        for (index, step) in self.steps.iter().enumerate() {
            match &step.inputs {
                StepInputs::Files {
                    files: FileSet::Only(paths),
                    ..
                } => {
                    if source_copy.is_some() {
                        continue;
                    }
                    explicit.extend(paths.iter().map(String::as_str));
                }
                StepInputs::Files {
                    files: files @ FileSet::AllExcept(_),
                    ..
                } => {
                    if let Some(path) = explicit.iter().find(|path| files.contains(path)) {
                        return Err(crate::Error::OverlappingCopies {
                            copy_index: index,
                            path: (*path).to_owned(),
                        });
                    }
                    source_copy.get_or_insert(index);
                }
                StepInputs::Command { .. } => {
                    if let Some(copy_index) = source_copy {
                        return Err(crate::Error::SourceCopyBeforeInstall {
                            copy_index,
                            run_index: index,
                        });
                    }
                    if explicit.is_empty() {
                        return Err(crate::Error::MissingManifestCopy { run_index: index });
                    }
                }
                _ => {}
            }
        }

        let ports: Vec<usize> = self.indices_of(StepKind::DeclarePort).collect();
        match ports.len() {
            0 => return Err(crate::Error::MissingPortDeclaration),
            1 => {}
            _ => return Err(crate::Error::MultiplePortDeclarations),
        }
        if let Some(declared) = self.declared_port() {
            if declared != self.launch.listen_port {
                return Err(crate::Error::PortMismatch {
                    declared,
                    launch: self.launch.listen_port,
                });
            }
        }

        Ok(())
    }

    fn indices_of(&self, kind: StepKind) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter(move |(_, step)| step.kind() == kind)
            .map(|(index, _)| index)
    }
}

/// Context paths placed by the explicit (`Only`) COPY steps in `steps`,
/// without duplicates already covered by an earlier path.
pub fn explicit_paths(steps: &[BuildStep]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for step in steps {
        if let Some(FileSet::Only(only)) = step.files() {
            for path in only {
                if !paths.iter().any(|p| covers(p, path)) {
                    paths.push(path.clone());
                }
            }
        }
    }
    paths
}
