use std::path::{Path, PathBuf};

use strata_core::{BuildPlan, BuildStep, Fingerprint, Image, Layer, StepInputs, fingerprint};

use crate::context::{BuildContext, ContextError};
use crate::executor::{ExecError, HostExecutor, StepExecutor};
use crate::store::{LayerRecord, LayerStore, PendingLayer, StoreError};

/// Folds a [`BuildPlan`] through the layer fingerprint function, reusing
/// cached layers and executing the rest strictly in order.
///
/// Parameterized over the executor for testability.
pub struct Builder<E: StepExecutor = HostExecutor> {
    store: LayerStore,
    executor: E,
}

impl Builder<HostExecutor> {
    pub fn new(store: LayerStore, pull: bool) -> Self {
        Self {
            store,
            executor: HostExecutor::new(pull),
        }
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub image: Image,
    pub layers: Vec<Layer>,
    /// Where the image manifest was written.
    pub manifest_path: PathBuf,
}

impl BuildReport {
    pub fn cached_count(&self) -> usize {
        self.layers.iter().filter(|layer| layer.cached).count()
    }
}

impl<E: StepExecutor> Builder<E> {
    pub fn with_executor(store: LayerStore, executor: E) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    /// Computes every layer fingerprint and whether it is cached, without
    /// executing anything.
    pub fn preview(&self, plan: &BuildPlan, context: &BuildContext) -> Result<Vec<Layer>, BuildError> {
        plan.validate()?;

        let mut upstream: Option<Fingerprint> = None;
        let mut layers = Vec::with_capacity(plan.steps.len());
        for (index, step) in plan.steps.iter().enumerate() {
            let (_, content) = select_files(context, index, step)?;
            let fp = fingerprint(upstream.as_ref(), step, content.as_ref());
            layers.push(Layer {
                index,
                fingerprint: fp.clone(),
                step: step.clone(),
                cached: self.store.contains(&fp),
            });
            upstream = Some(fp);
        }
        Ok(layers)
    }

    /// Builds `plan` against `context` and stores the image under `tag`.
    ///
    /// The first failing step aborts the build: its partial layer is
    /// discarded, earlier layers stay committed, and no image is written.
    pub async fn build(
        &self,
        plan: &BuildPlan,
        context: &BuildContext,
        tag: &str,
    ) -> Result<BuildReport, BuildError> {
        plan.validate()?;

        let total = plan.steps.len();
        let mut upstream: Option<Fingerprint> = None;
        let mut layers = Vec::with_capacity(total);

        for (index, step) in plan.steps.iter().enumerate() {
            let (files, content) = select_files(context, index, step)?;
            let fp = fingerprint(upstream.as_ref(), step, content.as_ref());
            let cached = self.store.contains(&fp);

            if cached {
                tracing::info!("[{}/{total}] {step} (cached {})", index + 1, fp.short());
            } else {
                tracing::info!("[{}/{total}] {step}", index + 1);
                self.execute(index, step, &fp, upstream.as_ref(), context, &files)
                    .await?;
            }

            layers.push(Layer {
                index,
                fingerprint: fp.clone(),
                step: step.clone(),
                cached,
            });
            upstream = Some(fp);
        }

        let exposed_port = plan
            .declared_port()
            .ok_or(strata_core::Error::MissingPortDeclaration)?;
        let image = Image {
            tag: tag.to_owned(),
            layers: layers.iter().map(|layer| layer.fingerprint.clone()).collect(),
            launch: plan.launch.clone(),
            exposed_port,
            workdir: plan
                .steps
                .last()
                .map_or_else(|| "/".to_owned(), |step| step.workdir.clone()),
        };
        image.check_launch_port()?;
        let manifest_path = self.store.write_image(&image)?;

        tracing::info!(
            tag,
            layers = layers.len(),
            cached = layers.iter().filter(|layer| layer.cached).count(),
            "image built"
        );
        Ok(BuildReport {
            image,
            layers,
            manifest_path,
        })
    }

    async fn execute(
        &self,
        index: usize,
        step: &BuildStep,
        fp: &Fingerprint,
        upstream: Option<&Fingerprint>,
        context: &BuildContext,
        files: &[&str],
    ) -> Result<(), BuildError> {
        let pending = self.store.begin(fp)?;

        match self.apply(&pending, index, step, upstream, context, files).await {
            Ok(base_id) => {
                let record = LayerRecord {
                    fingerprint: fp.clone(),
                    parent: upstream.cloned(),
                    step: step.clone(),
                    base_id,
                    has_rootfs: step.kind().mutates_filesystem(),
                };
                pending.commit(&record)?;
                Ok(())
            }
            Err(e) => {
                pending.discard();
                Err(e)
            }
        }
    }

    /// Performs one step inside `pending`. Returns the resolved base id for
    /// SET_BASE.
    async fn apply(
        &self,
        pending: &PendingLayer,
        index: usize,
        step: &BuildStep,
        upstream: Option<&Fingerprint>,
        context: &BuildContext,
        files: &[&str],
    ) -> Result<Option<String>, BuildError> {
        match &step.inputs {
            StepInputs::Image { reference } => {
                let id = self
                    .executor
                    .resolve_base(reference)
                    .await
                    .map_err(|e| BuildError::BaseResolution {
                        reference: reference.clone(),
                        source: e,
                    })?;
                pending.seed_from(None)?;
                self.executor
                    .unpack_base(&id, &pending.rootfs())
                    .await
                    .map_err(|e| BuildError::BaseUnpack {
                        reference: reference.clone(),
                        source: e,
                    })?;
                Ok(Some(id))
            }
            StepInputs::Files {
                files: set,
                destination,
            } => {
                self.seed_from_upstream(pending, upstream)?;
                let dest = image_path(&pending.rootfs(), &step.workdir, destination);
                context
                    .copy_into(set, files, &dest)
                    .map_err(|e| BuildError::Copy { index, source: e })?;
                Ok(None)
            }
            StepInputs::Command { command } => {
                self.seed_from_upstream(pending, upstream)?;
                let dir = image_path(&pending.rootfs(), &step.workdir, ".");
                std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir {
                    path: dir.clone(),
                    source: e,
                })?;

                let code = self
                    .executor
                    .run(command, &pending.rootfs(), &step.workdir)
                    .await
                    .map_err(|e| BuildError::CommandSpawn {
                        index,
                        command: command.clone(),
                        source: e,
                    })?;
                if code != 0 {
                    return Err(BuildError::CommandFailed {
                        index,
                        command: command.clone(),
                        code,
                    });
                }
                Ok(None)
            }
            StepInputs::Port { .. } => Ok(None),
        }
    }

    fn seed_from_upstream(
        &self,
        pending: &PendingLayer,
        upstream: Option<&Fingerprint>,
    ) -> Result<(), BuildError> {
        let parent = match upstream {
            Some(fp) => self.store.rootfs(fp)?,
            None => None,
        };
        pending.seed_from(parent.as_deref())?;
        Ok(())
    }
}

/// Files a COPY step reads and their content digest; empty for other kinds.
fn select_files<'c>(
    context: &'c BuildContext,
    index: usize,
    step: &BuildStep,
) -> Result<(Vec<&'c str>, Option<Fingerprint>), BuildError> {
    let Some(set) = step.files() else {
        return Ok((Vec::new(), None));
    };
    let files = context
        .select(set)
        .map_err(|e| BuildError::Copy { index, source: e })?;
    let digest = context
        .digest(&files)
        .map_err(|e| BuildError::Copy { index, source: e })?;
    Ok((files, Some(digest)))
}

/// Host path of `destination` inside an image rootfs; relative destinations
/// resolve against the step's working directory.
fn image_path(rootfs: &Path, workdir: &str, destination: &str) -> PathBuf {
    let mut path = rootfs.to_path_buf();
    if !destination.starts_with('/') {
        path.push(workdir.trim_start_matches('/'));
    }
    path.push(destination.trim_start_matches('/'));
    path
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid build plan: {0}")]
    InvalidPlan(#[from] strata_core::Error),

    #[error("failed to resolve base image {reference}")]
    BaseResolution {
        reference: String,
        source: ExecError,
    },

    #[error("failed to unpack base image {reference}")]
    BaseUnpack {
        reference: String,
        source: ExecError,
    },

    #[error("COPY failed at step {}", .index + 1)]
    Copy { index: usize, source: ContextError },

    #[error("RUN failed at step {}: `{command}` exited with code {code}", .index + 1)]
    CommandFailed {
        index: usize,
        command: String,
        code: i32,
    },

    #[error("RUN failed to start at step {}: `{command}`", .index + 1)]
    CommandSpawn {
        index: usize,
        command: String,
        source: ExecError,
    },

    #[error("layer store error")]
    Store(#[from] StoreError),
}

impl BuildError {
    /// Exit code of the failing external command, passed through unchanged.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_resolves_against_workdir() {
        let rootfs = Path::new("/cache/rootfs");
        assert_eq!(
            image_path(rootfs, "/app", "."),
            Path::new("/cache/rootfs/app/.")
        );
        assert_eq!(
            image_path(rootfs, "/app", "/opt/data"),
            Path::new("/cache/rootfs/opt/data")
        );
    }

    #[test]
    fn exit_code_only_for_failed_commands() {
        let failed = BuildError::CommandFailed {
            index: 2,
            command: "pip install".to_owned(),
            code: 3,
        };
        assert_eq!(failed.exit_code(), Some(3));
        assert!(failed.to_string().contains("step 3"));
        assert_eq!(
            BuildError::InvalidPlan(strata_core::Error::MissingBase).exit_code(),
            None
        );
    }
}
