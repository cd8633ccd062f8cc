mod build;
mod clean;
mod dockerfile;
mod eject;
mod init;
mod inspect;
mod launch;
mod plan;

use std::path::Path;

use strata_build::context::BuildContext;
use strata_build::eject::{is_ejected, load_ejected_dockerfile};
use strata_build::parse_dockerfile;
use strata_build::store::LayerStore;
use strata_core::{BuildPlan, StrataConfig, normalize_context_path};

pub use build::build;
pub use clean::clean;
pub use dockerfile::dockerfile;
pub use eject::eject;
pub use init::init_project;
pub use inspect::inspect;
pub use launch::launch;
pub use plan::plan;

/// The build plan for `project_dir`: the ejected `.strata/Dockerfile` when
/// present, strata.toml otherwise.
pub(crate) fn load_plan(project_dir: &Path, config: &StrataConfig) -> anyhow::Result<BuildPlan> {
    if is_ejected(project_dir) {
        tracing::debug!("using ejected .strata/Dockerfile");
        let content = load_ejected_dockerfile(project_dir)?;
        Ok(parse_dockerfile(&content)?)
    } else {
        Ok(BuildPlan::from_config(config)?)
    }
}

pub(crate) fn open_store(project_dir: &Path, config: &StrataConfig) -> anyhow::Result<LayerStore> {
    Ok(LayerStore::open(&config.cache_dir(project_dir))?)
}

/// Scans the build context, leaving out a relocated cache directory.
pub(crate) fn scan_context(
    project_dir: &Path,
    config: &StrataConfig,
) -> anyhow::Result<BuildContext> {
    let excludes = match normalize_context_path(&config.build.cache_dir) {
        Ok(path) => vec![path],
        Err(e) => {
            // Outside the context (absolute path), nothing to exclude.
            tracing::debug!("cache dir not inside the build context: {e}");
            Vec::new()
        }
    };
    Ok(BuildContext::scan_excluding(project_dir, &excludes)?)
}

/// Tag from the command line, else `[image].tag`.
pub(crate) fn image_tag(tag: Option<&str>, config: &StrataConfig) -> String {
    tag.unwrap_or(&config.image.tag).to_owned()
}
