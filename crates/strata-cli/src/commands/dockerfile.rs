use std::path::PathBuf;

use strata_build::DockerfileGenerator;
use strata_core::StrataConfig;

use super::load_plan;

/// Print the Dockerfile equivalent of the current build plan.
pub fn dockerfile() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let plan = load_plan(&project_dir, &config)?;

    print!("{}", DockerfileGenerator::new(&plan).render());
    Ok(())
}
