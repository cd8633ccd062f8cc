use std::path::PathBuf;

use strata_build::dockerfile::DockerfileGenerator;
use strata_core::{BuildPlan, StrataConfig};

pub fn eject() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let plan = BuildPlan::from_config(&config)?;

    let dockerfile = DockerfileGenerator::new(&plan).render();
    strata_build::eject::eject(&project_dir, &dockerfile)?;

    println!("Ejected build plan to .strata/Dockerfile");
    println!("You can now edit it directly. strata build will use this file.");
    Ok(())
}
