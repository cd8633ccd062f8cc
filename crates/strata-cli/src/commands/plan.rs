use std::path::PathBuf;

use strata_build::Builder;
use strata_core::StrataConfig;

use super::{load_plan, open_store, scan_context};

/// Print each step's layer fingerprint and whether the next build reuses it.
pub fn plan() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let plan = load_plan(&project_dir, &config)?;
    let context = scan_context(&project_dir, &config)?;
    let builder = Builder::new(open_store(&project_dir, &config)?, config.build.pull);

    let layers = builder.preview(&plan, &context)?;
    for layer in &layers {
        let status = if layer.cached { "cached" } else { "build" };
        println!(
            "{:>2}  {}  {:<6}  {}",
            layer.index + 1,
            layer.fingerprint.short(),
            status,
            layer.step
        );
    }
    println!("    CMD {}", plan.launch.argv().join(" "));

    let cached = layers.iter().filter(|layer| layer.cached).count();
    println!();
    println!(
        "{cached}/{} layers cached, {} to build ({} files in context)",
        layers.len(),
        layers.len() - cached,
        context.files().len()
    );
    Ok(())
}
