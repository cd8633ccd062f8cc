use std::path::PathBuf;

use strata_build::Builder;
use strata_core::StrataConfig;

use super::{image_tag, load_plan, open_store, scan_context};

pub async fn build(tag: Option<&str>) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let tag = image_tag(tag, &config);
    let plan = load_plan(&project_dir, &config)?;
    let context = scan_context(&project_dir, &config)?;
    let builder = Builder::new(open_store(&project_dir, &config)?, config.build.pull);

    let report = builder.build(&plan, &context, &tag).await?;

    let image_id = report.image.id().map_or("", |fp| fp.short());
    println!();
    println!(
        "Built {tag} ({image_id}): {}/{} layers cached",
        report.cached_count(),
        report.layers.len()
    );
    println!("  manifest: {}", report.manifest_path.display());
    println!("  launch:   strata launch --tag {tag}");
    Ok(())
}
