use std::path::PathBuf;

use strata_core::StrataConfig;

use super::{image_tag, open_store};

/// Print a built image's manifest as JSON.
pub fn inspect(tag: Option<&str>) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let store = open_store(&project_dir, &config)?;

    let image = store.load_image(&image_tag(tag, &config))?;
    println!("{}", serde_json::to_string_pretty(&image)?);
    Ok(())
}
