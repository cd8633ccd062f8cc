use std::path::PathBuf;

use anyhow::Context;
use strata_core::{Image, StrataConfig};
use strata_launch::{Launcher, ServerTool};

use super::{image_tag, open_store};

/// Start the image's server process and return its exit code.
pub async fn launch(tag: Option<&str>, dry_run: bool) -> anyhow::Result<i32> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let store = open_store(&project_dir, &config)?;
    let image = store.load_image(&image_tag(tag, &config))?;

    let top = image
        .id()
        .with_context(|| format!("image {} has no layers", image.tag))?;
    let rootfs = store
        .rootfs(top)?
        .with_context(|| format!("image {} has no filesystem", image.tag))?;

    if config.build.pull {
        start(Launcher::in_container(&image, &rootfs, store.root()), &image, dry_run).await
    } else {
        start(Launcher::on_host(&image, &rootfs), &image, dry_run).await
    }
}

async fn start<T: ServerTool>(
    launcher: Launcher<T>,
    image: &Image,
    dry_run: bool,
) -> anyhow::Result<i32> {
    if dry_run {
        println!("{}", launcher.prepare(image)?.join(" "));
        return Ok(0);
    }
    Ok(launcher.launch(image).await?)
}
