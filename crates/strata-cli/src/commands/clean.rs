use std::io::Write;
use std::path::PathBuf;

use strata_build::store::LayerStore;
use strata_core::StrataConfig;

/// Delete every cached layer and image manifest.
pub fn clean(skip_confirm: bool) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = StrataConfig::load(&project_dir)?;
    let cache_dir = config.cache_dir(&project_dir);

    if !cache_dir.exists() {
        println!("Nothing to clean.");
        return Ok(());
    }

    let store = LayerStore::open(&cache_dir)?;
    let layers = store.layers()?;

    if !skip_confirm {
        println!("This will delete:");
        println!("  - {} cached layer(s) in {}", layers.len(), cache_dir.display());
        println!("  - all image manifests");
        println!();
        print!("Are you sure? [y/N] ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !matches!(input.trim(), "y" | "Y" | "yes" | "YES") {
            println!("Aborted.");
            return Ok(());
        }
    }

    store.clear()?;
    println!("Removed {} layer(s).", layers.len());
    Ok(())
}
