//! Status command - show configuration and local package state.

use console::style;

use bundlepatch::config::ConfigFile;
use bundlepatch::kv::{self, FileKeyValueStore};
use bundlepatch::store::LocalCache;

use super::common::format_size;
use crate::error::CliError;

/// Run the status command.
pub fn run(file: &ConfigFile) -> Result<(), CliError> {
    let config = file.to_patch_config();

    println!("{}", style("Hosts").bold().underlined());
    println!("  Play mode:  {}", config.play_mode);
    println!("  Host:       {}", display_or_unset(&config.host_server));
    println!("  Fallback:   {}", display_or_unset(&config.fallback_host_server));
    println!(
        "  Product:    {} / {} / {}",
        config.product_name, config.platform, config.app_version
    );
    println!();

    let kv = FileKeyValueStore::open(&config.kv_path)?;
    let cache = LocalCache::new(&config.cache_root);

    println!("{}", style("Packages").bold().underlined());
    println!("  Cache: {}", config.cache_root.display());
    for info in file.package_infos() {
        let name = info.name();
        let version = kv::last_version(&kv, name).unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<4} version {:<12} {}",
            style(name).cyan(),
            info.kind(),
            version,
            format_size(cache.package_size(name))
        );
    }

    if let Some(group) = kv::last_group(&kv) {
        println!();
        println!("{}", style("Last download group").bold().underlined());
        println!("  {}", group.name);
        if !group.tags.is_empty() {
            println!("  Tags:   {}", group.tags.join(", "));
        }
        if !group.asset_names.is_empty() {
            println!("  Assets: {}", group.asset_names.join(", "));
        }
        println!(
            "  Last plan: {} files, {}",
            group.total_count,
            format_size(group.total_bytes)
        );
    }
    Ok(())
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
