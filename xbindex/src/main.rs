//! Index file inspector.
//!
//! Opens each `.ndx` or `.mdx` file named on the command line read-only,
//! prints its tags and walks every tag in key order. Exits with status 1
//! when any file cannot be opened or any tag is out of order.

use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xbindex::{EngineConfig, Index, IndexError, MdxIndex, NdxIndex};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xbindex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        tracing::error!("usage: xbindex <file.ndx|file.mdx>...");
        std::process::exit(1);
    }

    let mut failed = false;
    for path in &paths {
        if let Err(e) = inspect_file(Path::new(path), &config) {
            tracing::error!(path = %path, "inspection failed: {e}");
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn inspect_file(path: &Path, config: &EngineConfig) -> Result<(), IndexError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    println!("{}", path.display());
    match extension.as_str() {
        "ndx" => inspect(&mut NdxIndex::open_read_only(path, config)?),
        "mdx" => {
            let mut index = MdxIndex::open_read_only(path, config)?;
            let header = index.header();
            println!(
                "  block size {}, {} pages, first free page {}",
                header.block_size(),
                header.page_count,
                header.first_free
            );
            inspect(&mut index)
        }
        other => Err(IndexError::InvalidOption(format!(
            "unknown index extension '{other}'"
        ))),
    }
}

fn inspect<X: Index>(index: &mut X) -> Result<(), IndexError> {
    for id in 0..index.tag_count() {
        let tag = index.tag(id)?;
        let mut flags = Vec::new();
        if tag.unique() {
            flags.push("unique");
        }
        if tag.descending() {
            flags.push("descending");
        }
        println!(
            "  {:<10} {:?}({}) {} {}{}",
            tag.name(),
            tag.key_type(),
            tag.key_len(),
            tag.key_expression(),
            flags.join(" "),
            tag.filter().map(|f| format!(" FOR {f}")).unwrap_or_default()
        );
        let keys = index.verify_order(id)?;
        println!("    {keys} keys in order");
    }
    Ok(())
}
