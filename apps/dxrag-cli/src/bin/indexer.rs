use std::{env, path::PathBuf};
use tracing_subscriber::EnvFilter;

use dxrag_core::config::Config;
use dxrag_vector::IndexManager;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let mut settings = config.settings()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut force = false;
    for arg in &args {
        match arg.as_str() {
            "--force" | "-f" => force = true,
            a if !a.starts_with('-') => settings.data.docs_dir = PathBuf::from(a),
            a => anyhow::bail!("unknown flag {a} (usage: dxrag-indexer [--force] [DOCS_DIR])"),
        }
    }

    println!("Document Indexer\n================");
    println!("Docs directory:  {}", settings.data.docs_dir.display());
    println!("Index directory: {}", settings.data.index_dir.display());
    if force {
        println!("⚠️  Forcing a rebuild (--force)");
    }

    let manager = IndexManager::new(&settings);
    let loaded = tokio::runtime::Runtime::new()?.block_on(async {
        if force {
            manager.rebuild(&settings.data.docs_dir, &settings.data.index_dir).await
        } else {
            manager.load_or_build(&settings.data.docs_dir, &settings.data.index_dir).await
        }
    })?;

    println!("\n✅ Indexing completed ({:?})", loaded.origin);
    println!("📊 {} chunks, fingerprint {}", loaded.index.len(), loaded.fingerprint);
    println!("\n💡 To query the index, use: cargo run --bin dxrag -- retrieve '<query>'");
    Ok(())
}
