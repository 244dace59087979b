use anyhow::Result;
use std::path::Path;

use super::emit;
use crate::config::Config;
use crate::query::QueryEngine;

pub async fn show_stats(project: String, namespace: Option<String>, json: bool) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let engine = QueryEngine::new(config.clone());

    emit(engine.stats(namespace.as_deref()), json, |stats| {
        println!("Prism Statistics v{}", env!("CARGO_PKG_VERSION"));
        println!("Project: {}", project);
        println!("Namespace: {}", stats.namespace);

        println!("\nIndex Statistics:");
        println!("  Types: {}", stats.type_count);
        println!("  Methods: {}", stats.member_count);
        if let Some(files) = stats.files_indexed {
            println!("  Files: {}", files);
        }
        if let Some(indexed_at) = &stats.indexed_at {
            println!("  Indexed at: {}", indexed_at);
        }
        if let Some(size) = db_size_mb(&config.db_path(&stats.namespace)) {
            println!("  Index size: {:.2} MB", size);
        }
    })
}

fn db_size_mb(db_path: &Path) -> Option<f64> {
    let metadata = std::fs::metadata(db_path).ok()?;
    Some(metadata.len() as f64 / (1024.0 * 1024.0))
}
