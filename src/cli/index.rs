use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::Config;
use crate::indexer::{IndexOutcome, Indexer};

pub async fn index_namespace(project: String, namespace: Option<String>, rebuild: bool) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let namespace = config.resolve_namespace(namespace.as_deref())?;

    info!("Indexing namespace '{}' of project {}", namespace, project);
    println!("Prism Indexer v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project);
    println!("Namespace: {}", namespace);
    println!("Sources: {}", config.source_dir(&namespace).display());
    println!("Database: {}", config.db_path(&namespace).display());

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} files ({eta})")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );

    let indexer = Indexer::new(config);
    let ns = namespace.clone();
    let bar = progress.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        indexer.index_namespace_with_progress(&ns, rebuild, |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        })
    })
    .await
    .context("indexing task panicked")?;
    progress.finish_and_clear();

    match outcome? {
        IndexOutcome::Indexed(summary) => {
            println!("\nIndexing complete!");
            println!("Types: {}", summary.type_count);
            println!("Methods: {}", summary.member_count);
            println!("Files: {} indexed, {} skipped", summary.files_indexed, summary.files_skipped);
        }
        IndexOutcome::Unchanged(summary) => {
            println!("\nSources unchanged since {}; index is up to date.", summary.indexed_at);
            println!("Types: {}", summary.type_count);
            println!("Methods: {}", summary.member_count);
            println!("Run with --rebuild to force a full reindex.");
        }
        IndexOutcome::NothingToIndex => {
            eprintln!("\nNo source files found for namespace '{}'.", namespace);
            eprintln!("Decompile into the sources directory above, then run this again.");
            std::process::exit(2);
        }
    }

    Ok(())
}

pub async fn clean_namespace(project: String, namespace: Option<String>) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let namespace = config.resolve_namespace(namespace.as_deref())?;

    let removed = Indexer::new(config).remove_namespace(&namespace)?;
    if removed {
        println!("Removed index for namespace '{}'", namespace);
    } else {
        println!("Namespace '{}' has no index", namespace);
    }

    Ok(())
}
