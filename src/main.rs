use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod index;
mod indexer;
mod mcp;
mod query;

use config::Config;

#[derive(Parser)]
#[command(name = "prism")]
#[command(author = "Orbis Prism Team")]
#[command(version)]
#[command(about = "Symbol index over decompiled Java sources for AI agents via MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: String,

    /// Index namespace (defaults to the configured namespace)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index for a namespace from its decompiled sources
    Index {
        /// Reindex even when the sources are unchanged
        #[arg(short, long)]
        rebuild: bool,
    },

    /// Full-text search over types and methods
    Search {
        /// Search expression (FTS5 syntax)
        term: String,

        /// Maximum number of results (1-500)
        #[arg(short, long)]
        limit: Option<i64>,

        /// Restrict to a package and its subpackages
        #[arg(long)]
        package: Option<String>,

        /// Restrict to a type kind: class, interface, record, enum
        #[arg(short, long)]
        kind: Option<String>,

        /// One row per type, with a match count
        #[arg(long)]
        dedupe: bool,
    },

    /// Show a type and its methods
    Type {
        /// Qualified type name, e.g. com.example.Foo
        fqcn: String,
    },

    /// Show every overload of a method
    Member {
        /// Qualified type name
        fqcn: String,

        /// Method name
        member: String,
    },

    /// List types in a package
    List {
        /// Package name
        package: String,

        /// Only the package itself, without subpackages
        #[arg(long)]
        exact: bool,

        #[arg(short, long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,
    },

    /// Show the parent chain and interfaces of a type
    Hierarchy {
        /// Qualified type name
        fqcn: String,
    },

    /// Show index statistics
    Stats,

    /// List indexed namespaces
    Contexts,

    /// Print lines of a decompiled source file
    Source {
        /// Path relative to the namespace source root
        path: String,

        /// First line (1-based)
        #[arg(long)]
        start: Option<i64>,

        /// Last line (inclusive)
        #[arg(long)]
        end: Option<i64>,
    },

    /// Delete the index of a namespace
    Clean,

    /// Start MCP server on stdio
    Serve,
}

/// Logs always go to stderr: stdout carries MCP traffic and command output.
fn init_logging(debug: bool, verbose: bool, config: &Config) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format == "pretty" {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_project_dir(&cli.project);
    init_logging(cli.debug, cli.verbose, &config);

    info!("Prism v{} starting...", env!("CARGO_PKG_VERSION"));

    let Cli {
        command,
        project,
        namespace,
        json,
        ..
    } = cli;

    match command {
        Commands::Index { rebuild } => {
            cli::index::index_namespace(project, namespace, rebuild).await?;
        }

        Commands::Search {
            term,
            limit,
            package,
            kind,
            dedupe,
        } => {
            let args = cli::query::SearchArgs {
                term,
                limit,
                package,
                kind,
                dedupe,
            };
            cli::query::search(project, namespace, args, json).await?;
        }

        Commands::Type { fqcn } => {
            cli::query::get_type(project, namespace, fqcn, json).await?;
        }

        Commands::Member { fqcn, member } => {
            cli::query::get_member(project, namespace, fqcn, member, json).await?;
        }

        Commands::List {
            package,
            exact,
            limit,
            offset,
        } => {
            cli::query::list_types(project, namespace, package, exact, limit, offset, json).await?;
        }

        Commands::Hierarchy { fqcn } => {
            cli::query::hierarchy(project, namespace, fqcn, json).await?;
        }

        Commands::Stats => {
            cli::stats::show_stats(project, namespace, json).await?;
        }

        Commands::Contexts => {
            cli::query::contexts(project, json).await?;
        }

        Commands::Source { path, start, end } => {
            cli::query::read_source(project, namespace, path, start, end, json).await?;
        }

        Commands::Clean => {
            cli::index::clean_namespace(project, namespace).await?;
        }

        Commands::Serve => {
            info!("Starting MCP server for project: {}", project);
            cli::serve::serve_stdio(project).await?;
        }
    }

    Ok(())
}
