use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::mcp::McpServer;
use crate::query::QueryEngine;

/// Start MCP server with stdio transport. Nothing but protocol messages may go to stdout.
pub async fn serve_stdio(project: String) -> Result<()> {
    let config = Config::from_project_dir(&project);
    info!("MCP server (stdio) for project: {}", project);

    let engine = QueryEngine::new(config);
    match engine.context_list() {
        Ok(contexts) if contexts.indexed.is_empty() => {
            warn!("No namespaces indexed. Run 'prism index --project {}' first.", project);
        }
        Ok(contexts) => info!("Indexed namespaces: {}", contexts.indexed.join(", ")),
        Err(e) => warn!("Could not list indexed namespaces: {}", e),
    }

    McpServer::new(engine).run().await
}
