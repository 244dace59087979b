// Model Context Protocol adapter over the query engine

pub mod server;
pub mod tools;

pub use server::McpServer;
