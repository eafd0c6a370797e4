// MCP (Model Context Protocol) server for the userbook record store
// Exposes user records to agent clients as tools and resources over stdio

pub mod config;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use config::McpConfig;
pub use server::McpServer;
