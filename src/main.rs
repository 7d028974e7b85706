//! RAX VFS Server - Entry Point
//!
//! An FTP control server that shares several physical directories as one
//! virtual tree, with per-file ownership kept in a permission store.

use log::info;

use rax_vfs_server::Server;
use rax_vfs_server::config::ServerConfig;
use rax_vfs_server::error::FtpServerError;
use rax_vfs_server::error::handlers::handle_error;

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    info!("Launching VFS server...");

    if let Err(e) = run().await {
        handle_error(&e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FtpServerError> {
    let config = ServerConfig::load()?;
    let server = Server::new(config).await?;
    server.start().await;
    Ok(())
}
