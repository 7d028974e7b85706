use log::{error, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::client::Session;
use crate::config::ServerConfig;
use crate::protocol::handle_command;
use crate::protocol::{CommandStatus, parse_command};
use crate::vfs::Actor;

/// Logged-in connections and who they act as.
pub type ClientRegistry = Arc<Mutex<HashMap<SocketAddr, Actor>>>;

/// Handles an authenticated FTP session using Tokio async runtime.
///
/// - Reads command lines from the client.
/// - Dispatches commands using `handle_command` against the session's own
///   virtual filesystem.
/// - Removes the client from `clients` when the session ends.
pub async fn handle_client<R, W>(
    mut reader: R,
    mut writer: W,
    mut session: Session,
    clients: ClientRegistry,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                // Client closed the connection
                info!("Connection closed by client {}", client_addr);
                break;
            }
            Ok(_) => {
                // Enforce command length limit
                if line.len() > config.startup.max_command_length {
                    let _ = writer.write_all(b"500 Command too long\r\n").await;
                    continue;
                }

                let trimmed = line.trim_end_matches(['\r', '\n']);
                let command = parse_command(trimmed);
                info!("Received from {}: {:?}", client_addr, &command);

                let result = handle_command(&mut session, &command, &config);

                match result.status {
                    CommandStatus::CloseConnection => {
                        if let Some(msg) = result.message {
                            let _ = writer.write_all(msg.as_bytes()).await;
                        }
                        info!("Client {} requested to quit", client_addr);
                        break;
                    }
                    CommandStatus::Success => {
                        if let Some(msg) = result.message {
                            info!("Sending response to client {}: {}", client_addr, msg.trim());
                            if writer.write_all(msg.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                    CommandStatus::Failure(reason) => {
                        info!("Command from {} failed: {}", client_addr, reason);
                        if let Some(msg) = result.message {
                            if writer.write_all(msg.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to read from {}: {}", client_addr, e);
                break;
            }
        }
    }

    let mut clients_guard = clients.lock().await;
    clients_guard.remove(&client_addr);
    info!("Client {} disconnected ({} left)", client_addr, clients_guard.len());
}
