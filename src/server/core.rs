use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::client::{ClientRegistry, Session, handle_client};
use crate::config::ServerConfig;
use crate::error::FtpServerError;
use crate::protocol::handle_auth_command;
use crate::protocol::{CommandStatus, parse_command};
use crate::protocol::responses::{READY, TOO_MANY_USERS, format_response};
use crate::storage::PermissionStore;
use crate::vfs::{ConfigLoader, Vfs, VirtualTree};

pub struct Server {
    client_registry: ClientRegistry,
    listener: TcpListener,
    tree: Arc<VirtualTree>,
    store: PermissionStore,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds the control socket, builds the virtual tree from the sharing
    /// file and opens the permission store.
    pub async fn new(config: ServerConfig) -> Result<Self, FtpServerError> {
        let socket = config.startup.control_socket();
        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => {
                info!("Server bound to {}", socket);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(e.into());
            }
        };

        let tree = ConfigLoader::load(&config.startup.shares_path())?;
        let store = PermissionStore::open(config.store.permission_db_path(), config.store_options())?;
        info!("Permission store: {}", store.path().display());

        if config.store.import_on_startup {
            import_shared_dirs(&tree, &store);
        }

        Ok(Self {
            client_registry: Arc::new(Mutex::new(HashMap::new())),
            listener,
            tree: Arc::new(tree),
            store,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FtpServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn start(&self) {
        info!(
            "Starting RAX VFS server on {} (max {} clients)",
            self.config.startup.control_socket(),
            self.config.startup.max_clients
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let client_registry = Arc::clone(&self.client_registry);
                    let config = Arc::clone(&self.config);
                    let vfs = self.new_vfs();

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) = handle_new_client(stream, addr, vfs, client_registry, config).await {
                            warn!("Failed to handle client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    /// Each connection walks its own copy of the tree over the shared store.
    fn new_vfs(&self) -> Vfs {
        let mut vfs = Vfs::new(VirtualTree::clone(&self.tree), self.store.clone());
        vfs.set_ignore_hidden(self.config.startup.ignore_hidden);
        vfs
    }
}

/// Adds default records for the entries of every bound directory.
fn import_shared_dirs(tree: &VirtualTree, store: &PermissionStore) {
    for id in tree.bound_nodes() {
        let Some(dir) = tree.node(id).physical() else {
            continue;
        };
        match store.bulk_import(dir) {
            Ok(added) => debug!("Imported {} records from {}", added, dir.display()),
            Err(e) => warn!("Import of {} failed: {}", dir.display(), e),
        }
    }
}

/// Handles a new client: greets, authenticates, registers, and hands off
/// to the session handler.
async fn handle_new_client(
    stream: TcpStream,
    client_addr: SocketAddr,
    vfs: Vfs,
    client_registry: ClientRegistry,
    config: Arc<ServerConfig>,
) -> Result<(), std::io::Error> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    write_half
        .write_all(format_response(READY, "Welcome to RAX VFS Server").as_bytes())
        .await?;
    write_half.flush().await?;

    let mut session = Session::new(vfs);

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "Client disconnected during authentication",
            ));
        }
        if line.len() > config.startup.max_command_length {
            write_half.write_all(b"500 Command too long\r\n").await?;
            continue;
        }

        let command = parse_command(&line);
        let result = handle_auth_command(&mut session, &command, &config);

        if let Some(msg) = result.message {
            write_half.write_all(msg.as_bytes()).await?;
        }
        if result.status == CommandStatus::CloseConnection {
            return Ok(());
        }

        if session.is_logged_in() {
            let mut clients = client_registry.lock().await;

            if clients.len() >= config.startup.max_clients {
                write_half
                    .write_all(
                        format_response(TOO_MANY_USERS, "Too many connections. Try again later.").as_bytes(),
                    )
                    .await?;
                return Ok(()); // Close connection
            }

            clients.insert(client_addr, session.actor().clone());

            info!(
                "Authenticated client: {} as {} ({}/{} clients)",
                client_addr,
                session.actor(),
                clients.len(),
                config.startup.max_clients
            );

            drop(clients);

            // Hand off to session handler
            handle_client(reader, write_half, session, client_registry, client_addr, config).await;

            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StartupConfig, StoreConfig};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn config(base: &Path, max_clients: usize) -> ServerConfig {
        ServerConfig {
            startup: StartupConfig {
                bind_address: "127.0.0.1".into(),
                control_port: 0,
                max_clients,
                max_command_length: 512,
                max_username_length: 32,
                shares_file: base.join("shares.conf").display().to_string(),
                anonymous_allowed: true,
                ignore_hidden: true,
            },
            store: StoreConfig {
                permission_db: base.join("perms.db").display().to_string(),
                import_on_startup: true,
                lock_retry_interval_ms: 1,
                lock_attempts: 50,
                compaction_threshold: 50,
            },
        }
    }

    fn layout() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        fs::create_dir_all(base.join("root")).unwrap();
        fs::create_dir_all(base.join("pub")).unwrap();
        fs::write(base.join("pub/hello.txt"), b"hi").unwrap();
        fs::write(
            base.join("shares.conf"),
            format!(
                "{}\n{} /pub none 0 1\n",
                base.join("root").display(),
                base.join("pub").display()
            ),
        )
        .unwrap();
        tmp
    }

    async fn start(config: ServerConfig) -> SocketAddr {
        let server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.start().await });
        addr
    }

    async fn send(
        reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        line: &str,
    ) -> String {
        writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn login_and_walk_over_tcp() {
        let tmp = layout();
        let addr = start(config(tmp.path(), 4)).await;

        let (read_half, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut reader = BufReader::new(read_half);
        let mut greeting = String::new();
        reader.read_line(&mut greeting).await.unwrap();
        assert!(greeting.starts_with("220"));

        assert!(send(&mut reader, &mut writer, "PWD").await.starts_with("530"));
        assert!(send(&mut reader, &mut writer, "USER anonymous").await.starts_with("331"));
        assert!(send(&mut reader, &mut writer, "PASS me@example.org").await.starts_with("230"));
        assert!(send(&mut reader, &mut writer, "CWD pub").await.starts_with("250"));
        assert_eq!(
            send(&mut reader, &mut writer, "PWD").await,
            "257 \"/pub\" is current directory.\r\n"
        );
        assert_eq!(send(&mut reader, &mut writer, "SIZE hello.txt").await, "213 2\r\n");
        assert!(send(&mut reader, &mut writer, "QUIT").await.starts_with("221"));

        // Startup import recorded the shared file.
        let store = PermissionStore::open(tmp.path().join("perms.db"), Default::default()).unwrap();
        assert!(store.get(&tmp.path().join("pub/hello.txt")).is_ok());
    }

    #[tokio::test]
    async fn refuses_clients_beyond_limit() {
        let tmp = layout();
        let addr = start(config(tmp.path(), 1)).await;

        let (first_read, mut first_writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut first = BufReader::new(first_read);
        let mut greeting = String::new();
        first.read_line(&mut greeting).await.unwrap();
        send(&mut first, &mut first_writer, "USER bob").await;
        assert!(send(&mut first, &mut first_writer, "PASS bob123").await.starts_with("230"));

        let (second_read, mut second_writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut second = BufReader::new(second_read);
        greeting.clear();
        second.read_line(&mut greeting).await.unwrap();
        send(&mut second, &mut second_writer, "USER alice").await;
        second_writer.write_all(b"PASS alice123\r\n").await.unwrap();

        let mut rest = String::new();
        second.read_to_string(&mut rest).await.unwrap();
        assert!(rest.starts_with("230"));
        assert!(rest.contains("421"));
    }
}
