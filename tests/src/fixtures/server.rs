use actix_web::dev::{Server, ServerHandle};
use crossbuild_common::api::Client;
use crossbuild_common::errors::bail;
use crossbuild_worker::pipeline::Pipeline;
use crossbuildd::config::Config;
use crossbuildd::ledger::MemoryLedger;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub struct ServerHolder {
    server: Option<Server>,
    server_handle: Mutex<Option<ServerHandle>>,
    pub address: SocketAddr,
}

impl ServerHolder {
    pub fn new(
        config: Config,
        ledger: Arc<MemoryLedger>,
        pipeline: Pipeline,
    ) -> crossbuild_common::errors::Result<Self> {
        let (server, address) = crossbuildd::build_server(config, ledger, Arc::new(pipeline))?;

        Ok(Self {
            server: Some(server),
            server_handle: Mutex::default(),
            address,
        })
    }

    pub fn start(&mut self) -> crossbuild_common::errors::Result<()> {
        if let Some(server) = self.server.take() {
            let handle = server.handle();
            self.server_handle = Mutex::new(Some(handle));

            tokio::spawn(server);

            for _ in 0..100 {
                if TcpStream::connect(self.address).is_ok() {
                    return Ok(());
                }

                thread::sleep(Duration::from_millis(100));
            }

            bail!("Failed to wait for daemon to start");
        } else {
            bail!("can't start the server more than once")
        }
    }
}

impl Drop for ServerHolder {
    fn drop(&mut self) {
        if let Some(server_handle) = self.server_handle.lock().unwrap().as_ref() {
            #[allow(clippy::let_underscore_future)]
            let _ = server_handle.stop(true);
        }
    }
}

/// A daemon on a random port with its own workspace, archive directory and
/// in-memory ledger.
pub struct IsolatedServer {
    _server: ServerHolder,
    root: TempDir,
    pub ledger: Arc<MemoryLedger>,
    pub client: Client,
}

impl IsolatedServer {
    pub fn new(
        server: ServerHolder,
        root: TempDir,
        ledger: Arc<MemoryLedger>,
        client: Client,
    ) -> Self {
        Self {
            _server: server,
            root,
            ledger,
            client,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn archive(&self, filename: &str) -> PathBuf {
        self.root.path().join("archive").join(filename)
    }
}
