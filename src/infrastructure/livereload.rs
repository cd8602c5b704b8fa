use crate::core::interfaces::RebuildTarget;
use crate::utils::{BuildError, Logger, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Messages of the live-reload protocol
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum LiveReloadMessage {
    Hello {
        protocols: Vec<String>,
        #[serde(rename = "serverName")]
        server_name: String,
    },
    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
    },
}

#[derive(Debug, Clone)]
pub struct LiveReloadClient {
    pub id: String,
    pub connected_at: std::time::SystemTime,
}

/// WebSocket server telling connected browsers to reload
pub struct LiveReloadServer {
    addr: SocketAddr,
    sender: broadcast::Sender<String>,
    clients: Arc<DashMap<String, LiveReloadClient>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveReloadServer {
    /// Bind on localhost; port 0 picks a free port
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        let (sender, _) = broadcast::channel(64);
        let clients: Arc<DashMap<String, LiveReloadClient>> = Arc::new(DashMap::new());

        let accept_sender = sender.clone();
        let accept_clients = clients.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                // Subscribe before the handshake so no reload after the hello is missed
                let updates = accept_sender.subscribe();
                let clients = accept_clients.clone();
                tokio::spawn(async move {
                    if let Err(e) = Self::handle_client(stream, clients, updates).await {
                        Logger::warn(&format!("Live-reload client error {}: {}", peer, e));
                    }
                });
            }
        });

        Logger::info(&format!("🔁 Live reload listening on ws://{}", addr));
        Ok(Self {
            addr,
            sender,
            clients,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Broadcast a reload; returns how many clients were notified
    pub fn reload(&self, path: &Path) -> usize {
        let message = LiveReloadMessage::Reload {
            path: path.display().to_string(),
            live_css: true,
        };
        match serde_json::to_string(&message) {
            Ok(text) => self.sender.send(text).unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Stop accepting connections and forget connected clients
    pub fn stop(&self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
            Logger::debug(&format!("Live reload stopped with {} client(s) connected", self.clients.len()));
            self.clients.clear();
        }
    }

    async fn handle_client(
        stream: tokio::net::TcpStream,
        clients: Arc<DashMap<String, LiveReloadClient>>,
        mut updates: broadcast::Receiver<String>,
    ) -> Result<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| BuildError::Watch(format!("WebSocket handshake failed: {}", e)))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let client_id = Uuid::new_v4().to_string();
        clients.insert(
            client_id.clone(),
            LiveReloadClient {
                id: client_id.clone(),
                connected_at: std::time::SystemTime::now(),
            },
        );
        tracing::debug!("🔌 Live-reload client connected: {}", client_id);

        let hello = LiveReloadMessage::Hello {
            protocols: vec!["http://livereload.com/protocols/official-7".to_string()],
            server_name: "kiln".to_string(),
        };
        if let Ok(text) = serde_json::to_string(&hello) {
            let _ = ws_sender.send(Message::Text(text)).await;
        }

        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(text) => {
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = ws_receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                },
            }
        }

        clients.remove(&client_id);
        tracing::debug!("🔌 Live-reload client disconnected: {}", client_id);
        Ok(())
    }
}

impl Drop for LiveReloadServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watch target that turns settled output changes into one browser reload
pub struct LiveReloadNotifier {
    server: Arc<LiveReloadServer>,
}

impl LiveReloadNotifier {
    pub fn new(server: Arc<LiveReloadServer>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl RebuildTarget for LiveReloadNotifier {
    async fn rebuild(&mut self, changed: &[PathBuf]) -> Result<()> {
        let path = changed.first().map(PathBuf::as_path).unwrap_or(Path::new("/"));
        let notified = self.server.reload(path);
        Logger::debug(&format!("🔁 Reload sent to {} clients", notified));
        Ok(())
    }
}
