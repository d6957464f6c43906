//! TCP stream server.
//!
//! Accepts instrument-protocol connections and runs one task per client.
//! Each task forwards inbound chunks to the device's `handle` and writes the
//! reply back; it also drains the device's trigger channel so unsolicited
//! payloads reach the connected client. The trigger receiver is shared
//! behind an async mutex, so exactly one client drains it at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::device::StreamDevice;

type SharedTrigger = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

pub struct StreamServer {
    listener: TcpListener,
    device: Arc<StreamDevice>,
    triggered: SharedTrigger,
}

impl StreamServer {
    pub async fn bind(
        addr: &str,
        device: Arc<StreamDevice>,
        triggered: mpsc::Receiver<Vec<u8>>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind stream listener on {addr}"))?;
        info!(%addr, "stream server listening");
        Ok(Self {
            listener,
            device,
            triggered: Arc::new(Mutex::new(triggered)),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    let device = self.device.clone();
                    let triggered = self.triggered.clone();
                    tokio::spawn(async move {
                        info!(%addr, "client connected");
                        if let Err(e) = handle_client(socket, device, triggered).await {
                            warn!(%addr, error = %e, "client error");
                        }
                        info!(%addr, "client disconnected");
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
}

async fn handle_client(
    mut socket: TcpStream,
    device: Arc<StreamDevice>,
    triggered: SharedTrigger,
) -> Result<()> {
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            read = socket.read(&mut buf) => {
                let n = read.context("socket read failed")?;
                if n == 0 {
                    return Ok(());
                }
                let reply = device.handle(&buf[..n]).await;
                if !reply.is_empty() {
                    socket.write_all(&reply).await.context("socket write failed")?;
                }
            }
            payload = recv_triggered(&triggered) => {
                match payload {
                    Some(bytes) => socket.write_all(&bytes).await.context("trigger write failed")?,
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn recv_triggered(triggered: &SharedTrigger) -> Option<Vec<u8>> {
    triggered.lock().await.recv().await
}
