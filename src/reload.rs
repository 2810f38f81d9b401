//! Live-reload hub.
//!
//! Browsers viewing the dev server open a WebSocket to the reload port (the
//! dev server injects the client script into served HTML). After a watch
//! pipeline finishes, [`ReloadHub::notify`] broadcasts a `reload` frame and
//! every connected tab refreshes itself.

use crate::log;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
};
use tungstenite::{Message, WebSocket};

/// Broadcasts reload signals to connected browser tabs.
pub struct ReloadHub {
    clients: Mutex<Vec<WebSocket<TcpStream>>>,
}

impl ReloadHub {
    /// Bind the reload port and start accepting WebSocket clients.
    pub fn start(addr: SocketAddr) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("Failed to bind reload port {addr}"))?;
        let hub = Arc::new(Self {
            clients: Mutex::new(Vec::new()),
        });

        let accept_hub = Arc::clone(&hub);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                match tungstenite::accept(stream) {
                    Ok(ws) => accept_hub.clients.lock().push(ws),
                    Err(err) => log!("reload"; "handshake failed: {err}"),
                }
            }
        });

        log!("reload"; "ws://{addr}");
        Ok(hub)
    }

    /// Tell every connected tab to refresh. Dead sockets are pruned.
    pub fn notify(&self) {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain_mut(|ws| ws.send(Message::text("reload")).is_ok());

        if before > 0 {
            log!("reload"; "notified {} tabs", clients.len());
        }
    }
}
