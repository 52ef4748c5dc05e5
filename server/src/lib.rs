//! Development publisher for the notification socket.
//!
//! Accepts WebSocket upgrades on [`NOTIFICATION_PATH`] and fans every
//! published notification out to all connected subscribers.

use std::{io, net::SocketAddr};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use notify_common::{NotificationPayload, NOTIFICATION_PATH};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_tungstenite::tungstenite::{
    self,
    handshake::server::{ErrorResponse, Request, Response},
    http::StatusCode,
    protocol::Message,
};

pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum Event {
    Notify(String),
    Close,
}

/// Cloneable handle used to push notifications to every subscriber.
#[derive(Clone)]
pub struct Publisher {
    tx: broadcast::Sender<Event>,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes `{"message": message}`. Returns how many subscribers it
    /// was queued for.
    pub fn publish(&self, message: impl Into<String>) -> serde_json::Result<usize> {
        self.publish_payload(&NotificationPayload::new(message))
    }

    pub fn publish_payload(&self, payload: &NotificationPayload) -> serde_json::Result<usize> {
        let text = serde_json::to_string(payload)?;
        Ok(self.tx.send(Event::Notify(text)).unwrap_or(0))
    }

    /// Asks every open subscriber connection to send a close frame.
    pub fn close_all(&self) -> usize {
        self.tx.send(Event::Close).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Binds a listener with `SO_REUSEADDR` so a restarted publisher can take
/// the port back straight away.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

pub async fn serve(listener: TcpListener, publisher: Publisher) -> io::Result<()> {
    info!("Listening on: {}", listener.local_addr()?);

    while let Ok((stream, addr)) = listener.accept().await {
        tokio::spawn(accept_connection(stream, addr, publisher.clone()));
    }

    Ok(())
}

async fn accept_connection(stream: TcpStream, addr: SocketAddr, publisher: Publisher) {
    debug!("Peer address: {}", addr);
    if let Err(e) = handle_connection(stream, addr, publisher).await {
        warn!("Subscriber {} dropped: {}", addr, e);
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    publisher: Publisher,
) -> Result<(), tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
    let mut events = publisher.tx.subscribe();
    info!("New subscriber: {}", addr);

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(Event::Notify(text)) => write.send(Message::text(text)).await?,
                Ok(Event::Close) | Err(RecvError::Closed) => {
                    write.send(Message::Close(None)).await?;
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber {} lagged, skipped {} notifications", addr, skipped)
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    info!("Subscriber {} disconnected", addr);
                    return Ok(());
                }
                Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                    warn!("Ignoring inbound frame from {} ({} bytes)", addr, msg.len())
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
        }
    }

    // Let the subscriber answer our close frame.
    while let Some(msg) = read.next().await {
        if let Err(e) = msg {
            debug!("Close handshake with {} ended: {}", addr, e);
            break;
        }
    }
    info!("Subscriber {} closed", addr);
    Ok(())
}

fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if path == NOTIFICATION_PATH {
        return Ok(response);
    }
    debug!("Rejecting upgrade for {}", path);
    let mut rejection = ErrorResponse::new(Some(format!("no notification socket at {}", path)));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}
