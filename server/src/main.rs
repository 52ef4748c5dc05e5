use std::{
    env,
    io::{Error, ErrorKind},
    net::SocketAddr,
    time::Duration,
};

use log::info;
use notify_server::{bind, serve, Publisher};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = env_logger::try_init();
    let addr = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;

    let listener = bind(addr)?;
    let publisher = Publisher::default();
    tokio::spawn(serve(listener, publisher.clone()));

    // Every non-empty line on stdin becomes one notification.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let delivered = publisher.publish(line)?;
        info!("Published to {} subscriber(s): {}", delivered, line);
    }

    let closing = publisher.close_all();
    info!("stdin closed, closing {} subscriber(s)", closing);
    // Give the connection tasks a moment to finish their close handshakes.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
