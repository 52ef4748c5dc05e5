use std::env;

use log::info;
use notify_client::{
    AlertDisplay, ClientConfig, ClientError, CloseEvent, DisplayMode, NotificationClient,
    NotificationDisplay, PrintDisplay,
};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let _ = env_logger::try_init();
    let config = ClientConfig::from_args(env::args().skip(1));
    info!("Listening for notifications from {}", config.host);

    let mode = config.display;
    let close = match mode {
        DisplayMode::Alert => listen(config, AlertDisplay::stdio()).await?,
        DisplayMode::Print => listen(config, PrintDisplay::stdout()).await?,
    };
    info!("Listener stopped (code {})", close.code);
    Ok(())
}

async fn listen<D: NotificationDisplay>(
    config: ClientConfig,
    display: D,
) -> Result<CloseEvent, ClientError> {
    let mut client = NotificationClient::new(config, display);
    client.initialize().await
}
