use futures_util::{pin_mut, Stream, StreamExt};
use log::{debug, error, info, warn};
use notify_common::{DecodeError, NotificationPayload, NOTIFICATION_PATH};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame, Message};
use url::Url;

use crate::config::ClientConfig;
use crate::display::NotificationDisplay;

/// Close code reported when the connection ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame that carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Logged at error level, once per client, when the socket closes.
pub const CLOSE_DIAGNOSTIC: &str = "Notification socket closed unexpectedly";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("notification client already initialized")]
    AlreadyInitialized,
    #[error("invalid notification endpoint for host {host:?}: {reason}")]
    InvalidEndpoint { host: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    /// A close frame was received before the connection ended.
    pub was_clean: bool,
}

impl CloseEvent {
    pub fn abnormal() -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
            was_clean: false,
        }
    }

    fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self {
                code: frame.code.into(),
                reason: frame.reason.into_owned(),
                was_clean: true,
            },
            None => Self {
                code: NO_STATUS_RECEIVED,
                reason: String::new(),
                was_clean: true,
            },
        }
    }
}

/// What happened to a single inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    Displayed,
    Rejected(DecodeError),
    /// Binary frame; notifications are text only.
    Unsupported,
    /// Control frame, or the client was not open.
    Ignored,
}

/// Receive-only listener on the notification socket.
pub struct NotificationClient<D> {
    config: ClientConfig,
    display: D,
    state: ClientState,
}

impl<D: NotificationDisplay> NotificationClient<D> {
    pub fn new(config: ClientConfig, display: D) -> Self {
        Self {
            config,
            display,
            state: ClientState::Idle,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_display(self) -> D {
        self.display
    }

    /// `ws://<host>/ws/notifications/`
    pub fn endpoint(&self) -> Result<Url, ClientError> {
        let host = self.config.host.trim();
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            host: self.config.host.clone(),
            reason,
        };
        if host.is_empty() {
            return Err(invalid("host is empty".to_string()));
        }

        let url = Url::parse(&format!("ws://{}{}", host, NOTIFICATION_PATH))
            .map_err(|e| invalid(e.to_string()))?;
        // Anything beyond an authority would leak into the path or query.
        if url.path() != NOTIFICATION_PATH
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
            || url.password().is_some()
        {
            return Err(invalid("expected host[:port] only".to_string()));
        }
        Ok(url)
    }

    /// Connects and listens until the socket closes. One-shot: a client
    /// that has been started cannot be started again.
    ///
    /// A failed handshake is not an error here; it closes the client the
    /// same way a dropped connection does.
    pub async fn initialize(&mut self) -> Result<CloseEvent, ClientError> {
        if self.state != ClientState::Idle {
            return Err(ClientError::AlreadyInitialized);
        }
        let endpoint = match self.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.state = ClientState::Closed;
                return Err(e);
            }
        };

        self.state = ClientState::Connecting;
        info!("Connecting to {}", endpoint);
        match tokio_tungstenite::connect_async(endpoint.as_str()).await {
            Ok((ws_stream, _)) => self.run_stream(ws_stream).await,
            Err(e) => {
                debug!("Notification handshake with {} failed: {}", endpoint, e);
                let event = CloseEvent::abnormal();
                self.on_close(&event);
                Ok(event)
            }
        }
    }

    /// Pumps an already-open frame stream until it ends, then closes.
    pub async fn run_stream<S>(&mut self, stream: S) -> Result<CloseEvent, ClientError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>,
    {
        if matches!(self.state, ClientState::Open | ClientState::Closed) {
            return Err(ClientError::AlreadyInitialized);
        }
        pin_mut!(stream);
        self.state = ClientState::Open;
        info!("Notification socket open");

        let mut closing = None;
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(frame)) => {
                    let event = CloseEvent::from_frame(frame);
                    debug!("Close frame received: {:?}", event);
                    closing = Some(event);
                }
                Ok(frame) => {
                    self.on_message(frame);
                }
                Err(e) => {
                    debug!("Notification socket error: {}", e);
                    break;
                }
            }
        }

        let event = closing.unwrap_or_else(CloseEvent::abnormal);
        self.on_close(&event);
        Ok(event)
    }

    pub fn on_message(&mut self, frame: Message) -> FrameOutcome {
        if self.state != ClientState::Open {
            debug!("Ignoring frame while {:?}", self.state);
            return FrameOutcome::Ignored;
        }
        match frame {
            Message::Text(text) => match NotificationPayload::decode(&text) {
                Ok(payload) => {
                    self.display.show(payload.message());
                    FrameOutcome::Displayed
                }
                Err(e) => {
                    warn!("Dropping malformed notification: {}", e);
                    FrameOutcome::Rejected(e)
                }
            },
            Message::Binary(data) => {
                warn!("Ignoring binary notification frame ({} bytes)", data.len());
                FrameOutcome::Unsupported
            }
            _ => FrameOutcome::Ignored,
        }
    }

    /// Records the closure. Returns `false` if the client was already
    /// closed, in which case nothing is logged.
    pub fn on_close(&mut self, event: &CloseEvent) -> bool {
        if self.state == ClientState::Closed {
            return false;
        }
        self.state = ClientState::Closed;
        debug!(
            "Notification socket closed: code={} reason={:?} clean={}",
            event.code, event.reason, event.was_clean
        );
        error!("{}", CLOSE_DIAGNOSTIC);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use log::{Level, Log, Metadata, Record};
    use std::cell::RefCell;
    use std::sync::Once;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
    }

    // Keeps records per thread so parallel tests don't see each other's logs.
    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.with(|records| {
                records
                    .borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INIT_LOGGER: Once = Once::new();

    fn capture_logs() {
        INIT_LOGGER.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(log::LevelFilter::Trace);
        });
        RECORDS.with(|records| records.borrow_mut().clear());
    }

    fn logged_errors() -> Vec<String> {
        RECORDS.with(|records| {
            records
                .borrow()
                .iter()
                .filter(|(level, _)| *level == Level::Error)
                .map(|(_, text)| text.clone())
                .collect()
        })
    }

    #[derive(Default)]
    struct Recorder(Vec<Option<String>>);

    impl NotificationDisplay for Recorder {
        fn show(&mut self, message: Option<&str>) {
            self.0.push(message.map(str::to_owned));
        }
    }

    fn client(host: &str) -> NotificationClient<Recorder> {
        NotificationClient::new(ClientConfig::new(host), Recorder::default())
    }

    fn open_client() -> NotificationClient<Recorder> {
        let mut client = client("localhost");
        client.state = ClientState::Open;
        client
    }

    fn frames(list: Vec<Message>) -> impl Stream<Item = Result<Message, tungstenite::Error>> {
        stream::iter(list.into_iter().map(Ok))
    }

    #[test]
    fn endpoint_uses_fixed_path() {
        let url = client("example.com:8000").endpoint().unwrap();
        assert_eq!(url.as_str(), "ws://example.com:8000/ws/notifications/");

        let url = client("localhost").endpoint().unwrap();
        assert_eq!(url.as_str(), "ws://localhost/ws/notifications/");
    }

    #[test]
    fn endpoint_rejects_non_authority_hosts() {
        for host in ["", "  ", "example.com/other", "example.com?x=1", "user@example.com", "bad host"] {
            assert!(
                matches!(client(host).endpoint(), Err(ClientError::InvalidEndpoint { .. })),
                "{host:?}"
            );
        }
    }

    #[test]
    fn message_is_displayed_once() {
        let mut client = open_client();
        let outcome = client.on_message(Message::text(r#"{"message":"Build finished"}"#));
        assert!(matches!(outcome, FrameOutcome::Displayed));
        assert_eq!(client.display().0, vec![Some("Build finished".to_string())]);
    }

    #[test]
    fn missing_message_displays_absent_value() {
        let mut client = open_client();
        let outcome = client.on_message(Message::text(r#"{"level":"info"}"#));
        assert!(matches!(outcome, FrameOutcome::Displayed));
        assert_eq!(client.display().0, vec![None]);
    }

    #[test]
    fn malformed_frame_is_not_displayed() {
        let mut client = open_client();
        assert!(matches!(
            client.on_message(Message::text("{not json")),
            FrameOutcome::Rejected(DecodeError::Json(_))
        ));
        assert!(matches!(
            client.on_message(Message::text("[]")),
            FrameOutcome::Rejected(DecodeError::NotAnObject)
        ));
        assert!(client.display().0.is_empty());
        assert_eq!(client.state(), ClientState::Open);
    }

    #[test]
    fn binary_and_control_frames_are_skipped() {
        let mut client = open_client();
        assert!(matches!(
            client.on_message(Message::Binary(br#"{"message":"x"}"#.to_vec())),
            FrameOutcome::Unsupported
        ));
        assert!(matches!(
            client.on_message(Message::Ping(Vec::new())),
            FrameOutcome::Ignored
        ));
        assert!(client.display().0.is_empty());
    }

    #[test]
    fn frames_before_open_are_ignored() {
        let mut client = client("localhost");
        assert!(matches!(
            client.on_message(Message::text(r#"{"message":"early"}"#)),
            FrameOutcome::Ignored
        ));
        assert!(client.display().0.is_empty());
    }

    #[test]
    fn close_is_reported_once() {
        let mut client = open_client();
        assert!(client.on_close(&CloseEvent::abnormal()));
        assert!(!client.on_close(&CloseEvent::abnormal()));
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn close_diagnostic_is_logged_exactly_once() {
        capture_logs();
        let mut client = client("localhost");
        let close = client
            .run_stream(frames(vec![
                Message::text("[]"),
                Message::text("42"),
                Message::text(r#"{"message":{"a":1}}"#),
                Message::Close(None),
            ]))
            .await
            .unwrap();
        assert!(!client.on_close(&close));

        assert_eq!(logged_errors(), vec![CLOSE_DIAGNOSTIC.to_string()]);
        assert_eq!(CLOSE_DIAGNOSTIC, "Notification socket closed unexpectedly");
        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(client.display().0, vec![Some(r#"{"a":1}"#.to_string())]);
    }

    #[tokio::test]
    async fn messages_are_displayed_in_arrival_order() {
        let mut client = client("localhost");
        let close = client
            .run_stream(frames(vec![
                Message::text(r#"{"message":"A"}"#),
                Message::text("garbage"),
                Message::text(r#"{"message":"B"}"#),
            ]))
            .await
            .unwrap();

        assert_eq!(close, CloseEvent::abnormal());
        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(
            client.into_display().0,
            vec![Some("A".to_string()), Some("B".to_string())]
        );
    }

    #[tokio::test]
    async fn close_frame_is_reported_as_clean() {
        let mut client = client("localhost");
        let close = client
            .run_stream(frames(vec![
                Message::text(r#"{"message":"bye"}"#),
                Message::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "shutting down".into(),
                })),
            ]))
            .await
            .unwrap();

        assert_eq!(close.code, 1001);
        assert_eq!(close.reason, "shutting down");
        assert!(close.was_clean);
    }

    #[tokio::test]
    async fn empty_close_frame_has_no_status() {
        let mut client = client("localhost");
        let close = client
            .run_stream(frames(vec![Message::Close(None)]))
            .await
            .unwrap();
        assert_eq!(close.code, NO_STATUS_RECEIVED);
        assert!(close.was_clean);
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let mut client = client("localhost");
        let items: Vec<Result<Message, tungstenite::Error>> = vec![
            Ok(Message::text(r#"{"message":"first"}"#)),
            Err(tungstenite::Error::ConnectionClosed),
            Ok(Message::text(r#"{"message":"never"}"#)),
        ];
        let close = client.run_stream(stream::iter(items)).await.unwrap();

        assert_eq!(close, CloseEvent::abnormal());
        assert_eq!(client.display().0, vec![Some("first".to_string())]);
    }

    #[tokio::test]
    async fn client_cannot_be_restarted() {
        let mut client = client("localhost");
        client.run_stream(frames(Vec::new())).await.unwrap();

        assert!(matches!(
            client.run_stream(frames(Vec::new())).await,
            Err(ClientError::AlreadyInitialized)
        ));
        assert!(matches!(
            client.initialize().await,
            Err(ClientError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn invalid_endpoint_closes_without_connecting() {
        let mut client = client("");
        assert!(matches!(
            client.initialize().await,
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert_eq!(client.state(), ClientState::Closed);
        assert!(matches!(
            client.initialize().await,
            Err(ClientError::AlreadyInitialized)
        ));
    }
}
