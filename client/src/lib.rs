//! Receive-only listener for the `/ws/notifications/` socket.
//!
//! A [`NotificationClient`] opens one WebSocket connection when
//! [`NotificationClient::initialize`] is called, decodes every text frame
//! into a [`NotificationPayload`] and hands its `message` to a
//! [`NotificationDisplay`]. Nothing is ever sent back and a closed client
//! stays closed.

pub mod client;
pub mod config;
pub mod display;

pub use client::{
    ClientError, ClientState, CloseEvent, FrameOutcome, NotificationClient, CLOSE_DIAGNOSTIC,
};
pub use config::{ClientConfig, DisplayMode};
pub use display::{AlertDisplay, NotificationDisplay, PrintDisplay};
pub use notify_common::{DecodeError, NotificationPayload, NOTIFICATION_PATH};
