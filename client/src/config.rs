use log::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Show each notification and wait for the user to dismiss it.
    #[default]
    Alert,
    /// Print each notification as a line and keep going.
    Print,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host authority (`host[:port]`) the notification socket lives on.
    pub host: String,
    pub display: DisplayMode,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            display: DisplayMode::default(),
        }
    }

    /// Parses `[HOST] [--print]`, program name already stripped.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::new(DEFAULT_HOST);
        let mut host_seen = false;
        for arg in args {
            if arg == "--print" {
                config.display = DisplayMode::Print;
            } else if arg.starts_with("--") {
                warn!("Ignoring unknown flag {}", arg);
            } else if !host_seen {
                config.host = arg;
                host_seen = true;
            } else {
                warn!("Ignoring extra argument {}", arg);
            }
        }
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}
