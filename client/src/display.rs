//! Where notifications end up once they have been decoded.

use std::io::{self, BufRead, Stdin, StdinLock, Stdout, Write};

use log::warn;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Text shown for a notification that carried no `message`.
pub const UNDEFINED: &str = "undefined";

/// Presents one notification to the user.
///
/// Called inline from the socket pump: the next frame is not read until
/// `show` returns, so a blocking implementation holds back later
/// notifications.
pub trait NotificationDisplay {
    fn show(&mut self, message: Option<&str>);
}

impl<F> NotificationDisplay for F
where
    F: FnMut(Option<&str>),
{
    fn show(&mut self, message: Option<&str>) {
        self(message)
    }
}

/// Writes the notification and blocks until a line is read from `input`.
pub struct AlertDisplay<R, W> {
    input: R,
    output: W,
}

impl AlertDisplay<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        Self::new(stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> AlertDisplay<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    fn alert(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{}", text)?;
        write!(self.output, "(press Enter to dismiss) ")?;
        self.output.flush()?;
        let mut dismissal = String::new();
        let input = &mut self.input;
        blocking(|| input.read_line(&mut dismissal))?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> NotificationDisplay for AlertDisplay<R, W> {
    fn show(&mut self, message: Option<&str>) {
        if let Err(e) = self.alert(message.unwrap_or(UNDEFINED)) {
            warn!("Failed to display notification: {}", e);
        }
    }
}

// `block_in_place` panics on a current-thread runtime; run inline there and
// outside any runtime.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Writes one line per notification without waiting.
pub struct PrintDisplay<W> {
    output: W,
}

impl PrintDisplay<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> PrintDisplay<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

impl<W: Write> NotificationDisplay for PrintDisplay<W> {
    fn show(&mut self, message: Option<&str>) {
        let text = message.unwrap_or(UNDEFINED);
        if let Err(e) = writeln!(self.output, "{}", text).and_then(|_| self.output.flush()) {
            warn!("Failed to display notification: {}", e);
        }
    }
}
