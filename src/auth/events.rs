//! Setup progress events and the browser seam.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::device_code::PollState;

/// Progress of an interactive device-grant setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantEvent {
    /// Show the code and URL to the operator.
    VerificationRequired {
        user_code: String,
        verification_uri: String,
    },
    BrowserOpened {
        verification_uri: String,
    },
    /// Launch failed; the operator can still use the printed code and URL.
    BrowserUnavailable {
        reason: String,
    },
    /// About to wait before the next poll attempt.
    Waiting {
        attempt: u32,
        interval: Duration,
    },
    /// The server asked for a longer interval.
    SlowDown {
        interval: Duration,
    },
    Finished {
        state: PollState,
    },
}

/// Receiver for [`GrantEvent`]s.
pub type EventSink = Arc<dyn Fn(&GrantEvent) + Send + Sync>;

/// Sink that drops every event.
pub fn silent_sink() -> EventSink {
    Arc::new(|_event: &GrantEvent| {})
}

/// Opens a verification URL for the operator.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &Url) -> std::io::Result<()>;
}

/// Platform URL handler via the `open` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        open::that(url.as_str())
    }
}

/// Launcher for headless runs; always reports failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &Url) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "browser launch disabled",
        ))
    }
}
