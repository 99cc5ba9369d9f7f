/// Failure modes of an NFC check-in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NfcError {
    #[error("NFC is not supported on this device")]
    Unsupported,
    #[error("NFC is disabled: {0}")]
    Disabled(String),
    #[error("no tag detected before the deadline")]
    Timeout,
    #[error("tag {0} does not belong to this task")]
    WrongTag(String),
    #[error("NFC reader error: {0}")]
    Reader(String),
}

/// Errors surfaced by the client core.
///
/// Nothing here is fatal: screens turn these into a [`Notice`](crate::core::notice::Notice)
/// or into the offline flag.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("not signed in")]
    AuthMissing,

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Nfc(#[from] NfcError),
}

impl Error {
    /// True for failures that should flip the screen into offline mode.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable(_) | Self::Server { .. } | Self::Decode(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::NetworkUnavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
