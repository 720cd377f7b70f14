use std::net::Ipv4Addr;

/// All error types that can occur when commanding a bulb.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The endpoint is missing its identity, local key, or address.
    ///
    /// Raised before any network activity; never retried or counted.
    #[error("endpoint is not configured; missing {missing}")]
    Configuration { missing: &'static str },

    /// Opening a connection to the bulb or sending bytes to it failed.
    #[error("transport {action} error: {err:?}")]
    Transport { action: String, err: std::io::Error },

    /// The bulb answered, but the decoded frame carried an error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Every attempt timed out waiting for an acknowledgment.
    #[error("no acknowledgment after {attempts} attempt(s)")]
    AckTimeout { attempts: u32 },

    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A capability call received a value it cannot encode.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A network scan is already probing addresses.
    #[error("a network scan is already in progress")]
    ScanInProgress,

    /// The scan range is empty or reversed.
    #[error("invalid scan range {start} - {end}")]
    InvalidRange { start: Ipv4Addr, end: Ipv4Addr },
}

impl Error {
    /// Create a new transport error
    pub fn transport(action: &str, err: std::io::Error) -> Self {
        Error::Transport {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }

    /// Whether the command failed only because no acknowledgment arrived.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::AckTimeout { .. })
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
