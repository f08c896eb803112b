//! Error taxonomy for a calibration run.
//!
//! Nothing in the core retries: a protocol failure leaves the line-oriented
//! channel in an unknown position, so every error here aborts the run.

use std::io;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, CalibrationError>;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// Malformed run configuration; the run never starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The simulator died or answered with something unusable.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A decision vector left its declared bounds. Always a logic bug.
    #[error("variable {index} = {value} is outside its bound [{lower}, {upper}]")]
    BoundViolation {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },
}

impl CalibrationError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to spawn simulator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to simulator stdin: {0}")]
    Write(#[source] io::Error),

    #[error("simulator closed its output before answering")]
    Exited,

    #[error("failed to read simulator stdout: {0}")]
    Read(#[source] io::Error),

    #[error("expected {expected} tokens, found {found} in response {line:?}")]
    Arity {
        expected: usize,
        found: usize,
        line: String,
    },

    #[error("token {position} ({token:?}) is not a finite number in response {line:?}")]
    InvalidNumber {
        position: usize,
        token: String,
        line: String,
    },

    #[error("no response from simulator within {0:?}")]
    Timeout(Duration),

    /// Output arrived with no request outstanding; later answers would be
    /// paired with the wrong requests.
    #[error("simulator wrote {line:?} without a pending request")]
    Unsolicited { line: String },

    #[error("channel is unusable after an earlier protocol failure")]
    Poisoned,
}
