//! Error taxonomy shared by the model client, parser, sanitizer and scheduler.
//!
//! Retry decisions are made on variants and HTTP status codes captured where the
//! upstream response is received, never on message text.

use thiserror::Error;

/// Why a transport-level attempt failed. Every kind is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
  Timeout,
  Network,
  RateLimited,
  Server(u16),
}

impl std::fmt::Display for TransportKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TransportKind::Timeout => write!(f, "timeout"),
      TransportKind::Network => write!(f, "network"),
      TransportKind::RateLimited => write!(f, "rate limited (429)"),
      TransportKind::Server(status) => write!(f, "server error ({status})"),
    }
  }
}

#[derive(Debug, Error)]
pub enum PuzzleError {
  /// Missing credential or unusable client settings. Never retried.
  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("Transport error [{kind}]: {message}")]
  Transport { kind: TransportKind, message: String },

  /// 401/403/404 and any other 4xx except 429.
  #[error("Upstream rejected request (status {status}): {message}")]
  NonRetryableUpstream { status: u16, message: String },

  /// Upstream answered 2xx but without `choices[0].message.content`.
  #[error("Protocol violation: {0}")]
  Protocol(String),

  #[error("Model request failed after {attempts} attempts: {last}")]
  RetriesExhausted {
    attempts: u32,
    #[source]
    last: Box<PuzzleError>,
  },

  #[error("Parse error: {message} (preview: {preview:?})")]
  Parse { message: String, preview: String },

  #[error("Validation error: {0}")]
  Validation(String),

  #[error("Payload too large: {size} bytes exceeds {limit} bytes")]
  TooLarge { size: usize, limit: usize },

  #[error("Invalid band index: {index}. Must be between 0 and 5.")]
  Range { index: i64 },
}

impl PuzzleError {
  pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
    Self::Transport { kind, message: message.into() }
  }

  /// Whether the model client may spend another attempt on this failure.
  /// Protocol violations are handled separately by the client (retried once).
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Transport { .. })
  }

  /// Classify a non-success HTTP status.
  pub fn from_status(status: u16, message: impl Into<String>) -> Self {
    let message = message.into();
    match status {
      429 => Self::transport(TransportKind::RateLimited, message),
      500..=599 => Self::transport(TransportKind::Server(status), message),
      _ => Self::NonRetryableUpstream { status, message },
    }
  }
}

pub type Result<T> = std::result::Result<T, PuzzleError>;
