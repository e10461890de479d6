//! Error types and failure classification for harvest operations.

use std::fmt;

/// Crate-level error for harvest operations.
#[derive(Debug, Clone)]
pub enum HarvestError {
    /// Configuration error (invalid parameters, unusable output target)
    ConfigError(String),
    /// Browser runtime unavailable or session could not be created
    BrowserError(String),
    /// A live session became unusable mid-chunk
    SessionError(String),
    /// Operation cancelled
    Cancelled,
    /// Other errors
    Other(String),
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
            Self::BrowserError(msg) => write!(f, "Browser error: {msg}"),
            Self::SessionError(msg) => write!(f, "Session error: {msg}"),
            Self::Cancelled => write!(f, "Harvest operation was cancelled"),
            Self::Other(msg) => write!(f, "Harvest error: {msg}"),
        }
    }
}

impl std::error::Error for HarvestError {}

impl From<anyhow::Error> for HarvestError {
    fn from(err: anyhow::Error) -> Self {
        // Use {:#} to preserve the full error chain with context
        Self::Other(format!("{err:#}"))
    }
}

/// Convenience alias for Result with `HarvestError`
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Categorizes per-item failures for retry decisions.
///
/// Network hiccups and stale-element conditions are usually transient and
/// worth retrying; a dead browser session is not recoverable from within
/// the same chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network-level failure (timeout, DNS, connection refused)
    Network,
    /// Transient DOM condition (stale node, intercepted click, detached frame)
    StaleDom,
    /// Browser/session failure (crash, closed target, CDP transport error)
    Session,
    /// Rate limiting detected (HTTP 429)
    RateLimited,
    /// Unknown/unclassified error
    Unknown,
}

impl FailureKind {
    /// Classify an error from its message. Chromiumoxide surfaces most page
    /// and transport failures as strings, so pattern matching on the text is
    /// the only classification signal available.
    #[must_use]
    pub fn classify(error: &anyhow::Error) -> Self {
        let msg = error.to_string().to_lowercase();

        if msg.contains("429") || msg.contains("too many requests") || msg.contains("rate limit") {
            return Self::RateLimited;
        }

        if msg.contains("stale")
            || msg.contains("detached")
            || msg.contains("intercepted")
            || msg.contains("not interactable")
            || msg.contains("node with given id")
        {
            return Self::StaleDom;
        }

        if msg.contains("browser")
            || msg.contains("target closed")
            || msg.contains("session")
            || msg.contains("websocket")
            || msg.contains("channel closed")
        {
            return Self::Session;
        }

        if msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("connection refused")
            || msg.contains("connection reset")
            || msg.contains("dns")
            || msg.contains("network")
            || msg.contains("unreachable")
        {
            return Self::Network;
        }

        Self::Unknown
    }

    /// Whether an item hitting this failure should be retried in place.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::StaleDom | Self::RateLimited | Self::Unknown => true,
            Self::Session => false,
        }
    }

    /// Whether this failure invalidates the whole browser session, aborting
    /// the current chunk rather than just the current item.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Session)
    }

    /// Base delay multiplier applied on top of exponential backoff.
    #[must_use]
    pub const fn delay_multiplier(&self) -> f64 {
        match self {
            Self::RateLimited => 3.0,
            Self::Session => 1.5,
            Self::Network | Self::StaleDom | Self::Unknown => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn classify_timeout_as_network() {
        let kind = FailureKind::classify(&anyhow!("Page navigation timeout after 30 seconds"));
        assert_eq!(kind, FailureKind::Network);
        assert!(kind.is_retryable());
    }

    #[test]
    fn classify_closed_target_as_session_fatal() {
        let kind = FailureKind::classify(&anyhow!("Target closed: websocket send failed"));
        assert_eq!(kind, FailureKind::Session);
        assert!(kind.is_session_fatal());
        assert!(!kind.is_retryable());
    }

    #[test]
    fn classify_stale_node_as_retryable() {
        let kind = FailureKind::classify(&anyhow!("Could not find node with given id"));
        assert_eq!(kind, FailureKind::StaleDom);
        assert!(kind.is_retryable());
        assert!(!kind.is_session_fatal());
    }

    #[test]
    fn rate_limit_gets_longer_backoff() {
        let kind = FailureKind::classify(&anyhow!("HTTP 429 Too Many Requests"));
        assert_eq!(kind, FailureKind::RateLimited);
        assert!(kind.delay_multiplier() > FailureKind::Network.delay_multiplier());
    }

    #[test]
    fn harvest_error_preserves_anyhow_chain() {
        let err = anyhow!("root cause").context("while connecting");
        let harvest: HarvestError = err.into();
        let text = harvest.to_string();
        assert!(text.contains("while connecting"));
        assert!(text.contains("root cause"));
    }
}
