//! Watch session error types.

/// Errors produced when starting a watch session.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    #[error("diagnostic process has no piped {0} stream")]
    StreamUnavailable(&'static str),
}
