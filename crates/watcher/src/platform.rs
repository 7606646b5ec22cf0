//! Host platform detection.

use crate::error::WatchError;

/// Platforms with a known camera diagnostic mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Unified log streaming (`log stream`) filtered to the camera
    /// extension subsystem.
    MacOs,
    /// Open-file listing (`lsof` in repeat mode) against the video
    /// device node.
    Linux,
}

impl Platform {
    /// Detects the host platform.
    ///
    /// Fails fast with [`WatchError::UnsupportedPlatform`] when the host
    /// has no diagnostic mechanism, instead of degrading to a session
    /// that never fires.
    pub fn detect() -> Result<Self, WatchError> {
        detect_inner()
    }
}

#[cfg(target_os = "macos")]
fn detect_inner() -> Result<Platform, WatchError> {
    Ok(Platform::MacOs)
}

#[cfg(target_os = "linux")]
fn detect_inner() -> Result<Platform, WatchError> {
    Ok(Platform::Linux)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn detect_inner() -> Result<Platform, WatchError> {
    Err(WatchError::UnsupportedPlatform(std::env::consts::OS))
}
