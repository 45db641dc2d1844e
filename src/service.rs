//! Seams to the media server. `plex::PlexClient` is the real implementation;
//! tests plug in recording fakes.

use std::path::Path;

use crate::error::ErrorClass;
use crate::library::LibraryTarget;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered HTTP {code}")]
    Status { url: String, code: u16 },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("media server is not configured: {0}")]
    NotConfigured(String),
}

impl RefreshError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RefreshError::Transport { .. } => ErrorClass::TransientIo,
            RefreshError::Status { code, .. } => match code {
                401 | 403 => ErrorClass::Permission,
                404 => ErrorClass::NotFound,
                408 | 429 | 500..=599 => ErrorClass::TransientIo,
                _ => ErrorClass::Unknown,
            },
            RefreshError::Decode { .. } => ErrorClass::Unknown,
            RefreshError::NotConfigured(_) => ErrorClass::Config,
        }
    }
}

/// Asks the media server to re-index one directory of one library.
///
/// `Ok(false)` means the server answered but rejected the request; it is
/// retried like an error.
pub trait RefreshClient: Send + Sync {
    fn refresh(&self, library_id: &str, path: &Path) -> Result<bool, RefreshError>;
}

/// Source of the current library list.
pub trait LibraryProvider: Send + Sync {
    fn list_libraries(&self) -> Result<Vec<LibraryTarget>, RefreshError>;
}
