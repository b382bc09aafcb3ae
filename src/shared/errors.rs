#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("blocked by remote policy: {0}")]
    PolicyBlocked(String),
}

impl SyncError {
    /// Autosave recovers from transport and rejection failures by keeping
    /// the dirty state; malformed payloads degrade to empty display states.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Rejected(_))
    }
}
