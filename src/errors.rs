use thiserror::Error;

#[derive(Debug, Error)]
pub enum StampError {
    /// Bad reference address/port or invalid configuration values
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// A network time exchange failed; the session keeps its previous sample
    #[error("Clock sync error: {0}")]
    SyncError(String),
    /// No valid clock sample has been taken yet
    #[error("Clock not synchronized")]
    NotSynced,
    /// Bitstream auxiliary data failed bounds or format checks
    #[error("Malformed SEI unit: {0}")]
    MalformedUnit(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[cfg(feature = "recording")]
    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl StampError {
    /// Errors the pipeline recovers from by degrading to linear timestamps
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StampError::SyncError(_) | StampError::NotSynced | StampError::MalformedUnit(_)
        )
    }
}

impl From<std::io::Error> for StampError {
    fn from(e: std::io::Error) -> Self {
        StampError::IoError(e.to_string())
    }
}
