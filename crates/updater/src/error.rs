/// Convenient result alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors that can occur while performing an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    /// Network transfer of a remote file failed.
    #[error("file transfer failed: {0}")]
    Transfer(#[from] reqwest::Error),
    /// The manifest could not be decoded from JSON.
    #[error("manifest decoding failed: {0}")]
    ManifestDecode(#[from] serde_json::Error),
    /// The manifest decoded but violates a structural invariant.
    #[error("invalid update descriptor: {0}")]
    InvalidDescriptor(String),
    /// A downloaded file's digest did not match the manifest.
    #[error("integrity check failed for {file_name} (expected {expected}, got {actual})")]
    IntegrityMismatch {
        /// Destination file name from the manifest.
        file_name: String,
        /// Expected MD5 digest (lowercase hex).
        expected: String,
        /// Actual MD5 digest (lowercase hex).
        actual: String,
    },
    /// The operation was aborted by a cancellation token. Converted to
    /// `DownloadOutcome::Cancelled` at the pipeline boundary; never user-facing.
    #[error("operation cancelled")]
    Cancelled,
    /// The detached replace helper could not be launched. The update will
    /// not happen if the process exits now, so this is fatal.
    #[error("failed to schedule the replace helper: {0}")]
    ReplaceScheduling(#[source] std::io::Error),
    /// Failed to perform an I/O operation.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse or compare versions.
    #[error("version error: {0}")]
    Version(#[from] semver::Error),
    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl UpdateError {
    /// Helper for wrapping validation failures.
    pub fn validation(msg: impl Into<String>) -> Self {
        UpdateError::InvalidDescriptor(msg.into())
    }
}
