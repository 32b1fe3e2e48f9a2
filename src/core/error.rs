//! Error types for MTP device access
//!
//! All fallible operations in this crate return [`Result`]. The variants
//! encode how a failure propagates: some are fatal to the current operation
//! (disconnects, unsupported platform), others are recoverable at the level
//! of a single directory entry and are skipped by the walker.

use thiserror::Error;

/// Main error type for MTP device access
#[derive(Error, Debug)]
pub enum AccessError {
    /// COM library initialization failed (Windows only)
    #[error("COM initialization failed: {0}")]
    Com(String),

    /// No attached device matches the requested identity
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device went away mid-operation. Fatal to the current walk or
    /// transfer, not to the process.
    #[error("device disconnected")]
    DeviceDisconnected,

    /// The object was deleted on the device since its handle was obtained.
    /// Recoverable: the walker skips the entry and continues.
    #[error("object no longer exists on the device: {0}")]
    ObjectNotFound(String),

    /// The device refused access to an object or to itself (locked phone,
    /// missing trust confirmation). Recoverable at the entry level.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A transfer failed partway through.
    #[error("transfer interrupted after {bytes_transferred} bytes: {message}")]
    TransferInterrupted {
        bytes_transferred: u64,
        message: String,
    },

    /// A transfer was cancelled through its [`CancelToken`]. Partially
    /// written device-side content has been removed.
    ///
    /// [`CancelToken`]: crate::transfer::CancelToken
    #[error("transfer cancelled after {bytes_transferred} bytes")]
    Cancelled { bytes_transferred: u64 },

    /// No device backend exists for the host platform
    #[error("no MTP backend is available on this platform")]
    PlatformUnsupported,

    /// Any other error reported by the platform device stack
    #[error("device error: {0}")]
    Backend(String),

    /// Local I/O error (reading or writing host-side files)
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AccessError>;

impl From<std::io::Error> for AccessError {
    fn from(err: std::io::Error) -> Self {
        AccessError::Io(err.to_string())
    }
}

impl AccessError {
    /// True for errors that invalidate a single directory entry rather than
    /// the whole traversal. The walker skips these and continues.
    pub fn is_entry_recoverable(&self) -> bool {
        matches!(
            self,
            AccessError::ObjectNotFound(_) | AccessError::AccessDenied(_)
        )
    }

    /// True when the device itself is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(self, AccessError::DeviceDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_recoverable_classification() {
        assert!(AccessError::ObjectNotFound("o42".into()).is_entry_recoverable());
        assert!(AccessError::AccessDenied("locked".into()).is_entry_recoverable());
        assert!(!AccessError::DeviceDisconnected.is_entry_recoverable());
        assert!(!AccessError::Backend("boom".into()).is_entry_recoverable());
    }

    #[test]
    fn disconnect_classification() {
        assert!(AccessError::DeviceDisconnected.is_disconnect());
        assert!(!AccessError::ObjectNotFound("o1".into()).is_disconnect());
    }

    #[test]
    fn interrupted_reports_progress() {
        let err = AccessError::TransferInterrupted {
            bytes_transferred: 4096,
            message: "pipe broke".into(),
        };
        assert!(err.to_string().contains("4096"));
    }
}
