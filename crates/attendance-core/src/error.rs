use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the attendance-watch core.
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// A store file could not be written to disk.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A mode string is not one of the recognised modes.
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// The invitation code does not exist.
    #[error("Invalid invitation code: {0}")]
    InvalidInvitation(String),

    /// The invitation code has already been consumed.
    #[error("Invitation code already used: {0}")]
    InvitationUsed(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the attendance crates.
pub type Result<T> = std::result::Result<T, AttendanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_write() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = AttendanceError::FileWrite {
            path: PathBuf::from("/data/students.json"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to write file"));
        assert!(msg.contains("/data/students.json"));
        assert!(msg.contains("read-only"));
    }

    #[test]
    fn test_error_display_invalid_mode() {
        let err = AttendanceError::InvalidMode("semi".to_string());
        assert_eq!(err.to_string(), "Invalid mode: semi");
    }

    #[test]
    fn test_error_display_invitation_used() {
        let err = AttendanceError::InvitationUsed("ABCD1234".to_string());
        assert_eq!(err.to_string(), "Invitation code already used: ABCD1234");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AttendanceError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: AttendanceError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
