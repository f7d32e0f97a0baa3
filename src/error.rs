//! Error taxonomy for graph orchestration
//!
//! Synchronous calls return [`GraphError`]. Errors a component reports
//! from its own thread arrive as an [`ErrorCode`] and are stored on the
//! graph as [`GraphError::ComponentError`].

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("bad parameter: {0}")]
    BadParameter(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("port mismatch: {0}")]
    PortMismatch(String),
    #[error("component not found: {0}")]
    ComponentNotFound(String),
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),
    /// Buffer too small for a two-phase query; retry with `required` bytes
    #[error("insufficient buffer: {required} bytes required")]
    InsufficientBuffer { required: usize },
    #[error("no usable stream in source")]
    NoUsableStream,
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("component error: {0}")]
    ComponentError(ErrorCode),
    #[error("interface version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("provider could not be loaded: {0}")]
    ResourceError(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("no more {0} available")]
    NoMore(String),
    #[error("component not ready")]
    NotReady,
    #[error("undefined error: {0}")]
    Undefined(String),
}

impl GraphError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GraphError::Timeout(_))
    }
}

/// Error codes a component can raise asynchronously through its event callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No error. Delivered as an error event it means the stream ended.
    None,
    PortUnpopulated,
    WriterFileSizeLimitExceeded,
    WriterTimeLimitExceeded,
    NotReady,
    StreamCorrupt,
    Hardware,
    InvalidState,
    ResourcesLost,
    /// Vendor specific code
    Vendor(u32),
}

impl ErrorCode {
    /// Codes that are informational and never stored on the graph
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ErrorCode::PortUnpopulated
                | ErrorCode::WriterFileSizeLimitExceeded
                | ErrorCode::WriterTimeLimitExceeded
                | ErrorCode::NotReady
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::None => "none",
            ErrorCode::PortUnpopulated => "port unpopulated",
            ErrorCode::WriterFileSizeLimitExceeded => "writer file size limit exceeded",
            ErrorCode::WriterTimeLimitExceeded => "writer time limit exceeded",
            ErrorCode::NotReady => "not ready",
            ErrorCode::StreamCorrupt => "stream corrupt",
            ErrorCode::Hardware => "hardware failure",
            ErrorCode::InvalidState => "invalid state",
            ErrorCode::ResourcesLost => "resources lost",
            ErrorCode::Vendor(_) => "vendor error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Vendor(code) => write!(f, "vendor error 0x{:08x}", code),
            other => write!(f, "{}", other.description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_codes() {
        assert!(ErrorCode::PortUnpopulated.is_benign());
        assert!(ErrorCode::NotReady.is_benign());
        assert!(ErrorCode::WriterTimeLimitExceeded.is_benign());
        assert!(!ErrorCode::None.is_benign());
        assert!(!ErrorCode::Hardware.is_benign());
    }

    #[test]
    fn test_display() {
        let err = GraphError::ComponentError(ErrorCode::Vendor(0x8000_1001));
        assert_eq!(err.to_string(), "component error: vendor error 0x80001001");
        assert!(GraphError::Timeout(0).is_timeout());
    }
}
