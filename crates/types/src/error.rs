// Path: crates/types/src/error.rs
//! The stable error taxonomy surfaced by the view-call coordinator
//! (spec §7). Every variant carries a machine-readable tag via
//! `ErrorCode`, the same way `ioi_types::error` assigns a stable code to
//! every domain error enum.

use thiserror::Error;

/// Assigns a stable, machine-readable string code to an error, the
/// contract's caller-visible tag.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors a view call can terminate with.
#[derive(Debug, Clone, Error)]
pub enum ViewError {
    /// No account revision exists at or before the pinned height.
    #[error("account not found")]
    AccountNotFound,
    /// No code revision exists at or before the pinned height.
    #[error("code not found")]
    CodeNotFound,
    /// The account record bytes could not be decoded.
    #[error("account record decode failed: {0}")]
    AccountDecode(String),
    /// The bytecode failed to compile or the module failed to instantiate.
    #[error("code compilation failed: {0}")]
    CodeCompilation(String),
    /// The requested export is absent from the module or is not callable.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// The guest invoked `panic` / `panic_utf8`.
    #[error("guest panic: {0}")]
    Panic(String),
    /// The guest invoked `abort`.
    #[error("guest abort: {0}")]
    Abort(String),
    /// The guest called a host import this engine does not support
    /// (write paths, promises, cross-contract calls). Signals the caller
    /// to retry against an authoritative node.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// The call's deadline elapsed.
    #[error("timeout")]
    Timeout,
    /// The call was cancelled by the requesting client.
    #[error("cancelled")]
    Cancelled,
    /// A versioned-store I/O failure or worker loss; safe to retry.
    #[error("transient error: {0}")]
    Transient(String),
}

impl ErrorCode for ViewError {
    fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound => "accountNotFound",
            Self::CodeNotFound => "codeNotFound",
            Self::AccountDecode(_) => "transient",
            Self::CodeCompilation(_) => "codeCompilation",
            Self::MethodNotFound(_) => "methodNotFound",
            Self::Panic(_) => "panic",
            Self::Abort(_) => "abort",
            Self::NotImplemented(_) => "notImplemented",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Transient(_) => "transient",
        }
    }
}

impl ViewError {
    /// Whether the worker that produced this error must be torn down and
    /// replaced rather than returned to the idle set (spec §7).
    pub fn destroys_worker(&self) -> bool {
        matches!(
            self,
            Self::CodeCompilation(_) | Self::Panic(_) | Self::Abort(_) | Self::Timeout
        )
    }
}
