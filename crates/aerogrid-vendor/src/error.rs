//! Vendor client error types.

use thiserror::Error;

/// Errors returned by the vendor cloud API or the transport under it.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("invalid vendor url: {0}")]
    InvalidUrl(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("vendor request timed out after {0}s")]
    Timeout(u64),

    #[error("vendor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode vendor response: {0}")]
    Decode(String),
}

pub type VendorResult<T> = Result<T, VendorError>;
