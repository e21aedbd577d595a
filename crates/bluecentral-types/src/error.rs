//! Error types for value parsing in bluecentral-types.

use thiserror::Error;

/// Errors that can occur when parsing bluecentral value types from text.
///
/// This error type is platform-agnostic and does not include
/// radio errors (those belong in bluecentral-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The string does not name a known adapter state.
    #[error("Unknown adapter state: '{0}'")]
    InvalidAdapterState(String),

    /// The string is not a usable peripheral identifier.
    #[error("Invalid peripheral id '{value}': {reason}")]
    InvalidPeripheralId {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The string is not a 16-bit, 32-bit or 128-bit Bluetooth UUID.
    #[error("Invalid UUID: '{0}'")]
    InvalidUuid(String),
}

/// Result type alias using bluecentral-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
