// src/error.rs

use thiserror::Error;

/// Error taxonomy for the studio core.
///
/// Decode failures are normally absorbed close to where they happen (the
/// affected buffer is simply treated as absent and a warning is logged);
/// permission and render failures are surfaced to the caller and are never
/// retried automatically.
#[derive(Debug, Error)]
pub enum StudioError {
    /// Microphone access was refused or the device could not be opened.
    /// User-actionable: the message tells the user what to check.
    #[error(
        "microphone access denied or unavailable ({0}); \
         grant input permission and make sure no other application holds the device"
    )]
    PermissionDenied(String),

    /// Malformed or unsupported audio payload. The affected buffer is
    /// treated as absent; dependent features degrade gracefully.
    #[error("could not decode audio: {0}")]
    DecodeFailure(String),

    /// The offline mixdown failed during graph construction or rendering.
    /// Callers should fall back to saving the unmixed capture.
    #[error("offline mixdown failed: {0}")]
    RenderFailure(String),

    /// WAV serialization failed. Fatal to the save operation only; the
    /// recording itself is preserved for retry.
    #[error("WAV encoding failed: {0}")]
    EncodeFailure(String),

    /// A second capture was started while one is active. The first capture
    /// is left untouched; the caller must stop it first.
    #[error("a recording capture is already active; stop it before starting another")]
    CaptureInProgress,
}

pub type Result<T> = std::result::Result<T, StudioError>;
