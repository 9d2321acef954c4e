use crate::sound::Status;
use thiserror::Error;

/// Errors produced by the audio core.
#[derive(Error, Debug)]
pub enum AuralError {
    /// A transport operation was requested while the sound was in a status
    /// that does not permit it (e.g. `fade_out` on a stopped sound).
    #[error("invalid transition: {operation}() while {status:?}")]
    InvalidTransition {
        operation: &'static str,
        status: Status,
    },

    /// A construction or setter argument violated its documented bounds.
    #[error("configuration error: {0}")]
    Config(String),

    /// A `SoundReader` failed to read or seek.
    #[error("reader error: {0}")]
    Reader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuralError>;
