//! The engine-wide error model.
//!
//! Every fallible engine operation returns [`Error`], a small enumeration of
//! kinds plus, outside `final` builds, the source location it was raised at.
//! Binaries bubble these up through `anyhow`.

use std::{fmt, io, panic::Location};
use thiserror::Error;

/// What went wrong. One flat enumeration shared by all subsystems.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("not supported")]
    NotSupported,
    #[error("not found")]
    NotFound,
    #[error("parse failed")]
    ParseFailed,
    #[error("object is already loaded")]
    AlreadyLoaded,
    #[error("initialization failed")]
    InitializationFailed,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("invalid format")]
    InvalidFormat,
    #[error("too large")]
    TooLarge,
    #[error("buffer overrun")]
    BufferOverrun,
    #[error("buffer incomplete")]
    BufferIncomplete,
    #[error("invalid index")]
    InvalidIndex,
    #[error("invalid texture size")]
    InvalidTextureSize,
    #[error("texture is not loaded")]
    TextureNotLoaded,
    #[error("incomplete framebuffer")]
    FramebufferIncomplete,
    #[error("font is not loaded")]
    FontNotLoaded,
    #[error("invalid shader")]
    InvalidShader,
    #[error("shader is not loaded")]
    ShaderNotLoaded,
    #[error("sound is not loaded")]
    SoundNotLoaded,
    #[error("socket accept failed")]
    SockAcceptFailed,
    #[error("socket bind failed")]
    SockBindFailed,
    #[error("socket listen failed")]
    SockListenFailed,
    #[error("socket i/o failed")]
    SockIoFailed,
}

/// An [`ErrorKind`] with the location it originated from. Construct with
/// [`Error::new`] or the `?` conversion from [`io::Error`]; both capture the
/// caller's file and line in non-`final` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    #[cfg(not(feature = "final"))]
    origin: &'static Location<'static>,
}

impl Error {
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            #[cfg(not(feature = "final"))]
            origin: Location::caller(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(not(feature = "final"))]
        {
            let file = self.origin.file();
            let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
            write!(f, "{} at {}:{}", self.kind, base, self.origin.line())
        }
        #[cfg(feature = "final")]
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for Error {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<io::Error> for Error {
    #[track_caller]
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArguments,
            io::ErrorKind::UnexpectedEof => ErrorKind::BufferIncomplete,
            _ => ErrorKind::SockIoFailed,
        };
        Self::new(kind)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_origin() {
        let err = Error::new(ErrorKind::TooLarge);
        let text = err.to_string();
        assert!(text.starts_with("too large"), "{text}");
        #[cfg(not(feature = "final"))]
        assert!(text.contains("error.rs:"), "{text}");
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
