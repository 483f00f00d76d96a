// src/error.rs
//! Crate-wide error type.
//!
//! Every subsystem keeps its own `thiserror` enum (decode, reload, batch
//! phases, mounting, descriptors, settings). [`Error`] wraps all of them so the
//! engine context and the binary can propagate with `?`, and [`Context`] adds
//! an anyhow-style `.context()` to any `Result` whose error converts into it.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::registry::ReloadError;
use crate::settings::SettingsError;
use crate::textureset::{DescriptorError, LoadPhaseError, MountError};

/// Main error type — `Send + Sync + 'static`, so it crosses the decode threads.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O errors outside of the image decoders.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error(transparent)]
    Phase(#[from] LoadPhaseError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Simple custom message.
    #[error("{0}")]
    Custom(String),

    /// Context chaining, like `.context()` in anyhow.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    /// Wrap this error with a message describing what was being attempted.
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }
}

/// Convenient `Result` alias — use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait giving `.context()` / `.with_context()` on any `Result`.
pub trait Context<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Lazy variant: the closure only runs on the error path.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[inline]
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|err| err.into().context(context))
    }

    #[inline]
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_and_keeps_source() {
        let res: std::result::Result<(), DecodeError> =
            Err(DecodeError::Malformed("<mad:1".to_string()));
        let err = res.context("loading slot 3").unwrap_err();
        assert_eq!(err.to_string(), "loading slot 3: could not load texture <mad:1");
        match err {
            Error::WithContext { source, .. } => assert!(matches!(*source, Error::Decode(_))),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
