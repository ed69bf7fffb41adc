//! Error types and error handling strategy for Simloop.
//!
//! Errors flow exclusively through task result slots along the
//! continuation chain: signals carry no values or errors, only the
//! triggered state. The principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - The teardown unwind is an ordinary error kind that user code
//!   propagates with `?`, collapsing the awaiter chain
//! - Programmer errors (listener on a triggered signal, double result
//!   take) are assertions, never `Err`

use core::fmt;
use std::rc::Rc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The driver is tearing down; a suspended task was forcibly resumed
    /// so its frame can unwind. Never observed outside `clear`/`reset`.
    Cleared,

    /// A port was closed while a receive was pending.
    ChannelClosed,

    /// User-provided error.
    User,

    /// Internal runtime error (bug).
    Internal,
}

/// The main error type for Simloop operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Rc<dyn std::error::Error>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates the teardown unwind error.
    #[must_use]
    pub const fn cleared() -> Self {
        Self::new(ErrorKind::Cleared)
    }

    /// Creates a user error wrapping an arbitrary cause.
    #[must_use]
    pub fn user(source: impl std::error::Error + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error is the teardown unwind.
    #[must_use]
    pub const fn is_cleared(&self) -> bool {
        matches!(self.kind, ErrorKind::Cleared)
    }

    /// Adds deterministic context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + 'static) -> Self {
        self.source = Some(Rc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

/// A specialized Result type for Simloop operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_context() {
        let err = Error::new(ErrorKind::ChannelClosed).with_context("port 3 closed");
        assert_eq!(err.to_string(), "ChannelClosed: port 3 closed");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::user(Underlying).with_context("outer");
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn predicates_match_kind() {
        assert!(Error::cleared().is_cleared());
        assert!(!Error::new(ErrorKind::User).is_cleared());
    }

    #[test]
    fn result_ext_adds_context() {
        let res: core::result::Result<(), Error> = Err(Error::new(ErrorKind::ChannelClosed));
        let err = res.context("recv failed").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert_eq!(err.to_string(), "ChannelClosed: recv failed");
    }
}
