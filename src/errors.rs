//! Errors reported while loading a class file.

use std::fmt;

/// An error that aborts the loading of a class file.
///
/// Loading stops at the first violation found; the error carries the kind of violation
/// and a message naming the offending index or value and, once it leaves the parser, the
/// source the class file was read from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LoadError {
    kind: LoadErrorKind,
    message: String,
}

/// The kind of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
pub enum LoadErrorKind {
    /// The buffer ended in the middle of a read.
    #[display("java.lang.ClassFormatError (truncated)")]
    TruncatedInput,
    /// A structural or grammatical violation of the class file format.
    #[display("java.lang.ClassFormatError")]
    ClassFormat,
    /// The version of the class file is outside the supported window.
    #[display("java.lang.UnsupportedClassVersionError")]
    UnsupportedClassVersion,
    /// The class does not have the name its loader asked for, or a class it needs could
    /// not be found.
    #[display("java.lang.NoClassDefFoundError")]
    NoClassDefFound,
    /// The super class or an interface turned out to be of the wrong kind after
    /// resolution.
    #[display("java.lang.IncompatibleClassChangeError")]
    IncompatibleClassChange,
    /// A semantic rule beyond the grammar of the class file was violated.
    #[display("java.lang.VerifyError")]
    Verify,
    /// The super class or an interface is not accessible from the loaded class.
    #[display("java.lang.IllegalAccessError")]
    IllegalAccess,
    /// The class names itself as its super class or as one of its interfaces.
    #[display("java.lang.ClassCircularityError")]
    ClassCircularity,
}

impl LoadError {
    /// Creates an error of the given kind.
    pub fn new(kind: LoadErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    pub(crate) fn truncated() -> Self {
        Self::new(LoadErrorKind::TruncatedInput, "Truncated class file")
    }

    pub(crate) fn class_format(message: impl fmt::Display) -> Self {
        Self::new(LoadErrorKind::ClassFormat, message)
    }

    pub(crate) fn verify(message: impl fmt::Display) -> Self {
        Self::new(LoadErrorKind::Verify, message)
    }

    pub(crate) fn incompatible_class_change(message: impl fmt::Display) -> Self {
        Self::new(LoadErrorKind::IncompatibleClassChange, message)
    }

    /// Creates a [`LoadErrorKind::NoClassDefFound`] error.
    pub fn no_class_def_found(message: impl fmt::Display) -> Self {
        Self::new(LoadErrorKind::NoClassDefFound, message)
    }

    /// Returns the kind of error.
    #[must_use]
    pub const fn kind(&self) -> LoadErrorKind {
        self.kind
    }

    /// Returns the message describing the violation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Appends the source description of the class file to the message.
    #[must_use]
    pub(crate) fn in_source(mut self, source: &str) -> Self {
        if !self.message.contains(source) {
            self.message = format!("{} in class file {source}", self.message);
        }
        self
    }
}

/// Converts a missing value or a failed check into a [`LoadErrorKind::ClassFormat`] error.
pub(crate) trait FormatContext {
    type Output;

    fn format_context<F, Message>(self, message_fn: F) -> Result<Self::Output, LoadError>
    where
        F: FnOnce() -> Message,
        Message: fmt::Display;
}

impl<T> FormatContext for Option<T> {
    type Output = T;

    fn format_context<F, Message>(self, message_fn: F) -> Result<Self::Output, LoadError>
    where
        F: FnOnce() -> Message,
        Message: fmt::Display,
    {
        self.ok_or_else(|| LoadError::class_format(message_fn()))
    }
}

impl<T, E> FormatContext for Result<T, E>
where
    E: fmt::Display,
{
    type Output = T;

    fn format_context<F, Message>(self, message_fn: F) -> Result<Self::Output, LoadError>
    where
        F: FnOnce() -> Message,
        Message: fmt::Display,
    {
        self.map_err(|err| LoadError::class_format(format!("{}: {err}", message_fn())))
    }
}
