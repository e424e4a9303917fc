#![forbid(unsafe_code)]

//! Failure values carried by actions and async derived values.
//!
//! A [`Failure`] never unwinds through the runtime. Action executors and
//! async mappers settle into it, and consumers read it back from the
//! `error()` accessors.

use std::borrow::Cow;
use std::rc::Rc;

use eventide_core::ScopeError;

/// Why an action or async derivation did not produce a value.
#[derive(Clone)]
pub enum Failure {
    /// The executor explicitly reported failure (returned `false`).
    Declined,
    /// The executor or mapper returned an error.
    Fault(Rc<dyn std::error::Error>),
    /// The executor or mapper returned a plain message.
    Message(Cow<'static, str>),
    /// The executor or mapper panicked; the payload message is kept.
    Panicked(String),
    /// The work could not be scheduled on the owning scope.
    Scope(ScopeError),
}

impl Failure {
    /// Wrap an error value.
    pub fn fault(err: impl std::error::Error + 'static) -> Self {
        Self::Fault(Rc::new(err))
    }

    /// Failure carrying a message.
    pub fn msg(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Message(message.into())
    }

    /// Whether this is a declared (non-exceptional) failure.
    #[must_use]
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined)
    }
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declined => f.write_str("Declined"),
            Self::Fault(err) => f.debug_tuple("Fault").field(&err.to_string()).finish(),
            Self::Message(msg) => f.debug_tuple("Message").field(msg).finish(),
            Self::Panicked(msg) => f.debug_tuple("Panicked").field(msg).finish(),
            Self::Scope(err) => f.debug_tuple("Scope").field(err).finish(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declined => write!(f, "declined"),
            Self::Fault(err) => write!(f, "{err}"),
            Self::Message(msg) => write!(f, "{msg}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
            Self::Scope(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fault(err) => Some(err.as_ref()),
            Self::Scope(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Declined, Self::Declined) => true,
            (Self::Fault(a), Self::Fault(b)) => Rc::ptr_eq(a, b),
            (Self::Message(a), Self::Message(b)) => a == b,
            (Self::Panicked(a), Self::Panicked(b)) => a == b,
            (Self::Scope(a), Self::Scope(b)) => a == b,
            _ => false,
        }
    }
}

impl From<ScopeError> for Failure {
    fn from(err: ScopeError) -> Self {
        Self::Scope(err)
    }
}
