use {std::fmt, thiserror::Error};

/// Which kind of handle an error refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandleKind
{
    /// An [`Exclusive`][`crate::Exclusive`] handle.
    Exclusive,

    /// A [`Shared`][`crate::Shared`] handle.
    Shared,
}

impl fmt::Display for HandleKind
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Exclusive => write!(f, "exclusive"),
            Self::Shared    => write!(f, "shared"),
        }
    }
}

/// Error returned by the fallible handle operations.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum HandleError
{
    /// The handle does not own a payload.
    #[error("Dereference of empty {kind} handle")]
    NullDereference{kind: HandleKind},

    /// The observed payload has already been destroyed,
    /// or the weak handle never observed one.
    #[error("Weak handle has expired")]
    Expired,
}
