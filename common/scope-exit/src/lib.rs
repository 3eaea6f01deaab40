//! Scope guards for teardown that must survive a panic.
//!
//! A guard runs its closure when it goes out of scope,
//! both on normal exit and while a panic unwinds through it.
//! A guard that is no longer needed is forgotten with [`std::mem::forget`].

#![warn(missing_docs)]

use std::mem::ManuallyDrop;

/// Run a closure when the guard is dropped.
///
/// Construct with [`ScopeExit::new`] or with the [`scope_exit`] macro.
#[must_use = "the closure runs as soon as the guard is dropped"]
pub struct ScopeExit<F>
    where F: FnOnce()
{
    f: ManuallyDrop<F>,
}

impl<F> ScopeExit<F>
    where F: FnOnce()
{
    /// Create a guard that calls `f` when dropped.
    pub fn new(f: F) -> Self
    {
        Self{f: ManuallyDrop::new(f)}
    }
}

impl<F> Drop for ScopeExit<F>
    where F: FnOnce()
{
    fn drop(&mut self)
    {
        // SAFETY: self.f will not be used anymore.
        let f = unsafe { ManuallyDrop::take(&mut self.f) };
        f();
    }
}

/// Define an anonymous scope guard.
///
/// The code passed to this macro is performed at the end of the scope.
/// It is performed when the scope ends or when a panic passes through.
///
/// # Examples
///
/// ```
/// # use scope_exit::scope_exit;
/// use std::cell::Cell;
/// let x = Cell::new(0);
/// {
///     scope_exit! { x.set(1); }
///     x.set(2);
/// }
/// assert_eq!(x.get(), 1);
/// ```
#[macro_export]
macro_rules! scope_exit
{
    { $($tt:tt)* } => {
        let __scope_exit = $crate::ScopeExit::new(|| { $($tt)* });
    };
}
