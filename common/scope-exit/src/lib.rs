//! Ad-hoc scope guards.
//!
//! A guard performs a function when it goes out of scope,
//! including when a panic unwinds through the scope.
//! Use [`scope_exit!`] for cleanup that must always happen,
//! and [`ScopeExit::dismiss`] for cleanup that must only happen
//! when the code between creating and dismissing the guard fails.

#![warn(missing_docs)]

use std::mem::{ManuallyDrop, forget};

/// Guard that performs a function when dropped.
#[must_use = "the function is performed as soon as the guard is dropped"]
pub struct ScopeExit<F>
    where F: FnOnce()
{
    f: ManuallyDrop<F>,
}

impl<F> ScopeExit<F>
    where F: FnOnce()
{
    /// Create a guard that performs `f` when dropped.
    pub fn new(f: F) -> Self
    {
        Self{f: ManuallyDrop::new(f)}
    }

    /// Drop the guard without performing the function.
    ///
    /// Anything the function captured by value is dropped.
    pub fn dismiss(mut this: Self)
    {
        // SAFETY: this is forgotten below, so f is not used again.
        unsafe { ManuallyDrop::drop(&mut this.f); }
        forget(this);
    }
}

impl<F> Drop for ScopeExit<F>
    where F: FnOnce()
{
    fn drop(&mut self)
    {
        // SAFETY: Drop is the last use of self.f.
        let f = unsafe { ManuallyDrop::take(&mut self.f) };
        f();
    }
}

/// Define an anonymous scope guard.
///
/// The code passed to this macro is performed when the scope ends,
/// whether it ends normally or because a panic passes through it.
/// Guards defined in the same scope run in reverse order of definition.
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
