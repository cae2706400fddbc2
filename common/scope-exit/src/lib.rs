//! Ad-hoc scope guards.
//!
//! A guard runs its code when it is dropped,
//! both on normal scope exit and while a panic unwinds through it.
//! A guard created with [`ScopeExit::new`] can also be [dismissed],
//! which is how partially completed work is rolled back:
//! create a guard that undoes the work, finish the remaining steps,
//! and dismiss the guard once nothing can fail anymore.
//!
//! [dismissed]: `ScopeExit::dismiss`

#![warn(missing_docs)]

use std::mem::ManuallyDrop;

/// Guard that calls a function when dropped.
///
/// Use [`scope_exit!`] when the guard never needs to be dismissed.
#[must_use = "the guard calls its function immediately if not bound"]
pub struct ScopeExit<F>
    where F: FnOnce()
{
    f: ManuallyDrop<F>,
    dismissed: bool,
}

impl<F> ScopeExit<F>
    where F: FnOnce()
{
    /// Create a guard that calls `f` when dropped.
    pub fn new(f: F) -> Self
    {
        Self{f: ManuallyDrop::new(f), dismissed: false}
    }

    /// Drop the guard without calling its function.
    ///
    /// # Examples
    ///
    /// ```
    /// # use scope_exit::ScopeExit;
    /// use std::cell::Cell;
    /// let undone = Cell::new(false);
    /// let guard = ScopeExit::new(|| undone.set(true));
    /// guard.dismiss();
    /// assert!(!undone.get());
    /// ```
    pub fn dismiss(mut self)
    {
        self.dismissed = true;
    }
}

impl<F> Drop for ScopeExit<F>
    where F: FnOnce()
{
    fn drop(&mut self)
    {
        // SAFETY: self.f will not be used anymore.
        let f = unsafe { ManuallyDrop::take(&mut self.f) };
        if !self.dismissed {
            f();
        }
    }
}

/// Define an anonymous scope guard.
///
/// The code passed to this macro is performed at the end of the scope,
/// or when a panic passes through the scope.
/// Multiple guards in the same scope run in reverse order.
///
/// # Examples
///
/// ```
/// # use scope_exit::scope_exit;
/// use std::cell::RefCell;
/// let log = RefCell::new(Vec::new());
/// {
///     scope_exit! { log.borrow_mut().push("first"); }
///     scope_exit! { log.borrow_mut().push("second"); }
///     log.borrow_mut().push("body");
/// }
/// assert_eq!(*log.borrow(), ["body", "second", "first"]);
/// ```
#[macro_export]
macro_rules! scope_exit
{
    { $($tt:tt)* } => {
        let __scope_exit = $crate::ScopeExit::new(|| { $($tt)* });
    };
}
