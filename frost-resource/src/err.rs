//! Pending error of the current thread.
//!
//! C callers cannot receive a [`Result`],
//! so failing [`ffi`] functions store their error here
//! and return a null pointer instead.
//! Each thread has one slot; a new error replaces the old one.
//! Successful calls leave the slot alone.
//! C callers read the slot through [`frost_err_occurred`]
//! and [`frost_err_message`].
//!
//! [`ffi`]: `crate::ffi`

use {
    super::Error,
    frost::ErrorKind,
    std::{
        cell::RefCell,
        ffi::{CString, c_char, c_int},
        ptr,
    },
};

struct Pending
{
    error: Error,

    /// What C callers see; formatted when the error is set.
    message: CString,
}

thread_local! {
    static PENDING: RefCell<Option<Pending>> = const { RefCell::new(None) };
}

/// Make an error pending, replacing any pending error.
pub fn set(error: Error)
{
    // Names from Rust callers may contain nul characters.
    let message = error.to_string().replace('\0', "\\0");
    let message = CString::new(message).unwrap_or_default();
    PENDING.with(|pending| *pending.borrow_mut() = Some(Pending{error, message}));
}

/// Remove and return the pending error.
pub fn take() -> Option<Error>
{
    PENDING.with(|pending| pending.borrow_mut().take().map(|p| p.error))
}

/// The category of the pending error, if any.
pub fn occurred() -> Option<ErrorKind>
{
    PENDING.with(|pending| pending.borrow().as_ref().map(|p| p.error.kind()))
}

/// Discard the pending error, if any.
pub fn clear()
{
    take();
}

/// The number C callers see for each category of error.
///
/// Zero means no error is pending.
pub fn code(kind: ErrorKind) -> c_int
{
    match kind {
        ErrorKind::Type   => 1,
        ErrorKind::Value  => 2,
        ErrorKind::Encode => 3,
        ErrorKind::Lookup => 4,
        ErrorKind::Index  => 5,
        ErrorKind::Usage  => 6,
    }
}

/// The [code] of the pending error, or zero if there is none.
///
/// [code]: `code`
#[no_mangle]
pub extern "C" fn frost_err_occurred() -> c_int
{
    occurred().map_or(0, code)
}

/// The message of the pending error, or null if there is none.
///
/// The message stays valid until the pending error
/// is replaced, taken, or cleared.
#[no_mangle]
pub extern "C" fn frost_err_message() -> *const c_char
{
    PENDING.with(|pending| {
        pending.borrow().as_ref().map_or(ptr::null(), |p| p.message.as_ptr())
    })
}

/// Discard the pending error, if any.
#[no_mangle]
pub extern "C" fn frost_err_clear()
{
    clear();
}

#[cfg(test)]
mod tests
{
    use {super::*, std::ffi::CStr};

    #[test]
    fn slot_holds_latest_error()
    {
        clear();
        assert_eq!(frost_err_occurred(), 0);

        set(Error::NullObject);
        set(Error::Armed);
        assert_eq!(occurred(), Some(ErrorKind::Usage));
        assert_eq!(frost_err_occurred(), 6);

        assert_eq!(take(), Some(Error::Armed));
        assert_eq!(take(), None);
        assert!(frost_err_message().is_null());
    }

    #[test]
    fn message_survives_until_cleared()
    {
        set(Error::NullObject);
        let message = frost_err_message();
        // SAFETY: The error is still pending.
        assert_eq!(unsafe { CStr::from_ptr(message) }, c"null object pointer");

        set(frost::Error::UnknownEncoding("a\0b".to_owned()).into());
        // SAFETY: The error is still pending.
        let message = unsafe { CStr::from_ptr(frost_err_message()) };
        assert_eq!(message.to_str(), Ok("unknown encoding: a\\0b"));

        clear();
        assert!(frost_err_message().is_null());
    }

    #[test]
    fn slots_are_per_thread()
    {
        set(Error::NullResource);
        std::thread::spawn(|| assert_eq!(occurred(), None)).join().unwrap();
        frost_err_clear();
        assert_eq!(occurred(), None);
    }
}
