use std::{ffi::c_void, ptr};

/// Function that undoes a binding, given its payload.
///
/// Release functions must not fail and must not unwind.
pub type ReleaseFn = unsafe extern "C" fn(payload: *mut c_void);

/// Resource handle as seen from C.
///
/// A handle with a release function is armed:
/// [`close`][`Self::close`] must be called exactly once to release it.
/// A handle without a release function has nothing to release.
/// The contents of a handle that was declared but never
/// armed by a successful accessor call are meaningless.
///
/// Handles are neither [`Copy`] nor [`Clone`],
/// so that an armed handle cannot be closed through two copies.
#[derive(Debug)]
#[repr(C)]
pub struct RawResource
{
    /// How to release the resource, or [`None`] if there is nothing to release.
    pub release: Option<ReleaseFn>,

    /// Passed unchanged to the release function.
    pub payload: *mut c_void,
}

impl RawResource
{
    /// Handle with nothing to release.
    pub const EMPTY: Self = Self{release: None, payload: ptr::null_mut()};

    /// Whether the handle holds something to release.
    pub fn is_armed(&self) -> bool
    {
        self.release.is_some()
    }

    /// Release the resource, if there is one.
    ///
    /// The release function is cleared before it is called,
    /// so closing a handle more than once is a no-op.
    ///
    /// # Safety
    ///
    /// The handle must have been initialized,
    /// either as [`EMPTY`][`Self::EMPTY`] or by an accessor.
    /// The data it kept valid must not be used afterwards.
    pub unsafe fn close(&mut self)
    {
        if let Some(release) = self.release.take() {
            release(self.payload);
        }
    }
}

impl Default for RawResource
{
    fn default() -> Self
    {
        Self::EMPTY
    }
}

/// Release a resource handle.
///
/// Does nothing if `resource` is null or has nothing to release.
///
/// # Safety
///
/// See [`RawResource::close`].
#[no_mangle]
pub unsafe extern "C" fn frost_resource_close(resource: *mut RawResource)
{
    if let Some(resource) = resource.as_mut() {
        resource.close();
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, std::cell::Cell};

    thread_local! {
        static CALLS: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn count_call(payload: *mut c_void)
    {
        assert_eq!(payload as usize, 0x1234);
        CALLS.with(|calls| calls.set(calls.get() + 1));
    }

    #[test]
    fn close_fires_once()
    {
        let mut resource = RawResource{
            release: Some(count_call),
            payload: 0x1234 as *mut c_void,
        };

        // SAFETY: The handle is initialized.
        unsafe {
            frost_resource_close(&mut resource);
            frost_resource_close(&mut resource);
        }

        assert!(!resource.is_armed());
        assert_eq!(CALLS.with(Cell::get), 1);
    }

    #[test]
    fn moved_handle_closes_once()
    {
        let resource = RawResource{release: Some(count_call), payload: 0x1234 as *mut c_void};
        let mut holder = Some(resource);
        let before = CALLS.with(Cell::get);

        // SAFETY: The handle is initialized.
        unsafe {
            if let Some(resource) = holder.as_mut() {
                resource.close();
            }
            if let Some(mut resource) = holder.take() {
                resource.close();
            }
        }

        assert_eq!(CALLS.with(Cell::get), before + 1);
    }

    #[test]
    fn close_empty_is_noop()
    {
        let mut resource = RawResource::EMPTY;
        // SAFETY: The handle is initialized and null is allowed.
        unsafe {
            resource.close();
            resource.close();
            frost_resource_close(ptr::null_mut());
        }
        assert!(!resource.is_armed());
    }
}
