use std::{
    alloc::{Layout, handle_alloc_error},
    ffi::{CStr, c_void},
    fmt,
    mem::forget,
    ptr::{self, NonNull, copy_nonoverlapping},
    slice,
};

/// Nul-terminated byte buffer allocated with `malloc`.
///
/// The buffer owns `len + 1` bytes, the last of which is always nul.
/// Because the memory comes from the C allocator,
/// ownership of a buffer can be handed across an FFI boundary
/// as a bare pointer with [`into_raw`], and given back with [`free_raw`].
///
/// [`into_raw`]: `Self::into_raw`
/// [`free_raw`]: `Self::free_raw`
pub struct Buffer
{
    // INVARIANT: Points to len + 1 bytes allocated with malloc.
    // INVARIANT: The byte at offset len is nul.
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: Buffer uniquely owns its allocation.
unsafe impl Send for Buffer { }
unsafe impl Sync for Buffer { }

impl Buffer
{
    /// Create a buffer holding a copy of the given bytes.
    ///
    /// The bytes must not include the terminating nul;
    /// this method will automatically add the terminating nul.
    pub fn from_bytes(bytes: &[u8]) -> Self
    {
        Self::from_fn(bytes.len(), |buf| buf.copy_from_slice(bytes))
    }

    /// Create a buffer and initialize it with a function.
    ///
    /// The function is given the `len` bytes that make up the buffer,
    /// zeroed, and excluding the terminating nul.
    pub fn from_fn<F>(len: usize, init: F) -> Self
        where F: FnOnce(&mut [u8])
    {
        let ptr = alloc(len);

        // SAFETY: alloc returned len + 1 writable bytes.
        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0, len + 1);
            init(slice::from_raw_parts_mut(ptr.as_ptr(), len));
        }

        Self{ptr, len}
    }

    /// The number of bytes, excluding the terminating nul.
    pub fn len(&self) -> usize
    {
        self.len
    }

    /// Whether the buffer holds no bytes besides the terminating nul.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// The address of the first byte.
    ///
    /// The address changes when the buffer is [relocated] or [extended].
    ///
    /// [relocated]: `Self::relocate`
    /// [extended]: `Self::extend`
    pub fn as_ptr(&self) -> NonNull<u8>
    {
        self.ptr
    }

    /// The bytes, excluding the terminating nul.
    pub fn as_bytes(&self) -> &[u8]
    {
        // SAFETY: The buffer holds len initialized bytes.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The bytes, including the terminating nul.
    pub fn as_bytes_with_nul(&self) -> &[u8]
    {
        // SAFETY: The buffer holds len + 1 initialized bytes.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len + 1) }
    }

    /// The bytes up to the first nul, as a C string.
    pub fn as_c_str(&self) -> &CStr
    {
        // SAFETY: The buffer is nul-terminated.
        unsafe { CStr::from_ptr(self.ptr.as_ptr().cast()) }
    }

    /// Move the bytes to a fresh allocation.
    ///
    /// The new allocation is made before the old one is freed,
    /// so the buffer is guaranteed to end up at a different address.
    /// Any pointer obtained from [`as_ptr`][`Self::as_ptr`]
    /// before calling this method is dangling afterwards.
    pub fn relocate(&mut self)
    {
        let new = alloc(self.len);

        // SAFETY: Both allocations hold len + 1 bytes and are distinct.
        unsafe {
            copy_nonoverlapping(self.ptr.as_ptr(), new.as_ptr(), self.len + 1);
            libc::free(self.ptr.as_ptr().cast());
        }

        self.ptr = new;
    }

    /// Append bytes to the buffer.
    ///
    /// The buffer may move to a different address.
    pub fn extend(&mut self, bytes: &[u8])
    {
        let len = self.len.checked_add(bytes.len())
            .expect("Cannot allocate a buffer this large");
        let layout = layout(len);

        // SAFETY: ptr was allocated with malloc.
        let ptr = unsafe { libc::realloc(self.ptr.as_ptr().cast(), layout.size()) };
        let Some(ptr) = NonNull::new(ptr.cast::<u8>())
            else { handle_alloc_error(layout) };

        // SAFETY: The allocation now holds len + 1 bytes.
        unsafe {
            let tail = ptr.as_ptr().add(self.len);
            copy_nonoverlapping(bytes.as_ptr(), tail, bytes.len());
            *ptr.as_ptr().add(len) = 0;
        }

        self.ptr = ptr;
        self.len = len;
    }

    /// Overwrite the byte at the given index.
    ///
    /// Returns [`None`] and changes nothing if the index is out of bounds.
    pub fn set(&mut self, index: usize, value: u8) -> Option<()>
    {
        if index >= self.len {
            return None;
        }

        // SAFETY: index is in bounds.
        unsafe { *self.ptr.as_ptr().add(index) = value; }
        Some(())
    }

    /// Give up ownership of the allocation.
    ///
    /// The returned pointer must eventually be passed to
    /// [`free_raw`][`Self::free_raw`] to avoid leaking memory.
    pub fn into_raw(self) -> NonNull<u8>
    {
        let ptr = self.ptr;
        forget(self);
        ptr
    }

    /// Free an allocation obtained from [`into_raw`][`Self::into_raw`].
    ///
    /// # Safety
    ///
    /// The pointer must come from [`into_raw`][`Self::into_raw`]
    /// and must not have been freed before.
    pub unsafe fn free_raw(ptr: *mut c_void)
    {
        libc::free(ptr);
    }
}

impl Drop for Buffer
{
    fn drop(&mut self)
    {
        // SAFETY: ptr was allocated with malloc.
        unsafe { libc::free(self.ptr.as_ptr().cast()); }
    }
}

impl fmt::Debug for Buffer
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Buffer")
            .field("ptr", &self.ptr)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// Layout of a buffer holding `len` bytes and the terminating nul.
fn layout(len: usize) -> Layout
{
    len.checked_add(1)
        .and_then(|size| Layout::array::<u8>(size).ok())
        .expect("Cannot allocate a buffer this large")
}

/// Allocate room for `len` bytes and the terminating nul.
fn alloc(len: usize) -> NonNull<u8>
{
    let layout = layout(len);

    // SAFETY: The size is non-zero, because it includes the nul.
    let ptr = unsafe { libc::malloc(layout.size()) };
    let Some(ptr) = NonNull::new(ptr.cast::<u8>())
        else { handle_alloc_error(layout) };

    ptr
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        proptest::{collection::vec as pvec, num::u8::ANY as pu8, proptest},
    };

    #[test]
    fn empty_buffer_is_nul()
    {
        let buffer = Buffer::from_bytes(b"");
        assert!(buffer.is_empty());
        assert_eq!(buffer.as_bytes_with_nul(), b"\0");
        assert_eq!(buffer.as_c_str().to_bytes(), b"");
    }

    #[test]
    fn extend_appends_and_terminates()
    {
        let mut buffer = Buffer::from_bytes(b"ab");
        buffer.extend(b"cd");
        assert_eq!(buffer.as_bytes_with_nul(), b"abcd\0");
    }

    #[test]
    fn set_checks_bounds()
    {
        let mut buffer = Buffer::from_bytes(b"ab");
        assert_eq!(buffer.set(1, b'z'), Some(()));
        assert_eq!(buffer.set(2, b'z'), None);
        assert_eq!(buffer.as_bytes_with_nul(), b"az\0");
    }

    #[test]
    fn into_raw_then_free_raw()
    {
        let ptr = Buffer::from_bytes(b"handed over").into_raw();
        // SAFETY: ptr comes from into_raw.
        unsafe { Buffer::free_raw(ptr.as_ptr().cast()); }
    }

    proptest!
    {
        #[test]
        fn relocate_moves_and_preserves(expected in pvec(pu8, 0 .. 100))
        {
            let mut buffer = Buffer::from_bytes(&expected);
            let before = buffer.as_ptr();
            buffer.relocate();
            assert_ne!(buffer.as_ptr(), before);
            assert_eq!(buffer.as_bytes(), &expected[..]);
            assert_eq!(buffer.as_bytes_with_nul().last(), Some(&0));
        }
    }
}
