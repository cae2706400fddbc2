use {
    super::{Error, Isolate, IsolateId, Kind, object::Object},
    std::{
        fmt,
        marker::PhantomData,
        mem::forget,
        ptr::NonNull,
        sync::atomic::Ordering::Relaxed,
    },
};

/* -------------------------------------------------------------------------- */
/*                                  BorrowRef                                 */
/* -------------------------------------------------------------------------- */

/// Trait for obtaining an [`UnsafeRef`] for safe use.
///
/// This trait is implemented by the various safe reference types.
/// It provides methods that can be used to safely work with objects,
/// by guaranteeing the reference is not dangling.
///
/// # Safety
///
/// The implementation of [`borrow_ref`][`Self::borrow_ref`]
/// must always return a reference to a live object.
/// Any overridden provided methods must be behaviorally
/// equivalent to their original provided implementations.
pub unsafe trait BorrowRef<'i>
{
    /// Return a reference to a live object.
    fn borrow_ref(&self) -> UnsafeRef<'i>;

    /// Obtain the isolate the referenced object belongs to.
    fn isolate(&self) -> &'i Isolate<'i>
    {
        // SAFETY: borrow_ref returns a reference to a live object.
        unsafe { self.borrow_ref().object().isolate }
    }

    /// The kind of the referenced object.
    fn kind(&self) -> Kind
    {
        // SAFETY: borrow_ref returns a reference to a live object.
        unsafe { self.borrow_ref().object().kind }
    }

    /// Fail with a type error unless the object is of the given kind.
    fn expect_kind(&self, expected: Kind) -> Result<(), Error>
    {
        let actual = self.kind();
        if actual != expected {
            return Err(Error::Type{expected, actual});
        }
        Ok(())
    }

    /// The number of strong references to the object.
    ///
    /// Other threads may change the count at any time,
    /// so this is mostly useful for diagnostics and tests.
    fn ref_count(&self) -> usize
    {
        // SAFETY: borrow_ref returns a reference to a live object.
        unsafe { self.borrow_ref().object().ref_count.load(Relaxed) }
    }

    /// Whether any pinned roots reference the object.
    fn is_pinned(&self) -> bool
    {
        self.isolate().is_pinned(self.borrow_ref())
    }

    /// Create a new strong root to the object.
    fn root(&self) -> Root<'i>
    {
        // SAFETY: borrow_ref returns a reference to a live object.
        unsafe { Root::new(self.borrow_ref()) }
    }

    /// Create a pinned root to the object.
    fn pin(&self) -> PinnedRoot<'i>
    {
        // SAFETY: borrow_ref returns a reference to a live object.
        unsafe { PinnedRoot::new(self.borrow_ref()) }
    }

    /// Copy the storage of the object.
    fn to_bytes(&self) -> Vec<u8>
    {
        self.isolate().with_storage(self, |storage| storage.as_bytes().to_vec())
    }
}

/* -------------------------------------------------------------------------- */
/*                                  UnsafeRef                                 */
/* -------------------------------------------------------------------------- */

/// Reference to an object owned by an isolate.
///
/// This is the most basic type of reference to an object.
/// It provides no safety guarantees regarding object lifetimes.
/// References may be dangling, so care must be taken to ensure safe use.
///
/// The address of an object never changes, even under a moving strategy;
/// the collector relocates the storage of objects, not the objects.
/// Hence the [`Hash`] and [`Ord`] impls are stable.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnsafeRef<'i>
{
    isolate_id: IsolateId<'i>,
    inner: NonNull<()>,
}

// SAFETY: Working with UnsafeRef already requires unsafe.
unsafe impl<'i> Send for UnsafeRef<'i> { }
unsafe impl<'i> Sync for UnsafeRef<'i> { }

impl<'i> UnsafeRef<'i>
{
    /// Create a reference from the address of an object.
    pub fn new(inner: NonNull<()>) -> Self
    {
        Self{isolate_id: PhantomData, inner}
    }

    /// Obtain the address of the referenced object.
    pub fn as_ptr(self) -> NonNull<()>
    {
        self.inner
    }

    /// Access the object data.
    ///
    /// # Safety
    ///
    /// The reference must reference a live object,
    /// and the returned reference must not outlive it.
    pub (crate) unsafe fn object<'a>(self) -> &'a Object<'i>
    {
        &*self.inner.cast::<Object<'i>>().as_ptr()
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Root                                    */
/* -------------------------------------------------------------------------- */

/// Strong reference to an object.
///
/// A root keeps the object alive by holding one count of its reference count.
/// The [`Clone`] impl increments the count and the [`Drop`] impl decrements it;
/// dropping the last root to an object destroys the object.
///
/// A root does not keep the storage of the object in place
/// under a moving strategy; use a [`PinnedRoot`] for that.
pub struct Root<'i>
{
    // INVARIANT: The reference references a live object.
    // INVARIANT: The root owns one count of the reference count.
    inner: UnsafeRef<'i>,
}

// SAFETY: Reference counts are updated atomically
//         and object storage is behind a mutex.
unsafe impl<'i> Send for Root<'i> { }
unsafe impl<'i> Sync for Root<'i> { }

impl<'i> Root<'i>
{
    /// Create a root, incrementing the reference count.
    ///
    /// # Safety
    ///
    /// The referenced object must be live.
    pub (crate) unsafe fn new(inner: UnsafeRef<'i>) -> Self
    {
        inner.object().isolate.retain(inner);
        Self{inner}
    }

    /// Create a root that takes over an existing count.
    ///
    /// # Safety
    ///
    /// The referenced object must be live,
    /// and the caller must own one count of its reference count.
    pub (crate) unsafe fn adopt(inner: UnsafeRef<'i>) -> Self
    {
        Self{inner}
    }

    /// Give up the root without decrementing the reference count.
    ///
    /// The count is transferred to the returned pointer,
    /// which must eventually be passed to [`from_raw`][`Self::from_raw`].
    pub fn into_raw(self) -> NonNull<()>
    {
        let inner = self.inner;
        forget(self);
        inner.as_ptr()
    }

    /// Take back a root given up with [`into_raw`][`Self::into_raw`].
    ///
    /// # Safety
    ///
    /// The pointer must come from [`into_raw`][`Self::into_raw`],
    /// and each such pointer must be taken back at most once.
    pub unsafe fn from_raw(ptr: NonNull<()>) -> Self
    {
        Self::adopt(UnsafeRef::new(ptr))
    }
}

// SAFETY: Roots always reference live objects.
unsafe impl<'i> BorrowRef<'i> for Root<'i>
{
    fn borrow_ref(&self) -> UnsafeRef<'i>
    {
        self.inner
    }
}

impl<'i> Clone for Root<'i>
{
    fn clone(&self) -> Self
    {
        BorrowRef::root(self)
    }
}

impl<'i> Drop for Root<'i>
{
    fn drop(&mut self)
    {
        let isolate = self.isolate();
        // SAFETY: Called from Root::drop.
        unsafe { isolate.release(self.inner); }
    }
}

/* -------------------------------------------------------------------------- */
/*                                 PinnedRoot                                 */
/* -------------------------------------------------------------------------- */

/// Pinned root to an object.
///
/// A pinned root ensures the object won't be destroyed
/// and that its storage won't be moved by the collector.
/// This allows for safe borrowing of the storage of the object.
/// This comes at the cost of more overhead than a [`Root`]:
/// the [`Clone`] and [`Drop`] impls update a registry of all pinned roots.
pub struct PinnedRoot<'i>
{
    // INVARIANT: The reference references a live object.
    // INVARIANT: The pinned root owns one reference count and one pin count.
    inner: UnsafeRef<'i>,
}

// SAFETY: Registry of all pinned roots is updated synchronized.
unsafe impl<'i> Send for PinnedRoot<'i> { }
unsafe impl<'i> Sync for PinnedRoot<'i> { }

impl<'i> PinnedRoot<'i>
{
    /// Create a pinned root from a given reference.
    ///
    /// # Safety
    ///
    /// The referenced object must be live.
    pub (crate) unsafe fn new(inner: UnsafeRef<'i>) -> Self
    {
        let isolate = inner.object().isolate;
        isolate.retain(inner);
        isolate.retain_pinned_root(inner);
        Self{inner}
    }

    /// Give up the pinned root without unpinning the object.
    ///
    /// The counts are transferred to the returned pointer,
    /// which must eventually be passed to [`from_raw`][`Self::from_raw`].
    pub fn into_raw(self) -> NonNull<()>
    {
        let inner = self.inner;
        forget(self);
        inner.as_ptr()
    }

    /// Take back a pinned root given up with [`into_raw`][`Self::into_raw`].
    ///
    /// # Safety
    ///
    /// The pointer must come from [`into_raw`][`Self::into_raw`],
    /// and each such pointer must be taken back at most once.
    pub unsafe fn from_raw(ptr: NonNull<()>) -> Self
    {
        Self{inner: UnsafeRef::new(ptr)}
    }
}

// SAFETY: Pinned roots always reference live objects.
unsafe impl<'i> BorrowRef<'i> for PinnedRoot<'i>
{
    fn borrow_ref(&self) -> UnsafeRef<'i>
    {
        self.inner
    }
}

impl<'i> Clone for PinnedRoot<'i>
{
    fn clone(&self) -> Self
    {
        BorrowRef::pin(self)
    }
}

impl<'i> Drop for PinnedRoot<'i>
{
    fn drop(&mut self)
    {
        let isolate = self.isolate();
        // SAFETY: Called from PinnedRoot::drop.
        unsafe {
            isolate.release_pinned_root(self.inner);
            isolate.release(self.inner);
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                 Debug impls                                */
/* -------------------------------------------------------------------------- */

impl<'i> fmt::Debug for UnsafeRef<'i>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<'i> fmt::Debug for Root<'i>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Root")
            .field("object", &self.inner)
            .field("kind", &self.kind())
            .finish()
    }
}

impl<'i> fmt::Debug for PinnedRoot<'i>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("PinnedRoot")
            .field("object", &self.inner)
            .field("kind", &self.kind())
            .finish()
    }
}
