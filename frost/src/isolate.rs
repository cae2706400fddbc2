use {
    super::{
        Buffer,
        BorrowRef,
        CapsuleDestructor,
        Config,
        Error,
        Kind,
        Root,
        UnsafeRef,
        object::{Extra, Object},
    },
    non_zero_ext::NonZeroExt,
    scope_exit::{ScopeExit, scope_exit},
    std::{
        collections::{HashMap, HashSet},
        ffi::{CStr, c_void},
        marker::{PhantomData, PhantomPinned},
        mem,
        num::NonZeroU64,
        ptr::NonNull,
        sync::{
            Mutex,
            MutexGuard,
            PoisonError,
            atomic::{AtomicBool, AtomicU64, Ordering::{Acquire, Relaxed, Release}, fence},
        },
    },
    tracing::{debug, trace, warn},
};

/// Ensure that `'i` is an invariant lifetime.
pub type IsolateId<'i> = PhantomData<fn(&'i ()) -> &'i ()>;

/// Heap of reference-counted objects.
///
/// The `'i` parameter identifies the isolate at the type level.
/// This prevents references from outliving the isolate,
/// and prevents objects from mixing between isolates.
/// The `'i` parameter can also be used as a lifetime for the isolate.
pub struct Isolate<'i>
{
    /// Uniquely identifies this isolate.
    _isolate_id: IsolateId<'i>,

    /// Isolates are referenced by every object.
    _pinned: PhantomPinned,

    config: Config,

    /// Every object that has not yet been destroyed.
    ///
    /// The collector walks this set to relocate objects,
    /// and teardown frees whatever is left in it.
    objects: Mutex<HashSet<UnsafeRef<'i>>>,

    /// Tracks the existence of each pinned root.
    ///
    /// This map stores for each object how many pinned roots reference it.
    /// If an object exists in this map, the collector
    /// is prohibited from relocating the storage of the object.
    /// The entries in this map are automatically maintained
    /// by [`PinnedRoot::new`] and [`PinnedRoot::drop`].
    ///
    /// [`PinnedRoot::new`]: `super::PinnedRoot::new`
    /// [`PinnedRoot::drop`]: `super::PinnedRoot::drop`
    pinned_roots: Mutex<HashMap<UnsafeRef<'i>, NonZeroU64>>,

    /// Total number of storage relocations performed.
    relocations: AtomicU64,

    /// Set once teardown has taken the remaining objects
    /// out of the registry; they are freed by teardown only.
    tearing_down: AtomicBool,
}

/* -------------------------------------------------------------------------- */
/*                        Creating and destroying isolates                    */
/* -------------------------------------------------------------------------- */

impl<'i> Isolate<'i>
{
    /// Create an isolate with a unique `'i` parameter.
    ///
    /// The isolate is passed to the given function.
    /// When the function returns or panics, the isolate is destroyed.
    /// Objects that are still alive at that point,
    /// because their roots were leaked, are freed as well.
    pub fn with<F, R>(config: Config, f: F) -> R
        // NOTE: Using Self here would allow the caller to choose 'i.
        //       That could result in multiple isolates with the same 'i.
        // NOTE: The isolate must be behind a reference.
        //       Otherwise the given function could move it.
        //       This must be prevented, because every object
        //       holds a reference to its isolate.
        where F: for<'j> FnOnce(&'j Isolate<'j>) -> R
    {
        let isolate = Isolate{
            _isolate_id: PhantomData,
            _pinned: PhantomPinned,
            config,
            objects: Mutex::new(HashSet::new()),
            pinned_roots: Mutex::new(HashMap::new()),
            relocations: AtomicU64::new(0),
            tearing_down: AtomicBool::new(false),
        };

        debug!(
            strategy = %config.strategy,
            collect_on_alloc = config.collect_on_alloc,
            "Created isolate",
        );

        scope_exit! { isolate.teardown(); }

        f(&isolate)
    }

    /// Free all remaining objects.
    ///
    /// Capsule destructors may hold roots and pinned roots
    /// to other remaining objects, and release them when called.
    /// Hence every destructor runs before any object is freed.
    fn teardown(&self)
    {
        self.tearing_down.store(true, Relaxed);

        // This may run during unwinding, so ignore poisoning.
        lock_ignoring_poison(&self.pinned_roots).clear();

        // Destructors may allocate objects, which are taken in the next round.
        let mut leaked = Vec::new();
        loop {
            let taken = mem::take(&mut *lock_ignoring_poison(&self.objects));
            if taken.is_empty() {
                break;
            }
            for &object in &taken {
                // SAFETY: Taken objects are not freed before the loop ends.
                unsafe { self.finalize(object); }
            }
            leaked.extend(taken);
        }

        let count = leaked.len();
        for object in leaked {
            // SAFETY: All destructors have run, so nothing can reach the object.
            unsafe { self.free(object); }
        }

        if count != 0 {
            warn!(leaked = count, "Isolate destroyed with live objects");
        }
    }

    /// The configuration the isolate was created with.
    pub fn config(&self) -> &Config
    {
        &self.config
    }

    /// The number of objects that have not yet been destroyed.
    pub fn live_objects(&self) -> usize
    {
        self.objects.lock().unwrap().len()
    }

    /// The total number of storage relocations performed by [`collect`].
    ///
    /// [`collect`]: `Self::collect`
    pub fn relocations(&self) -> u64
    {
        self.relocations.load(Relaxed)
    }
}

/* -------------------------------------------------------------------------- */
/*                              Creating objects                              */
/* -------------------------------------------------------------------------- */

/// Methods for creating objects.
///
/// Each method returns the only root to the new object,
/// so the new object starts out with a reference count of one.
impl<'i> Isolate<'i>
{
    fn alloc(&'i self, kind: Kind, storage: Buffer, extra: Extra<'i>) -> Root<'i>
    {
        if self.config.collect_on_alloc {
            self.collect();
        }

        let object = Box::new(Object{
            isolate: self,
            kind,
            ref_count: 1.into(),
            storage: Mutex::new(storage),
            extra,
        });
        let ptr = NonNull::from(Box::leak(object));

        // Free the object again if registering it panics.
        // SAFETY: The object is not referenced anywhere yet.
        let guard = ScopeExit::new(|| unsafe { drop(Box::from_raw(ptr.as_ptr())) });

        let inner = UnsafeRef::new(ptr.cast());
        self.objects.lock().unwrap().insert(inner);
        guard.dismiss();

        trace!(object = ?inner, %kind, "Allocated object");

        // SAFETY: The object is live and its one count is ours.
        unsafe { Root::adopt(inner) }
    }

    /// Create an immutable byte string.
    pub fn new_bytes(&'i self, bytes: &[u8]) -> Root<'i>
    {
        self.alloc(Kind::Bytes, Buffer::from_bytes(bytes), Extra::None)
    }

    /// Create a mutable byte array.
    pub fn new_bytearray(&'i self, bytes: &[u8]) -> Root<'i>
    {
        self.alloc(Kind::ByteArray, Buffer::from_bytes(bytes), Extra::None)
    }

    /// Create an immutable text object.
    pub fn new_str(&'i self, text: &str) -> Root<'i>
    {
        self.alloc(Kind::Str, Buffer::from_bytes(text.as_bytes()), Extra::None)
    }

    /// Create a capsule wrapping an opaque pointer.
    ///
    /// If given, the destructor is called with the pointer
    /// when the capsule is destroyed.
    pub fn new_capsule(
        &'i self,
        pointer: NonNull<c_void>,
        name: Option<&CStr>,
        destructor: Option<CapsuleDestructor<'i>>,
    ) -> Root<'i>
    {
        let storage = Buffer::from_bytes(name.map_or(&[][..], CStr::to_bytes));
        let extra = Extra::Capsule{
            pointer,
            named: name.is_some(),
            destructor: Mutex::new(destructor),
        };
        self.alloc(Kind::Capsule, storage, extra)
    }

    /// Create a function object with the given display name.
    pub fn new_function(&'i self, name: &str) -> Root<'i>
    {
        self.alloc(Kind::Function, Buffer::from_bytes(name.as_bytes()), Extra::None)
    }

    /// Create an integer object.
    pub fn new_int(&'i self, value: i64) -> Root<'i>
    {
        self.alloc(Kind::Int, Buffer::from_bytes(b""), Extra::Int(value))
    }
}

/* -------------------------------------------------------------------------- */
/*                             Working with objects                           */
/* -------------------------------------------------------------------------- */

impl<'i> Isolate<'i>
{
    /// Call a function with the storage of an object.
    ///
    /// The storage is locked for the duration of the call,
    /// so the collector cannot relocate it in the meantime.
    /// Under a moving strategy, any address obtained from the storage
    /// is only good after the call if the object is [pinned].
    ///
    /// [pinned]: `super::PinnedRoot`
    pub fn with_storage<O, F, R>(&self, object: &O, f: F) -> R
        where O: ?Sized + BorrowRef<'i>, F: FnOnce(&Buffer) -> R
    {
        // SAFETY: borrow_ref returns a reference to a live object.
        let object = unsafe { object.borrow_ref().object() };
        let storage = object.storage.lock().unwrap();
        f(&storage)
    }

    /// Append bytes to a byte array.
    pub fn bytearray_extend<O>(&self, object: &O, bytes: &[u8]) -> Result<(), Error>
        where O: ?Sized + BorrowRef<'i>
    {
        object.expect_kind(Kind::ByteArray)?;
        // SAFETY: borrow_ref returns a reference to a live object.
        let object = unsafe { object.borrow_ref().object() };
        object.storage.lock().unwrap().extend(bytes);
        Ok(())
    }

    /// Overwrite one byte of a byte array.
    pub fn bytearray_set<O>(&self, object: &O, index: usize, value: u8)
        -> Result<(), Error>
        where O: ?Sized + BorrowRef<'i>
    {
        object.expect_kind(Kind::ByteArray)?;
        // SAFETY: borrow_ref returns a reference to a live object.
        let object = unsafe { object.borrow_ref().object() };
        let mut storage = object.storage.lock().unwrap();
        let len = storage.len();
        storage.set(index, value).ok_or(Error::Index{index, len})
    }

    /// The value of an integer object.
    pub fn int_value<O>(&self, object: &O) -> Result<i64, Error>
        where O: ?Sized + BorrowRef<'i>
    {
        object.expect_kind(Kind::Int)?;
        // SAFETY: borrow_ref returns a reference to a live object.
        match unsafe { &object.borrow_ref().object().extra } {
            Extra::Int(value) => Ok(*value),
            _ => unreachable!("Int object without integer value"),
        }
    }

    /// Whether a capsule has a name.
    pub fn capsule_is_named<O>(&self, object: &O) -> Result<bool, Error>
        where O: ?Sized + BorrowRef<'i>
    {
        object.expect_kind(Kind::Capsule)?;
        // SAFETY: borrow_ref returns a reference to a live object.
        match unsafe { &object.borrow_ref().object().extra } {
            Extra::Capsule{named, ..} => Ok(*named),
            _ => unreachable!("Capsule object without capsule data"),
        }
    }

    /// The pointer wrapped by a capsule.
    ///
    /// The given name must match the name of the capsule,
    /// where [`None`] matches only an unnamed capsule.
    pub fn capsule_pointer<O>(&self, object: &O, name: Option<&CStr>)
        -> Result<NonNull<c_void>, Error>
        where O: ?Sized + BorrowRef<'i>
    {
        object.expect_kind(Kind::Capsule)?;
        // SAFETY: borrow_ref returns a reference to a live object.
        let data = unsafe { object.borrow_ref().object() };
        let Extra::Capsule{pointer, named, ..} = &data.extra
            else { unreachable!("Capsule object without capsule data") };

        let actual = named.then(|| {
            self.with_storage(object, |storage| storage.as_c_str().to_owned())
        });

        if actual.as_deref() != name {
            let expected = name.map(CStr::to_owned);
            return Err(Error::CapsuleName{expected, actual});
        }

        Ok(*pointer)
    }
}

/* -------------------------------------------------------------------------- */
/*                          Reference counts and pins                         */
/* -------------------------------------------------------------------------- */

impl<'i> Isolate<'i>
{
    /// Increment the reference count of an object.
    ///
    /// # Safety
    ///
    /// The object must be live.
    pub (crate) unsafe fn retain(&self, object: UnsafeRef<'i>)
    {
        let previous = object.object().ref_count.fetch_add(1, Relaxed);
        debug_assert!(previous > 0, "Use-after-free of object");
    }

    /// Decrement the reference count of an object,
    /// destroying the object if the count drops to zero.
    ///
    /// # Safety
    ///
    /// The caller must own one count of the reference count,
    /// which it gives up by calling this method.
    pub (crate) unsafe fn release(&self, object: UnsafeRef<'i>)
    {
        let previous = object.object().ref_count.fetch_sub(1, Release);
        match previous {
            0 => unreachable!("Use-after-free of object"),
            1 => {
                fence(Acquire);
                self.destroy(object);
            },
            _ => (),
        }
    }

    /// Unregister and free an object whose reference count dropped to zero.
    ///
    /// During teardown, objects that teardown already took
    /// out of the registry are left for teardown to free.
    unsafe fn destroy(&self, object: UnsafeRef<'i>)
    {
        let registered = lock_ignoring_poison(&self.objects).remove(&object);
        if !registered {
            assert!(self.tearing_down.load(Relaxed), "Use-after-free of object");
            return;
        }

        trace!(?object, "Destroyed object");
        self.finalize(object);
        self.free(object);
    }

    /// Run the destructor of a capsule, unless it already ran.
    ///
    /// The destructor may in turn release other objects.
    unsafe fn finalize(&self, object: UnsafeRef<'i>)
    {
        if let Extra::Capsule{pointer, destructor, ..} = &object.object().extra {
            let destructor = lock_ignoring_poison(destructor).take();
            if let Some(destructor) = destructor {
                destructor(*pointer);
            }
        }
    }

    /// Free an object that is no longer registered and was finalized.
    unsafe fn free(&self, object: UnsafeRef<'i>)
    {
        let ptr = object.as_ptr().cast::<Object<'i>>();
        drop(Box::from_raw(ptr.as_ptr()));
    }

    /// Whether any pinned roots reference the object.
    pub fn is_pinned(&self, object: UnsafeRef<'i>) -> bool
    {
        self.pinned_roots.lock().unwrap().contains_key(&object)
    }

    /// Increment the pinned root count for an object.
    ///
    /// # Safety
    ///
    /// Must only be called by [`PinnedRoot::new`].
    ///
    /// [`PinnedRoot::new`]: `super::PinnedRoot::new`
    pub (crate) unsafe fn retain_pinned_root(&self, object: UnsafeRef<'i>)
    {
        const ERR: &str = "Too many pinned roots for object";
        let mut pinned_roots = self.pinned_roots.lock().unwrap();
        pinned_roots.entry(object)
            .and_modify(|n| *n = n.increment().expect(ERR))
            .or_insert(NonZeroU64::ONE);
    }

    /// Decrement the pinned root count for an object.
    ///
    /// # Safety
    ///
    /// Must only be called by [`PinnedRoot::drop`].
    ///
    /// [`PinnedRoot::drop`]: `super::PinnedRoot::drop`
    pub (crate) unsafe fn release_pinned_root(&self, object: UnsafeRef<'i>)
    {
        use std::collections::hash_map::Entry::*;
        let mut pinned_roots = self.pinned_roots.lock().unwrap();
        match pinned_roots.entry(object) {
            Occupied(mut entry) =>
                match entry.get().decrement() {
                    Some(n) => { entry.insert(n); },
                    None    => { entry.remove_entry(); },
                },
            // Teardown clears the registry before running destructors.
            Vacant(..) if self.tearing_down.load(Relaxed) =>
                (),
            Vacant(..) =>
                unreachable!("Use-after-drop of pinned root"),
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                 Collection                                 */
/* -------------------------------------------------------------------------- */

impl<'i> Isolate<'i>
{
    /// Relocate the storage of every unpinned object.
    ///
    /// This is what a moving collector does to compact the heap.
    /// Under [`Strategy::RefCount`] storage never moves,
    /// and this method does nothing.
    /// Returns the number of objects whose storage was relocated.
    ///
    /// [`Strategy::RefCount`]: `super::Strategy::RefCount`
    pub fn collect(&self) -> usize
    {
        if !self.config.strategy.moves_objects() {
            return 0;
        }

        // Holding the pin registry for the whole pass
        // makes pinning atomic with respect to relocation.
        let pinned_roots = self.pinned_roots.lock().unwrap();
        let objects = self.objects.lock().unwrap();

        let mut relocated = 0;
        for &object in objects.iter() {
            if pinned_roots.contains_key(&object) {
                continue;
            }
            // SAFETY: Registered objects are not freed while we hold the lock.
            let object = unsafe { object.object() };
            object.storage.lock().unwrap().relocate();
            relocated += 1;
        }

        let pinned = pinned_roots.len();
        drop(objects);
        drop(pinned_roots);

        self.relocations.fetch_add(relocated as u64, Relaxed);
        debug!(relocated, pinned, "Collected");
        relocated
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<T>
{
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
