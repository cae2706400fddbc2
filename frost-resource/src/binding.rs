use {
    super::RawResource,
    frost::{BorrowRef, Buffer, PinnedRoot, Root, Strategy},
    std::{
        ffi::{CStr, c_void},
        fmt,
        ptr::NonNull,
        slice,
        str,
    },
};

/// Shape of a [`Binding`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BindingKind
{
    /// Keeps the object alive.
    Reference,

    /// Keeps the object alive and its storage in place.
    Pin,

    /// Owns a private copy of the data.
    Copy,
}

impl fmt::Display for BindingKind
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(match self {
            Self::Reference => "reference",
            Self::Pin       => "pin",
            Self::Copy      => "copy",
        })
    }
}

/// What keeps a pointer handed out by an accessor valid.
///
/// Releasing a binding is infallible:
/// it decrements a reference count, removes a pin, or frees memory.
pub enum Binding<'i>
{
    /// Sufficient when storage never moves.
    Reference(Root<'i>),

    /// Sufficient when the collector honours pins.
    Pin(PinnedRoot<'i>),

    /// Needed when neither is, or when the data may change.
    Copy(Buffer),
}

impl<'i> Binding<'i>
{
    /// The shape of the binding.
    pub fn kind(&self) -> BindingKind
    {
        match self {
            Self::Reference(..) => BindingKind::Reference,
            Self::Pin(..)       => BindingKind::Pin,
            Self::Copy(..)      => BindingKind::Copy,
        }
    }

    /// Turn the binding into a release function and its payload.
    ///
    /// The binding is undone when the returned handle is closed,
    /// and leaked if it never is.
    pub fn into_raw(self) -> RawResource
    {
        match self {
            Self::Reference(root) => RawResource{
                release: Some(release_reference),
                payload: root.into_raw().cast::<c_void>().as_ptr(),
            },
            Self::Pin(pinned_root) => RawResource{
                release: Some(release_pin),
                payload: pinned_root.into_raw().cast::<c_void>().as_ptr(),
            },
            Self::Copy(buffer) => RawResource{
                release: Some(release_copy),
                payload: buffer.into_raw().cast::<c_void>().as_ptr(),
            },
        }
    }
}

impl<'i> fmt::Debug for Binding<'i>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Reference(root) => f.debug_tuple("Reference").field(root).finish(),
            Self::Pin(pinned)     => f.debug_tuple("Pin").field(pinned).finish(),
            Self::Copy(buffer)    => f.debug_tuple("Copy").field(buffer).finish(),
        }
    }
}

unsafe extern "C" fn release_reference(payload: *mut c_void)
{
    // SAFETY: The payload comes from Root::into_raw.
    drop(Root::from_raw(NonNull::new_unchecked(payload.cast())));
}

unsafe extern "C" fn release_pin(payload: *mut c_void)
{
    // SAFETY: The payload comes from PinnedRoot::into_raw.
    drop(PinnedRoot::from_raw(NonNull::new_unchecked(payload.cast())));
}

unsafe extern "C" fn release_copy(payload: *mut c_void)
{
    // SAFETY: The payload comes from Buffer::into_raw.
    Buffer::free_raw(payload);
}

/* -------------------------------------------------------------------------- */
/*                                Locating data                               */
/* -------------------------------------------------------------------------- */

/// Where an accessor finds its data.
pub (crate) enum View
{
    /// In the storage of the object.
    Storage,

    /// In a buffer the accessor made, such as transcoded text.
    Owned(Buffer),
}

/// Address and length of nul-terminated data kept valid by a binding.
#[derive(Clone, Copy, Debug)]
pub (crate) struct Span
{
    // INVARIANT: Points to len bytes followed by a nul.
    ptr: NonNull<u8>,
    len: usize,
}

impl Span
{
    fn of(buffer: &Buffer) -> Self
    {
        Self{ptr: buffer.as_ptr(), len: buffer.len()}
    }

    /// # Safety
    ///
    /// The binding that keeps the data valid must outlive `'r`.
    pub (crate) unsafe fn as_bytes<'r>(self) -> &'r [u8]
    {
        slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    /// The data up to the first nul.
    ///
    /// # Safety
    ///
    /// The binding that keeps the data valid must outlive `'r`.
    pub (crate) unsafe fn as_c_str<'r>(self) -> &'r CStr
    {
        CStr::from_ptr(self.ptr.as_ptr().cast())
    }

    /// # Safety
    ///
    /// The binding that keeps the data valid must outlive `'r`,
    /// and the data must be UTF-8.
    pub (crate) unsafe fn as_str<'r>(self) -> &'r str
    {
        str::from_utf8_unchecked(self.as_bytes())
    }
}

enum Located
{
    InPlace(Span),
    Copied(Buffer),
}

/// Bind the data of an object, and return where the data is.
///
/// The view decides where the data is, and may fail.
/// It is called with the storage of the object locked.
///
/// The storage is used in place when the strategy can keep it in place.
/// Storage of mutable objects is always copied, so that
/// the caller gets a snapshot that later mutations do not affect.
pub (crate) fn bind<'i, O, F>(object: &O, view: F)
    -> Result<(Binding<'i>, Span), frost::Error>
    where O: ?Sized + BorrowRef<'i>
        , F: FnOnce(&Buffer) -> Result<View, frost::Error>
{
    let isolate = object.isolate();
    let strategy = isolate.config().strategy;

    // The binding must be in place before the address of the storage
    // is read, or a collection could move the storage in between.
    let anchor = match strategy {
        _ if object.kind().is_mutable() => None,
        Strategy::RefCount => Some(Binding::Reference(object.root())),
        Strategy::Pin      => Some(Binding::Pin(object.pin())),
        Strategy::Copy     => None,
    };

    // Nothing is dropped while the storage is locked,
    // because dropping the anchor takes other locks.
    let located = isolate.with_storage(object, |storage| {
        let located = match view(storage)? {
            View::Owned(buffer) =>
                Located::Copied(buffer),
            View::Storage if anchor.is_some() =>
                Located::InPlace(Span::of(storage)),
            View::Storage =>
                Located::Copied(Buffer::from_bytes(storage.as_bytes())),
        };
        Ok::<_, frost::Error>(located)
    })?;

    match (located, anchor) {
        (Located::InPlace(span), Some(anchor)) =>
            Ok((anchor, span)),
        (Located::Copied(buffer), _) => {
            let span = Span::of(&buffer);
            Ok((Binding::Copy(buffer), span))
        },
        (Located::InPlace(..), None) =>
            unreachable!("Storage borrowed without binding"),
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, frost::{Config, Isolate}};

    fn config(strategy: Strategy) -> Config
    {
        Config{strategy, ..Config::default()}
    }

    #[test]
    fn binding_follows_strategy()
    {
        let cases = [
            (Strategy::RefCount, BindingKind::Reference),
            (Strategy::Pin,      BindingKind::Pin),
            (Strategy::Copy,     BindingKind::Copy),
        ];
        for (strategy, expected) in cases {
            Isolate::with(config(strategy), |isolate| {
                let bytes = isolate.new_bytes(b"abc");
                let (binding, span) = bind(&bytes, |_| Ok(View::Storage)).unwrap();
                assert_eq!(binding.kind(), expected);
                // SAFETY: The binding is still alive.
                assert_eq!(unsafe { span.as_bytes() }, b"abc");
            });
        }
    }

    #[test]
    fn mutable_objects_are_copied()
    {
        Isolate::with(Config::default(), |isolate| {
            let array = isolate.new_bytearray(b"abc");
            let (binding, span) = bind(&array, |_| Ok(View::Storage)).unwrap();
            assert_eq!(binding.kind(), BindingKind::Copy);
            assert_eq!(array.ref_count(), 1);

            isolate.bytearray_set(&array, 0, b'x').unwrap();
            // SAFETY: The binding is still alive.
            assert_eq!(unsafe { span.as_bytes() }, b"abc");
            drop(binding);
        });
    }

    #[test]
    fn owned_views_are_copied()
    {
        Isolate::with(Config::default(), |isolate| {
            let text = isolate.new_str("é");
            let view = |_: &Buffer| Ok(View::Owned(Buffer::from_bytes(b"\xE9")));
            let (binding, span) = bind(&text, view).unwrap();
            assert_eq!(binding.kind(), BindingKind::Copy);
            assert_eq!(text.ref_count(), 1);
            // SAFETY: The binding is still alive.
            assert_eq!(unsafe { span.as_c_str() }.to_bytes(), b"\xE9");
        });
    }

    #[test]
    fn failed_view_binds_nothing()
    {
        Isolate::with(config(Strategy::Pin), |isolate| {
            let text = isolate.new_str("abc");
            let result = bind(&text, |_| Err(frost::Error::EmbeddedNul));
            assert_eq!(result.unwrap_err(), frost::Error::EmbeddedNul);
            assert_eq!(text.ref_count(), 1);
            assert!(!text.is_pinned());
        });
    }

    #[test]
    fn raw_release_undoes_binding()
    {
        Isolate::with(config(Strategy::Pin), |isolate| {
            let bytes = isolate.new_bytes(b"abc");
            let (binding, _) = bind(&bytes, |_| Ok(View::Storage)).unwrap();
            let mut raw = binding.into_raw();
            assert!(bytes.is_pinned());
            assert_eq!(bytes.ref_count(), 2);

            // SAFETY: The handle was armed by into_raw.
            unsafe { raw.close(); }
            assert!(!bytes.is_pinned());
            assert_eq!(bytes.ref_count(), 1);
        });
    }
}
