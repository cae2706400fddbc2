//! In-memory representation of objects.

use {
    super::{Buffer, Isolate},
    std::{
        ffi::c_void,
        fmt,
        ptr::NonNull,
        sync::{Mutex, atomic::AtomicUsize},
    },
};

/// Kind of object.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind
{
    Bytes,
    ByteArray,
    Str,
    Capsule,
    Function,
    Int,
}

impl Kind
{
    /// The name of the kind, as it appears in error messages.
    pub fn name(self) -> &'static str
    {
        match self {
            Self::Bytes     => "bytes",
            Self::ByteArray => "bytearray",
            Self::Str       => "str",
            Self::Capsule   => "capsule",
            Self::Function  => "function",
            Self::Int       => "int",
        }
    }

    /// Whether the storage of such objects can change after creation.
    pub fn is_mutable(self) -> bool
    {
        matches!(self, Self::ByteArray)
    }
}

impl fmt::Display for Kind
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Function called with the pointer of a capsule when it is destroyed.
pub type CapsuleDestructor<'i> = Box<dyn 'i + FnOnce(NonNull<c_void>) + Send>;

/// Data for each object.
///
/// Objects are boxed and referenced through [`UnsafeRef`],
/// which points at this struct.
///
/// [`UnsafeRef`]: `super::UnsafeRef`
pub (crate) struct Object<'i>
{
    /// The isolate to which this object belongs.
    pub isolate: &'i Isolate<'i>,

    pub kind: Kind,

    /// The number of strong references.
    ///
    /// The object is destroyed when this drops to zero.
    pub ref_count: AtomicUsize,

    /// The bytes of a byte string, the UTF-8 of a text object,
    /// the name of a capsule or function, or nothing.
    ///
    /// The collector locks this to relocate it,
    /// so whoever reads its address must lock it as well.
    pub storage: Mutex<Buffer>,

    pub extra: Extra<'i>,
}

/// Kind-specific data that is not part of the storage.
pub (crate) enum Extra<'i>
{
    None,

    Int(i64),

    Capsule{
        pointer: NonNull<c_void>,

        /// Whether the storage holds a name.
        named: bool,

        /// Taken when the capsule is destroyed.
        destructor: Mutex<Option<CapsuleDestructor<'i>>>,
    },
}
