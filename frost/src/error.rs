use {
    super::{Encoding, Kind},
    std::ffi::CString,
    thiserror::Error,
};

/// Category of an [`Error`].
///
/// This is what callers that only see a pending error
/// (rather than a [`Result`]) can match on.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind
{
    Type,
    Value,
    Encode,
    Lookup,
    Index,
    Usage,
}

/// Error returned by operations on objects.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error
{
    #[error("expected {expected} object, got {actual}")]
    Type{expected: Kind, actual: Kind},

    #[error(
        "'{encoding}' codec can't encode character {character:?} \
         in position {position}: ordinal not in range({})",
        .encoding.limit()
    )]
    Encode{encoding: Encoding, character: char, position: usize},

    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("embedded null byte")]
    EmbeddedNul,

    #[error("capsule has no name")]
    UnnamedCapsule,

    #[error("capsule name {actual:?} does not match {expected:?}")]
    CapsuleName{expected: Option<CString>, actual: Option<CString>},

    #[error("bytearray index {index} out of range for length {len}")]
    Index{index: usize, len: usize},
}

impl Error
{
    /// The category of the error.
    pub fn kind(&self) -> ErrorKind
    {
        match self {
            Self::Type{..}            => ErrorKind::Type,
            Self::Encode{..}          => ErrorKind::Encode,
            Self::UnknownEncoding(..) => ErrorKind::Lookup,
            Self::EmbeddedNul         => ErrorKind::Value,
            Self::UnnamedCapsule      => ErrorKind::Value,
            Self::CapsuleName{..}     => ErrorKind::Value,
            Self::Index{..}           => ErrorKind::Index,
        }
    }
}
