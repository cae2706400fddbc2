use {frost::ErrorKind, thiserror::Error};

/// Error returned by an accessor.
///
/// When an accessor returns an error,
/// the resource handle passed to it is left untouched.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error
{
    #[error(transparent)]
    Object(#[from] frost::Error),

    #[error("resource handle is already armed")]
    Armed,

    #[error("null object pointer")]
    NullObject,

    #[error("null resource handle pointer")]
    NullResource,
}

impl Error
{
    /// The category of the error.
    pub fn kind(&self) -> ErrorKind
    {
        match self {
            Self::Object(error) => error.kind(),
            Self::Armed         => ErrorKind::Usage,
            Self::NullObject    => ErrorKind::Value,
            Self::NullResource  => ErrorKind::Value,
        }
    }
}

/// Error returned when releasing a handle that holds nothing.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ReleaseError
{
    #[error("resource handle was never armed")]
    Uninitialized,

    #[error("resource handle was already released")]
    AlreadyReleased,
}
