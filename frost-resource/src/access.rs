//! The accessor family.
//!
//! Every accessor type-checks the object, locates the data,
//! binds it, and only then arms the handle.
//! On failure nothing is bound and the handle is left as it was.

use {
    super::{Error, Resource, binding::{Span, View, bind}},
    frost::{BorrowRef, Buffer, Encoded, Encoding, Kind},
    std::{ffi::CStr, str},
    tracing::debug,
};

fn access<'i, O, F>(object: &O, resource: &mut Resource<'i>, expected: Kind, view: F)
    -> Result<Span, Error>
    where O: ?Sized + BorrowRef<'i>
        , F: FnOnce(&Buffer) -> Result<View, frost::Error>
{
    let result = try_access(object, resource, expected, view);
    if let Err(error) = &result {
        debug!(%error, expected = %expected, actual = %object.kind(), "Accessor failed");
    }
    result
}

fn try_access<'i, O, F>(object: &O, resource: &mut Resource<'i>, expected: Kind, view: F)
    -> Result<Span, Error>
    where O: ?Sized + BorrowRef<'i>
        , F: FnOnce(&Buffer) -> Result<View, frost::Error>
{
    if resource.is_armed() {
        return Err(Error::Armed);
    }
    object.expect_kind(expected)?;
    let (binding, span) = bind(object, view)?;
    resource.arm(binding);
    Ok(span)
}

fn in_storage(_: &Buffer) -> Result<View, frost::Error>
{
    Ok(View::Storage)
}

fn in_storage_without_nul(storage: &Buffer) -> Result<View, frost::Error>
{
    reject_nul(storage.as_bytes())?;
    Ok(View::Storage)
}

fn reject_nul(bytes: &[u8]) -> Result<(), frost::Error>
{
    if bytes.contains(&0) {
        return Err(frost::Error::EmbeddedNul);
    }
    Ok(())
}

fn storage_text(storage: &Buffer) -> &str
{
    let Ok(text) = str::from_utf8(storage.as_bytes())
        else { unreachable!("Str object with invalid UTF-8") };
    text
}

fn encoded(encoding: Encoding, storage: &Buffer, nul_free: bool)
    -> Result<View, frost::Error>
{
    let view = match encoding.encode(storage_text(storage))? {
        Encoded::Unchanged           => View::Storage,
        Encoded::Transcoded(buffer)  => View::Owned(buffer),
    };
    if nul_free {
        reject_nul(match &view {
            View::Storage        => storage.as_bytes(),
            View::Owned(buffer)  => buffer.as_bytes(),
        })?;
    }
    Ok(view)
}

/* -------------------------------------------------------------------------- */
/*                                Byte strings                                */
/* -------------------------------------------------------------------------- */

/// The bytes of a byte string, as a C string.
///
/// Embedded nul bytes are allowed;
/// the C string then ends at the first of them.
pub fn bytes_as_string<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r CStr, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::Bytes, in_storage)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_c_str() })
}

/// The bytes of a byte string.
///
/// The returned bytes are followed by a nul byte.
pub fn bytes_as_string_and_size<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r [u8], Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::Bytes, in_storage)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_bytes() })
}

/// A snapshot of the bytes of a byte array, as a C string.
///
/// Later changes to the byte array are not reflected in the snapshot.
pub fn bytearray_as_string<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r CStr, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::ByteArray, in_storage)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_c_str() })
}

/// A snapshot of the bytes of a byte array.
pub fn bytearray_as_string_and_size<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r [u8], Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::ByteArray, in_storage)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_bytes() })
}

/* -------------------------------------------------------------------------- */
/*                                    Names                                   */
/* -------------------------------------------------------------------------- */

/// The name of a capsule.
///
/// Fails with a value error if the capsule has no name.
pub fn capsule_get_name<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r CStr, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let view = |_: &Buffer| {
        if !object.isolate().capsule_is_named(object)? {
            return Err(frost::Error::UnnamedCapsule);
        }
        Ok(View::Storage)
    };
    let span = access(object, resource, Kind::Capsule, view)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_c_str() })
}

/// The display name of a function.
pub fn function_get_name<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r CStr, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::Function, in_storage_without_nul)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_c_str() })
}

/* -------------------------------------------------------------------------- */
/*                                    Text                                    */
/* -------------------------------------------------------------------------- */

/// The UTF-8 encoding of a text object, as a C string.
///
/// Fails with a value error if the text contains a nul character.
pub fn str_as_utf8<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r CStr, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::Str, in_storage_without_nul)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_c_str() })
}

/// The text of a text object.
pub fn str_as_utf8_and_size<'i, 'r, O>(object: &O, resource: &'r mut Resource<'i>)
    -> Result<&'r str, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let span = access(object, resource, Kind::Str, in_storage)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    //         Text objects store UTF-8, and copies of it are UTF-8 too.
    Ok(unsafe { span.as_str() })
}

/// A text object in the given encoding, as a C string.
///
/// Fails with an encode error if the text has a character
/// the encoding cannot represent, and with a value error
/// if the text contains a nul character.
pub fn str_as_encoded<'i, 'r, O>(
    object: &O,
    encoding: Encoding,
    resource: &'r mut Resource<'i>,
) -> Result<&'r CStr, Error>
    where O: ?Sized + BorrowRef<'i>
{
    let view = |storage: &Buffer| encoded(encoding, storage, true);
    let span = access(object, resource, Kind::Str, view)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_c_str() })
}

/// A text object in the given encoding.
///
/// The returned bytes are followed by a nul byte.
pub fn str_as_encoded_and_size<'i, 'r, O>(
    object: &O,
    encoding: Encoding,
    resource: &'r mut Resource<'i>,
) -> Result<&'r [u8], Error>
    where O: ?Sized + BorrowRef<'i>
{
    let view = |storage: &Buffer| encoded(encoding, storage, false);
    let span = access(object, resource, Kind::Str, view)?;
    // SAFETY: The handle now holds the binding, and is borrowed for 'r.
    Ok(unsafe { span.as_bytes() })
}
