//! Accessors for C callers.
//!
//! Each function takes an object, as obtained from [`Root::into_raw`],
//! and a pointer to a [`RawResource`] to arm.
//! On success it returns a non-null pointer and arms the handle,
//! which the caller must eventually pass to [`frost_resource_close`].
//! On failure it returns null, makes an error [pending],
//! and does not write to the handle or to any other out-parameter.
//!
//! [`Root::into_raw`]: `frost::Root::into_raw`
//! [`frost_resource_close`]: `crate::frost_resource_close`
//! [pending]: `crate::err`

use {
    super::{
        Error,
        RawResource,
        Resource,
        bytearray_as_string,
        bytearray_as_string_and_size,
        bytes_as_string,
        bytes_as_string_and_size,
        capsule_get_name,
        err,
        function_get_name,
        str_as_encoded,
        str_as_encoded_and_size,
        str_as_utf8,
        str_as_utf8_and_size,
    },
    frost::{BorrowRef, Encoding, UnsafeRef},
    std::{
        ffi::{CStr, c_char, c_void},
        ptr::{self, NonNull},
    },
};

/// Address of an object, as seen from C.
pub type RawObject = *const c_void;

/// Object passed in from C.
struct RawRef<'i>(UnsafeRef<'i>);

// SAFETY: Callers of the exported functions
//         guarantee that the object is live.
unsafe impl<'i> BorrowRef<'i> for RawRef<'i>
{
    fn borrow_ref(&self) -> UnsafeRef<'i>
    {
        self.0
    }
}

unsafe fn export<'i, T, F>(object: RawObject, resource: *mut RawResource, f: F)
    -> *const T
    where F: FnOnce(&RawRef<'i>, &mut Resource<'i>) -> Result<*const T, Error>
{
    match try_export(object, resource, f) {
        Ok(ptr) => ptr,
        Err(error) => {
            err::set(error);
            ptr::null()
        },
    }
}

unsafe fn try_export<'i, T, F>(object: RawObject, out: *mut RawResource, f: F)
    -> Result<*const T, Error>
    where F: FnOnce(&RawRef<'i>, &mut Resource<'i>) -> Result<*const T, Error>
{
    let object = NonNull::new(object.cast_mut()).ok_or(Error::NullObject)?;
    let out = out.as_mut().ok_or(Error::NullResource)?;

    let object = RawRef(UnsafeRef::new(object.cast()));

    // A handle that is dropped on failure releases whatever it holds,
    // so out is written only once nothing can fail anymore.
    let mut resource = Resource::new();
    let ptr = f(&object, &mut resource)?;
    *out = resource.into_raw();

    Ok(ptr)
}

unsafe fn encoding(name: *const c_char) -> Result<Encoding, Error>
{
    if name.is_null() {
        return Ok(Encoding::Utf8);
    }
    let name = CStr::from_ptr(name).to_string_lossy();
    Ok(name.parse()?)
}

/* -------------------------------------------------------------------------- */
/*                                  Functions                                 */
/* -------------------------------------------------------------------------- */

/// See [`bytes_as_string`].
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_bytes_as_string_res(
    object: RawObject,
    resource: *mut RawResource,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        Ok(bytes_as_string(object, resource)?.as_ptr())
    })
}

/// See [`bytes_as_string_and_size`].
///
/// The length is stored in `*size`.
/// If `size` is null, bytes that contain a nul byte are rejected.
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` and `size` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_bytes_as_string_and_size_res(
    object: RawObject,
    resource: *mut RawResource,
    size: *mut usize,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        let bytes = bytes_as_string_and_size(object, resource)?;
        match size.as_mut() {
            Some(size) => *size = bytes.len(),
            None if bytes.contains(&0) => return Err(frost::Error::EmbeddedNul.into()),
            None => (),
        }
        Ok(bytes.as_ptr().cast())
    })
}

/// See [`bytearray_as_string`].
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_bytearray_as_string_res(
    object: RawObject,
    resource: *mut RawResource,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        Ok(bytearray_as_string(object, resource)?.as_ptr())
    })
}

/// See [`bytearray_as_string_and_size`].
///
/// The length is stored in `*size` unless `size` is null.
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` and `size` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_bytearray_as_string_and_size_res(
    object: RawObject,
    resource: *mut RawResource,
    size: *mut usize,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        let bytes = bytearray_as_string_and_size(object, resource)?;
        if let Some(size) = size.as_mut() {
            *size = bytes.len();
        }
        Ok(bytes.as_ptr().cast())
    })
}

/// See [`capsule_get_name`].
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_capsule_get_name_res(
    object: RawObject,
    resource: *mut RawResource,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        Ok(capsule_get_name(object, resource)?.as_ptr())
    })
}

/// See [`function_get_name`].
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_function_get_name_res(
    object: RawObject,
    resource: *mut RawResource,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        Ok(function_get_name(object, resource)?.as_ptr())
    })
}

/// See [`str_as_utf8`].
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_str_as_utf8_res(
    object: RawObject,
    resource: *mut RawResource,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        Ok(str_as_utf8(object, resource)?.as_ptr())
    })
}

/// See [`str_as_utf8_and_size`].
///
/// The length is stored in `*size` unless `size` is null.
///
/// # Safety
///
/// `object` must be null or a live object,
/// and `resource` and `size` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_str_as_utf8_and_size_res(
    object: RawObject,
    resource: *mut RawResource,
    size: *mut usize,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        let text = str_as_utf8_and_size(object, resource)?;
        if let Some(size) = size.as_mut() {
            *size = text.len();
        }
        Ok(text.as_ptr().cast())
    })
}

/// See [`str_as_encoded`].
///
/// A null encoding name means UTF-8.
///
/// # Safety
///
/// `object` must be null or a live object,
/// `encoding` must be null or a C string,
/// and `resource` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_str_as_encoded_res(
    object: RawObject,
    encoding: *const c_char,
    resource: *mut RawResource,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        let encoding = self::encoding(encoding)?;
        Ok(str_as_encoded(object, encoding, resource)?.as_ptr())
    })
}

/// See [`str_as_encoded_and_size`].
///
/// A null encoding name means UTF-8.
/// The length is stored in `*size` unless `size` is null.
///
/// # Safety
///
/// `object` must be null or a live object,
/// `encoding` must be null or a C string,
/// and `resource` and `size` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn frost_str_as_encoded_and_size_res(
    object: RawObject,
    encoding: *const c_char,
    resource: *mut RawResource,
    size: *mut usize,
) -> *const c_char
{
    export(object, resource, |object, resource| {
        let encoding = self::encoding(encoding)?;
        let bytes = str_as_encoded_and_size(object, encoding, resource)?;
        if let Some(size) = size.as_mut() {
            *size = bytes.len();
        }
        Ok(bytes.as_ptr().cast())
    })
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{
            frost_resource_close,
            err::{frost_err_message, frost_err_occurred},
        },
        frost::{Config, ErrorKind, Isolate, Strategy},
        scope_exit::scope_exit,
    };

    fn raw<'i>(object: &impl BorrowRef<'i>) -> RawObject
    {
        object.borrow_ref().as_ptr().as_ptr().cast_const().cast()
    }

    unsafe extern "C" fn never_called(_: *mut c_void)
    {
        unreachable!("Sentinel handle was released");
    }

    const SENTINEL: RawResource = RawResource{
        release: Some(never_called),
        payload: 0xDEAD as *mut c_void,
    };

    type Export = fn(RawObject, *mut RawResource, *mut usize) -> *const c_char;

    // SAFETY (all entries): The callers pass live objects and valid pointers.
    const EXPORTS: [(&str, Export); 10] = [
        ("bytes_as_string", |o, r, _| unsafe { frost_bytes_as_string_res(o, r) }),
        ("bytes_as_string_and_size",
            |o, r, n| unsafe { frost_bytes_as_string_and_size_res(o, r, n) }),
        ("bytearray_as_string", |o, r, _| unsafe { frost_bytearray_as_string_res(o, r) }),
        ("bytearray_as_string_and_size",
            |o, r, n| unsafe { frost_bytearray_as_string_and_size_res(o, r, n) }),
        ("capsule_get_name", |o, r, _| unsafe { frost_capsule_get_name_res(o, r) }),
        ("function_get_name", |o, r, _| unsafe { frost_function_get_name_res(o, r) }),
        ("str_as_utf8", |o, r, _| unsafe { frost_str_as_utf8_res(o, r) }),
        ("str_as_utf8_and_size",
            |o, r, n| unsafe { frost_str_as_utf8_and_size_res(o, r, n) }),
        ("str_as_encoded",
            |o, r, _| unsafe { frost_str_as_encoded_res(o, c"latin-1".as_ptr(), r) }),
        ("str_as_encoded_and_size",
            |o, r, n| unsafe {
                frost_str_as_encoded_and_size_res(o, c"latin-1".as_ptr(), r, n)
            }),
    ];

    #[test]
    fn failure_leaves_out_parameters_untouched()
    {
        err::clear();
        Isolate::with(Config::default(), |isolate| {
            let int = isolate.new_int(1);
            for (name, export) in EXPORTS {
                let mut resource = SENTINEL;
                let mut size = 0xBEEF;

                let ptr = export(raw(&int), &mut resource, &mut size);

                assert!(ptr.is_null(), "{name}");
                assert!(resource.is_armed(), "{name}");
                assert_eq!(resource.payload, SENTINEL.payload, "{name}");
                assert_eq!(size, 0xBEEF, "{name}");
                assert_eq!(int.ref_count(), 1, "{name}");
                assert_eq!(err::take().map(|e| e.kind()), Some(ErrorKind::Type), "{name}");
            }
        });
    }

    #[test]
    fn bytearray_size_through_c()
    {
        Isolate::with(Config::default(), |isolate| {
            let array = isolate.new_bytearray(b"a\0b");
            let mut resource = RawResource::EMPTY;
            let mut size = 0;

            // SAFETY: The object is live and the pointers are valid.
            unsafe {
                let ptr = frost_bytearray_as_string_and_size_res(
                    raw(&array),
                    &mut resource,
                    &mut size,
                );
                assert!(!ptr.is_null());
                assert_eq!(size, 3);
                isolate.bytearray_set(&array, 0, b'z').unwrap();
                assert_eq!(*ptr, b'a' as c_char);
                frost_resource_close(&mut resource);
            }
            assert!(!resource.is_armed());
        });
    }

    #[test]
    fn encode_failure_is_pending()
    {
        err::clear();
        Isolate::with(Config::default(), |isolate| {
            let text = isolate.new_str("naïve");
            let mut resource = SENTINEL;

            // SAFETY: The object is live and the pointers are valid.
            let ptr = unsafe {
                frost_str_as_encoded_res(raw(&text), c"ascii".as_ptr(), &mut resource)
            };

            assert!(ptr.is_null());
            assert_eq!(resource.payload, SENTINEL.payload);
            assert_eq!(frost_err_occurred(), 3);
            // SAFETY: The error is still pending.
            let message = unsafe { CStr::from_ptr(frost_err_message()) };
            assert_eq!(
                message.to_str(),
                Ok("'ascii' codec can't encode character 'ï' \
                    in position 2: ordinal not in range(128)"),
            );
            let error = err::take().unwrap();
            assert_eq!(error.kind(), ErrorKind::Encode);
            assert!(frost_err_message().is_null());
        });
    }

    #[test]
    fn hello_through_c()
    {
        Isolate::with(Config{strategy: Strategy::Pin, ..Config::default()}, |isolate| {
            let text = isolate.new_str("hello");
            let mut resource = RawResource::EMPTY;
            let mut size = 0;

            {
                let out: *mut RawResource = &mut resource;
                scope_exit! { unsafe { frost_resource_close(out); } }

                // SAFETY: The object is live and the pointers are valid.
                let ptr = unsafe {
                    frost_str_as_utf8_and_size_res(raw(&text), out, &mut size)
                };
                assert!(!ptr.is_null());
                assert!(resource.is_armed());
                assert!(text.is_pinned());
                assert_eq!(text.ref_count(), 2);

                // SAFETY: The handle is armed.
                let bytes = unsafe { CStr::from_ptr(ptr) };
                assert_eq!(bytes.to_bytes_with_nul(), b"hello\0");
                assert_eq!(size, 5);
            }

            assert!(!resource.is_armed());
            assert!(!text.is_pinned());
            assert_eq!(text.ref_count(), 1);
        });
    }

    #[test]
    fn null_arguments_are_value_errors()
    {
        err::clear();
        Isolate::with(Config::default(), |isolate| {
            let function = isolate.new_function("f");
            let mut resource = RawResource::EMPTY;

            // SAFETY: Null pointers are allowed.
            unsafe {
                assert!(frost_function_get_name_res(ptr::null(), &mut resource).is_null());
                assert_eq!(err::take(), Some(Error::NullObject));

                let ptr = frost_function_get_name_res(raw(&function), ptr::null_mut());
                assert!(ptr.is_null());
                assert_eq!(err::take(), Some(Error::NullResource));
            }

            assert!(!resource.is_armed());
            assert_eq!(function.ref_count(), 1);
        });
    }

    #[test]
    fn null_size_rejects_embedded_nul()
    {
        err::clear();
        Isolate::with(Config::default(), |isolate| {
            let bytes = isolate.new_bytes(b"a\0b");
            let mut resource = RawResource::EMPTY;

            // SAFETY: The object is live and the pointers are valid.
            let ptr = unsafe {
                frost_bytes_as_string_and_size_res(raw(&bytes), &mut resource, ptr::null_mut())
            };
            assert!(ptr.is_null());
            assert_eq!(err::take(), Some(Error::Object(frost::Error::EmbeddedNul)));
            assert!(!resource.is_armed());
            assert_eq!(bytes.ref_count(), 1);

            let mut size = 0;
            // SAFETY: The object is live and the pointers are valid.
            unsafe {
                let ptr = frost_bytes_as_string_and_size_res(
                    raw(&bytes),
                    &mut resource,
                    &mut size,
                );
                assert!(!ptr.is_null());
                assert_eq!(size, 3);
                frost_resource_close(&mut resource);
            }
            assert_eq!(bytes.ref_count(), 1);
        });
    }

    #[test]
    fn null_encoding_is_utf8()
    {
        Isolate::with(Config{strategy: Strategy::Copy, ..Config::default()}, |isolate| {
            let text = isolate.new_str("café");
            let mut resource = RawResource::EMPTY;
            let mut size = 0;

            // SAFETY: The object is live and the pointers are valid.
            unsafe {
                let ptr = frost_str_as_encoded_and_size_res(
                    raw(&text),
                    ptr::null(),
                    &mut resource,
                    &mut size,
                );
                assert_eq!(size, 5);
                assert_eq!(CStr::from_ptr(ptr).to_bytes(), "café".as_bytes());

                let ptr = frost_str_as_encoded_res(
                    raw(&text),
                    c"no-such-codec".as_ptr(),
                    &mut resource,
                );
                assert!(ptr.is_null());
                assert_eq!(err::occurred(), Some(ErrorKind::Lookup));
                err::clear();

                frost_resource_close(&mut resource);
            }
        });
    }
}
