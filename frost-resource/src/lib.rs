//! Resource handles for pointers into object storage.
//!
//! An accessor such as [`str_as_utf8`] returns a pointer into the storage
//! of an object, and arms a [`Resource`] with a [binding] that keeps
//! the pointer valid: a reference that keeps the object alive,
//! a pin that keeps its storage in place, or a private copy of the data.
//! Which binding is used depends on the [strategy] of the isolate;
//! callers never need to know, because they only ever release the handle.
//!
//! ```
//! use {frost::{Config, Isolate}, frost_resource::{Resource, str_as_utf8}};
//!
//! Isolate::with(Config::default(), |isolate| {
//!     let text = isolate.new_str("hello");
//!     let mut resource = Resource::new();
//!     let utf8 = str_as_utf8(&text, &mut resource).unwrap();
//!     assert_eq!(utf8.to_bytes_with_nul(), b"hello\0");
//!     resource.release().unwrap();
//! });
//! ```
//!
//! The returned data borrows the handle,
//! so it cannot be used after the handle is released.
//! The [`ffi`] module provides the same accessors for C callers,
//! who must pair every successful call with [`frost_resource_close`].
//!
//! [binding]: `Binding`
//! [strategy]: `frost::Strategy`

#![warn(missing_docs)]

pub use self::{access::*, binding::*, error::*, handle::*, raw::*};

pub mod err;
pub mod ffi;

mod access;
mod binding;
mod error;
mod handle;
mod raw;
