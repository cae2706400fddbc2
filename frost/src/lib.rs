//! Object runtime with reference-counted, relocatable objects.
//!
//! Objects live on an [`Isolate`] and are referenced through [roots].
//! Each object owns a nul-terminated byte [`Buffer`]: the bytes of a
//! byte string, the UTF-8 of a text object, the name of a capsule.
//! Whether that buffer stays at one address is a property of the
//! configured [`Strategy`]: under reference counting it never moves,
//! under the moving strategies [`Isolate::collect`] relocates the
//! buffers of every object that is not [pinned].
//!
//! Code that hands out pointers into object storage must therefore
//! keep the object alive *and* in place for as long as the pointer is used.
//! The `frost-resource` crate builds that guarantee on top of this one.
//!
//! [roots]: `Root`
//! [pinned]: `PinnedRoot`

#![warn(missing_docs)]

pub use self::{
    buffer::*,
    config::*,
    encoding::*,
    error::*,
    isolate::*,
    object::*,
    refs::*,
};

mod buffer;
mod config;
mod encoding;
mod error;
mod isolate;
mod object;
mod refs;
