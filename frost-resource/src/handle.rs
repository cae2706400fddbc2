use {
    super::{Binding, BindingKind, RawResource, ReleaseError},
    frost::IsolateId,
    std::{fmt, marker::PhantomData, mem},
    tracing::trace,
};

/// Resource handle.
///
/// A handle starts out uninitialized.
/// A successful accessor call arms it with a [`Binding`],
/// and releasing it undoes that binding.
/// Data returned by the accessor borrows the handle,
/// so it cannot outlive the release.
///
/// A failed accessor call leaves the handle as it was.
/// Dropping a handle releases it.
pub struct Resource<'i>
{
    state: State,
    _isolate_id: IsolateId<'i>,
}

enum State
{
    Uninitialized,

    // INVARIANT: raw.release is present.
    Armed{raw: RawResource, binding: Option<BindingKind>},

    Released,
}

/// Observable state of a [`Resource`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandleState
{
    Uninitialized,
    Armed,
    Released,
}

impl<'i> Resource<'i>
{
    /// Create an uninitialized handle.
    pub fn new() -> Self
    {
        Self{state: State::Uninitialized, _isolate_id: PhantomData}
    }

    /// The state the handle is in.
    pub fn state(&self) -> HandleState
    {
        match self.state {
            State::Uninitialized => HandleState::Uninitialized,
            State::Armed{..}     => HandleState::Armed,
            State::Released      => HandleState::Released,
        }
    }

    /// Whether the handle holds a binding.
    pub fn is_armed(&self) -> bool
    {
        matches!(self.state, State::Armed{..})
    }

    /// The shape of the binding the handle holds.
    ///
    /// This is [`None`] if the handle is not armed,
    /// or if it was armed from a raw handle.
    pub fn binding(&self) -> Option<BindingKind>
    {
        match self.state {
            State::Armed{binding, ..} => binding,
            _ => None,
        }
    }

    /// Take ownership of a binding.
    ///
    /// Callers must check that the handle is not armed yet.
    pub (crate) fn arm(&mut self, binding: Binding<'i>)
    {
        debug_assert!(!self.is_armed(), "Arming an armed resource handle");
        let kind = binding.kind();
        let raw = binding.into_raw();
        trace!(binding = %kind, payload = ?raw.payload, "Armed resource handle");
        self.state = State::Armed{raw, binding: Some(kind)};
    }

    /// Undo the binding held by the handle.
    ///
    /// Releasing a handle that was never armed,
    /// or releasing it twice, is reported as an error
    /// and does nothing else.
    pub fn release(&mut self) -> Result<(), ReleaseError>
    {
        match mem::replace(&mut self.state, State::Released) {
            State::Uninitialized => {
                self.state = State::Uninitialized;
                Err(ReleaseError::Uninitialized)
            },
            State::Released =>
                Err(ReleaseError::AlreadyReleased),
            State::Armed{mut raw, binding} => {
                trace!(?binding, payload = ?raw.payload, "Released resource handle");
                // SAFETY: The handle was armed by an accessor or by from_raw,
                //         and the data it kept valid is no longer borrowed.
                unsafe { raw.close(); }
                Ok(())
            },
        }
    }

    /// Release the handle if it is armed.
    ///
    /// Unlike [`release`][`Self::release`],
    /// this can be called any number of times.
    pub fn close(&mut self)
    {
        let _ = self.release();
    }

    /// Hand the handle over to C.
    ///
    /// The binding is no longer released by this handle;
    /// the caller must close the returned handle instead.
    /// If the handle is not armed, an empty handle is returned.
    pub fn into_raw(mut self) -> RawResource
    {
        match mem::replace(&mut self.state, State::Released) {
            State::Armed{raw, ..} => raw,
            _ => RawResource::EMPTY,
        }
    }

    /// Take over a handle from C.
    ///
    /// An empty handle becomes an uninitialized handle.
    ///
    /// # Safety
    ///
    /// The handle must have been initialized,
    /// must not be closed by anyone else,
    /// and its binding must belong to the isolate `'i`.
    pub unsafe fn from_raw(raw: RawResource) -> Self
    {
        let state = if raw.is_armed() {
            State::Armed{raw, binding: None}
        } else {
            State::Uninitialized
        };
        Self{state, _isolate_id: PhantomData}
    }
}

impl<'i> Default for Resource<'i>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<'i> Drop for Resource<'i>
{
    fn drop(&mut self)
    {
        self.close();
    }
}

impl<'i> fmt::Debug for Resource<'i>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Resource")
            .field("state", &self.state())
            .field("binding", &self.binding())
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        frost::{BorrowRef, Config, Isolate},
        std::{cell::Cell, ffi::c_void},
    };

    thread_local! {
        static CALLS: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn count_call(_: *mut c_void)
    {
        CALLS.with(|calls| calls.set(calls.get() + 1));
    }

    #[test]
    fn release_requires_armed_handle()
    {
        let mut resource = Resource::new();
        assert_eq!(resource.release(), Err(ReleaseError::Uninitialized));
        assert_eq!(resource.state(), HandleState::Uninitialized);
        resource.close();
        resource.close();
        assert_eq!(resource.state(), HandleState::Uninitialized);
    }

    #[test]
    fn release_fires_exactly_once()
    {
        let raw = RawResource{release: Some(count_call), payload: std::ptr::null_mut()};
        // SAFETY: The handle is initialized and owned by nobody else.
        let mut resource = unsafe { Resource::from_raw(raw) };
        assert!(resource.is_armed());
        assert_eq!(resource.binding(), None);

        assert_eq!(resource.release(), Ok(()));
        assert_eq!(resource.release(), Err(ReleaseError::AlreadyReleased));
        resource.close();
        drop(resource);

        assert_eq!(CALLS.with(Cell::get), 1);
    }

    #[test]
    fn drop_releases_binding()
    {
        Isolate::with(Config::default(), |isolate| {
            let text = isolate.new_str("held");
            let mut resource = Resource::new();
            resource.arm(Binding::Reference(text.root()));
            assert_eq!(resource.binding(), Some(BindingKind::Reference));
            assert_eq!(text.ref_count(), 2);

            drop(resource);
            assert_eq!(text.ref_count(), 1);
        });
    }

    #[test]
    fn raw_handles_round_trip()
    {
        Isolate::with(Config::default(), |isolate| {
            let text = isolate.new_str("held");
            let mut resource = Resource::new();
            resource.arm(Binding::Reference(text.root()));

            let raw = resource.into_raw();
            assert!(raw.is_armed());
            assert_eq!(text.ref_count(), 2);

            // SAFETY: raw comes from into_raw and is closed only here.
            let mut resource = unsafe { Resource::from_raw(raw) };
            resource.release().unwrap();
            assert_eq!(text.ref_count(), 1);

            assert!(!Resource::new().into_raw().is_armed());
        });
    }
}
