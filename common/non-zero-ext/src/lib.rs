//! Counting with non-zero integers.
//!
//! Counts that are stored only while they are positive,
//! such as the pin counts of a pin registry,
//! read best as non-zero integers: the entry is removed
//! when the count would otherwise reach zero.

#![warn(missing_docs)]

use std::num::{NonZeroU64, NonZeroUsize};

/// Extra methods for non-zero integers.
pub trait NonZeroExt: Sized
{
    /// The number 1.
    const ONE: Self;

    /// Add one, or return [`None`] on overflow.
    fn increment(self) -> Option<Self>;

    /// Subtract one, or return [`None`] if the result would be zero.
    fn decrement(self) -> Option<Self>;
}

macro_rules! impl_non_zero_ext
{
    ($($t:ty),*) => {
        $(
            impl NonZeroExt for $t
            {
                const ONE: Self = <$t>::MIN;

                fn increment(self) -> Option<Self>
                {
                    self.checked_add(1)
                }

                fn decrement(self) -> Option<Self>
                {
                    <$t>::new(self.get() - 1)
                }
            }
        )*
    };
}

impl_non_zero_ext!(NonZeroU64, NonZeroUsize);

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn counts_up_and_down()
    {
        let two = NonZeroU64::ONE.increment().unwrap();
        assert_eq!(two.get(), 2);
        assert_eq!(two.decrement(), Some(NonZeroU64::ONE));
        assert_eq!(NonZeroU64::ONE.decrement(), None);
    }

    #[test]
    fn increment_overflows()
    {
        assert_eq!(NonZeroUsize::MAX.increment(), None);
    }
}
