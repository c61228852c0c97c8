use std::ops::{Add, AddAssign, Sub};

use crate::error::{Error, Result};

/// A wrapper around integer types that yields an `Error`, rather than panicking or silently
/// wrapping, when an arithmetic operation overflows or a conversion is lossy. Failures are
/// deferred until the value is read so that arithmetic can be chained.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Checked<T>(Option<T>);

impl<T> Checked<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Some(value))
    }

    /// Returns the computed value, or an error if any step of the computation overflowed.
    pub(crate) fn get(self) -> Result<T> {
        self.0.ok_or_else(failure)
    }

    /// Converts the computed value into another integer type, erroring if the value does not fit.
    pub(crate) fn try_into<U>(self) -> Result<U>
    where
        T: TryInto<U>,
    {
        self.get()?.try_into().map_err(|_| failure())
    }
}

fn failure() -> Error {
    Error::invalid_argument("arithmetic overflow or out-of-range conversion")
}

pub(crate) trait CheckedArithmetic: Sized + Copy {
    fn checked_add(self, rhs: Self) -> Option<Self>;
    fn checked_sub(self, rhs: Self) -> Option<Self>;
}

macro_rules! impl_checked_arithmetic {
    ($($ty:ty)*) => {$(
        impl CheckedArithmetic for $ty {
            fn checked_add(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_add(self, rhs)
            }

            fn checked_sub(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_sub(self, rhs)
            }
        }
    )*};
}

impl_checked_arithmetic!(i32 i64 u32 u64 usize);

impl<T: CheckedArithmetic> Add<T> for Checked<T> {
    type Output = Self;

    fn add(self, rhs: T) -> Self {
        Self(self.0.and_then(|value| value.checked_add(rhs)))
    }
}

impl<T: CheckedArithmetic> AddAssign<T> for Checked<T> {
    fn add_assign(&mut self, rhs: T) {
        self.0 = self.0.and_then(|value| value.checked_add(rhs));
    }
}

impl<T: CheckedArithmetic> Sub<T> for Checked<T> {
    type Output = Self;

    fn sub(self, rhs: T) -> Self {
        Self(self.0.and_then(|value| value.checked_sub(rhs)))
    }
}
