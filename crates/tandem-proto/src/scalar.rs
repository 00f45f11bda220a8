// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fixed-width scalar codec.
//!
//! Every replicated value is a sequence of scalars written at their natural
//! width in little-endian byte order. There is no self-description on the
//! wire: master and slave must write and read the same scalar types in the
//! same order.

use bytes::{Buf, BufMut};

use crate::WireError;

/// A value with a canonical fixed-width little-endian encoding.
pub trait Scalar: Copy + Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Appends the encoding of `self` to `buf`.
    fn put(self, buf: &mut impl BufMut);

    /// Consumes one value from `buf`.
    fn get(buf: &mut impl Buf) -> Result<Self, WireError>;
}

fn ensure(remaining: usize, width: usize) -> Result<(), WireError> {
    if remaining < width {
        return Err(WireError::Truncated {
            needed: width,
            got: remaining,
        });
    }
    Ok(())
}

macro_rules! le_scalar {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Scalar for $ty {
            const WIDTH: usize = ::core::mem::size_of::<$ty>();

            #[inline]
            fn put(self, buf: &mut impl BufMut) {
                buf.$put(self);
            }

            #[inline]
            fn get(buf: &mut impl Buf) -> Result<Self, WireError> {
                ensure(buf.remaining(), Self::WIDTH)?;
                Ok(buf.$get())
            }
        }
    };
}

le_scalar!(u16, put_u16_le, get_u16_le);
le_scalar!(u32, put_u32_le, get_u32_le);
le_scalar!(u64, put_u64_le, get_u64_le);
le_scalar!(i32, put_i32_le, get_i32_le);
le_scalar!(i64, put_i64_le, get_i64_le);
le_scalar!(f32, put_f32_le, get_f32_le);
le_scalar!(f64, put_f64_le, get_f64_le);

impl Scalar for u8 {
    const WIDTH: usize = 1;

    #[inline]
    fn put(self, buf: &mut impl BufMut) {
        buf.put_u8(self);
    }

    #[inline]
    fn get(buf: &mut impl Buf) -> Result<Self, WireError> {
        ensure(buf.remaining(), 1)?;
        Ok(buf.get_u8())
    }
}

impl Scalar for bool {
    const WIDTH: usize = 1;

    #[inline]
    fn put(self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(self));
    }

    fn get(buf: &mut impl Buf) -> Result<Self, WireError> {
        match u8::get(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }
}

/// Writes a fixed-size array of scalars in index order.
pub fn put_array<S: Scalar, const N: usize>(buf: &mut impl BufMut, values: &[S; N]) {
    for &value in values {
        value.put(buf);
    }
}

/// Reads a fixed-size array of scalars in index order.
pub fn get_array<S: Scalar + Default, const N: usize>(
    buf: &mut impl Buf,
) -> Result<[S; N], WireError> {
    ensure(buf.remaining(), S::WIDTH * N)?;
    let mut out = [S::default(); N];
    for slot in &mut out {
        *slot = S::get(buf)?;
    }
    Ok(out)
}

/// Writes a `u32` element count; callers then write the elements.
pub fn put_len(buf: &mut impl BufMut, len: usize) -> Result<(), WireError> {
    let len = u32::try_from(len).map_err(|_| WireError::LimitExceeded {
        what: "length prefix",
        limit: u32::MAX as usize,
        got: len,
    })?;
    len.put(buf);
    Ok(())
}

/// Reads a `u32` element count and rejects counts above `limit`.
pub fn get_len(buf: &mut impl Buf, what: &'static str, limit: usize) -> Result<usize, WireError> {
    let len = u32::get(buf)? as usize;
    if len > limit {
        return Err(WireError::LimitExceeded {
            what,
            limit,
            got: len,
        });
    }
    Ok(len)
}

/// Writes a length-prefixed UTF-8 string.
pub fn put_str(buf: &mut impl BufMut, value: &str) -> Result<(), WireError> {
    put_len(buf, value.len())?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Reads a length-prefixed UTF-8 string of at most `limit` bytes.
pub fn get_str(buf: &mut impl Buf, limit: usize) -> Result<String, WireError> {
    let len = get_len(buf, "string bytes", limit)?;
    ensure(buf.remaining(), len)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| WireError::InvalidUtf8)
}
