//! Bounded-width LEB128 integer codecs, as used by the WebAssembly binary
//! format.
//!
//! Decoders operate on byte slices and return the decoded value together with
//! the number of bytes consumed, so callers can attribute errors to an exact
//! byte range. A value of width `W` may occupy at most `(W + 6) / 7` bytes;
//! longer encodings (including non-minimal ones) are rejected with
//! [`Error::TooLong`], and final bytes carrying set bits past the target width
//! are rejected with [`Error::TooLarge`].

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("integer representation too long")]
    TooLong,
    #[error("integer too large")]
    TooLarge,
    #[error("unexpected end of input")]
    UnexpectedEof,
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! impl_read_unsigned {
    ($fn_name:ident, $int_ty:ty, $bits:expr) => {
        /// Decode an unsigned LEB128 integer of at most `$bits` bits,
        /// returning the value and the number of bytes consumed.
        pub fn $fn_name(bytes: &[u8]) -> Result<($int_ty, usize)> {
            const MAX_BYTES: usize = ($bits + 6) / 7;
            const LAST_BITS: u32 = ($bits - 7 * (MAX_BYTES - 1)) as u32;

            let mut result: $int_ty = 0;
            for i in 0..MAX_BYTES {
                let byte = *bytes.get(i).ok_or(Error::UnexpectedEof)?;
                result |= ((byte & 0x7f) as $int_ty) << (7 * i);
                if byte & 0x80 != 0 {
                    if i + 1 == MAX_BYTES {
                        return Err(Error::TooLong);
                    }
                    continue;
                }
                if i + 1 == MAX_BYTES && byte >> LAST_BITS != 0 {
                    return Err(Error::TooLarge);
                }
                // A terminator of zero after a continuation byte encodes the
                // same value in fewer bytes.
                if i > 0 && byte == 0 {
                    return Err(Error::TooLong);
                }
                return Ok((result, i + 1));
            }
            unreachable!()
        }
    };
}

impl_read_unsigned!(read_u32, u32, 32);
impl_read_unsigned!(read_u64, u64, 64);

macro_rules! impl_read_signed {
    ($fn_name:ident, $int_ty:ty, $bits:expr) => {
        /// Decode a signed LEB128 integer of at most `$bits` bits, returning
        /// the value and the number of bytes consumed.
        pub fn $fn_name(bytes: &[u8]) -> Result<($int_ty, usize)> {
            const MAX_BYTES: usize = ($bits + 6) / 7;
            // Number of payload bits in the final byte, sign bit included.
            const LAST_BITS: u32 = ($bits - 7 * (MAX_BYTES - 1)) as u32;
            const SIGN_MASK: u8 = (0x7f << (LAST_BITS - 1)) & 0x7f;
            const STORAGE_BITS: u32 = <$int_ty>::BITS;

            let mut result: $int_ty = 0;
            for i in 0..MAX_BYTES {
                let byte = *bytes.get(i).ok_or(Error::UnexpectedEof)?;
                result |= ((byte & 0x7f) as $int_ty) << (7 * i);
                if byte & 0x80 != 0 {
                    if i + 1 == MAX_BYTES {
                        return Err(Error::TooLong);
                    }
                    continue;
                }
                if i + 1 == MAX_BYTES {
                    // The unused high bits of the final byte must be a
                    // consistent extension of the sign bit.
                    let ext = byte & SIGN_MASK;
                    if ext != 0 && ext != SIGN_MASK {
                        return Err(Error::TooLarge);
                    }
                    // Extend from the sign bit when the logical width is
                    // narrower than the storage type (s33 in an i64).
                    if $bits < STORAGE_BITS && byte & (1 << (LAST_BITS - 1)) != 0 {
                        result |= !0 << ($bits % STORAGE_BITS);
                    }
                } else if byte & 0x40 != 0 {
                    result |= !0 << (7 * (i + 1));
                }
                if i > 0 {
                    let prev_sign = bytes[i - 1] & 0x40 != 0;
                    if (byte == 0 && !prev_sign) || (byte == 0x7f && prev_sign) {
                        return Err(Error::TooLong);
                    }
                }
                return Ok((result, i + 1));
            }
            unreachable!()
        }
    };
}

impl_read_signed!(read_s32, i32, 32);
impl_read_signed!(read_s33, i64, 33);
impl_read_signed!(read_s64, i64, 64);

macro_rules! impl_write_unsigned {
    ($fn_name:ident, $int_ty:ty) => {
        /// Encode an unsigned LEB128 integer, using the minimal number of
        /// bytes.
        pub fn $fn_name(out: &mut Vec<u8>, mut value: $int_ty) {
            loop {
                if value < 0x80 {
                    out.push(value as u8);
                    break;
                }
                out.push((value & 0x7f) as u8 | 0x80);
                value >>= 7;
            }
        }
    };
}

impl_write_unsigned!(write_u32, u32);
impl_write_unsigned!(write_u64, u64);

macro_rules! impl_write_signed {
    ($fn_name:ident, $int_ty:ty) => {
        /// Encode a signed LEB128 integer, using the minimal number of bytes.
        pub fn $fn_name(out: &mut Vec<u8>, mut value: $int_ty) {
            loop {
                let byte = (value & 0x7f) as u8;
                value >>= 7;
                let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
                if done {
                    out.push(byte);
                    break;
                }
                out.push(byte | 0x80);
            }
        }
    };
}

impl_write_signed!(write_s32, i32);
impl_write_signed!(write_s64, i64);

/// Encode a signed 33-bit LEB128 integer (used by block types). The value
/// must fit in 33 bits.
pub fn write_s33(out: &mut Vec<u8>, value: i64) {
    debug_assert!((-(1 << 32)..1 << 32).contains(&value));
    write_s64(out, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_roundtrip() {
        for value in [0u32, 1, 127, 128, 129, 624485, u32::MAX - 1, u32::MAX] {
            let mut buf = vec![];
            write_u32(&mut buf, value);
            assert!(buf.len() <= 5);
            assert_eq!(read_u32(&buf), Ok((value, buf.len())), "value {value}");
        }
        for value in [0u64, 1 << 35, u64::MAX] {
            let mut buf = vec![];
            write_u64(&mut buf, value);
            assert!(buf.len() <= 10);
            assert_eq!(read_u64(&buf), Ok((value, buf.len())));
        }
    }

    #[test]
    fn signed_roundtrip() {
        for value in [0i32, 1, -1, 63, 64, -64, -65, 2141192192, i32::MIN, i32::MAX] {
            let mut buf = vec![];
            write_s32(&mut buf, value);
            assert!(buf.len() <= 5);
            assert_eq!(read_s32(&buf), Ok((value, buf.len())), "value {value}");
        }
        for value in [0i64, -1, i64::MIN, i64::MAX] {
            let mut buf = vec![];
            write_s64(&mut buf, value);
            assert!(buf.len() <= 10);
            assert_eq!(read_s64(&buf), Ok((value, buf.len())));
        }
        for value in [-(1i64 << 32), (1i64 << 32) - 1, -1, 0] {
            let mut buf = vec![];
            write_s33(&mut buf, value);
            assert!(buf.len() <= 5);
            assert_eq!(read_s33(&buf), Ok((value, buf.len())));
        }
    }

    #[test]
    fn known_encodings() {
        assert_eq!(read_u32(&[0xe5, 0x8e, 0x26]), Ok((624485, 3)));
        assert_eq!(read_s32(&[0x7f]), Ok((-1, 1)));
        assert_eq!(read_s32(&[0xc0, 0xbb, 0x78]), Ok((-123456, 3)));
        assert_eq!(read_u32(&[0xff, 0xff, 0xff, 0xff, 0x0f]), Ok((u32::MAX, 5)));
        assert_eq!(
            read_s32(&[0x80, 0x80, 0x80, 0x80, 0x78]),
            Ok((i32::MIN, 5))
        );
    }

    #[test]
    fn continuation_past_max_bytes() {
        assert_eq!(
            read_u32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]),
            Err(Error::TooLong)
        );
        assert_eq!(
            read_s32(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]),
            Err(Error::TooLong)
        );
    }

    #[test]
    fn set_bits_past_width() {
        // Bit 35 of a u32.
        assert_eq!(
            read_u32(&[0xff, 0xff, 0xff, 0xff, 0x7f]),
            Err(Error::TooLarge)
        );
        // Final byte is not a sign extension.
        assert_eq!(
            read_s32(&[0xff, 0xff, 0xff, 0xff, 0x4f]),
            Err(Error::TooLarge)
        );
    }

    #[test]
    fn non_minimal_encodings() {
        // 5 encoded with padding continuation bytes.
        assert_eq!(
            read_u32(&[0x85, 0x80, 0x80, 0x80, 0x00]),
            Err(Error::TooLong)
        );
        assert_eq!(read_u32(&[0x80, 0x00]), Err(Error::TooLong));
        assert_eq!(read_u32(&[0xff, 0x00]), Err(Error::TooLong));
        // 0 and -1 padded with redundant sign bytes.
        assert_eq!(read_s32(&[0x80, 0x00]), Err(Error::TooLong));
        assert_eq!(read_s32(&[0xff, 0x7f]), Err(Error::TooLong));
        assert_eq!(read_s64(&[0xfe, 0xff, 0x7f]), Err(Error::TooLong));
    }

    #[test]
    fn truncated_input() {
        assert_eq!(read_u32(&[]), Err(Error::UnexpectedEof));
        assert_eq!(read_u32(&[0x80]), Err(Error::UnexpectedEof));
        assert_eq!(read_s64(&[0x80, 0x80]), Err(Error::UnexpectedEof));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        assert_eq!(read_u32(&[0x03, 0xff, 0xff]), Ok((3, 1)));
    }
}
