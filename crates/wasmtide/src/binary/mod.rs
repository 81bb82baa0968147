//! The streaming binary decoder: a cursor-based byte reader, the lazy module
//! and section framers, the per-instruction reader, and the matching binary
//! writers.

mod instr_reader;
mod sections;
pub mod write;

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

pub use self::instr_reader::{read_const_expr, InstrReader};
pub use self::sections::{
    KnownSection, LazyModule, LazySection, NameSubsectionsIter, ReadBinary, Section,
    SectionContent, SectionId, SectionsIter,
};
use crate::{ContextGuard, ErrorSink, Location, F32, F64, V128};

/// Magic bytes at the start of every module: `\0asm`.
pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
/// The binary format version.
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// A mutable cursor over an immutable byte slice.
///
/// The reader borrows the input; everything it returns either is `Copy` or
/// borrows the same slice. `base` is the absolute offset of the slice within
/// the module image, so locations reported from carved-out section bodies
/// still point into the original input.
pub struct BinaryReader<'a> {
    buf: Cursor<&'a [u8]>,
    base: usize,
    errors: &'a dyn ErrorSink,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8], errors: &'a dyn ErrorSink) -> Self {
        Self::new_at(data, 0, errors)
    }

    /// A reader over a slice carved out of a larger image, starting at
    /// absolute offset `base`.
    pub fn new_at(data: &'a [u8], base: usize, errors: &'a dyn ErrorSink) -> Self {
        Self {
            buf: Cursor::new(data),
            base,
            errors,
        }
    }

    pub fn errors(&self) -> &'a dyn ErrorSink {
        self.errors
    }

    /// The current absolute offset.
    #[inline]
    pub fn pos(&self) -> usize {
        self.base + self.buf.position() as usize
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.get_ref().len() - self.buf.position() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The location covering everything read since absolute offset `start`.
    pub fn loc_from(&self, start: usize) -> Location {
        Location::span(start, self.pos())
    }

    /// A zero-length location at the cursor, for errors about missing input.
    fn here(&self) -> Location {
        Location::new(self.pos(), 0)
    }

    /// The unread remainder of the slice.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf.get_ref()[self.buf.position() as usize..]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.remaining());
        self.buf.set_position(self.buf.position() + n as u64);
    }

    pub(crate) fn peek_u8(&self) -> Option<u8> {
        self.rest().first().copied()
    }

    pub fn push_context(&self, desc: &'static str) -> ContextGuard<'a> {
        ContextGuard::new(self.errors, self.here(), desc)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        match self.buf.read_u8() {
            Ok(byte) => Some(byte),
            Err(_) => {
                self.errors
                    .on_error(self.here(), "unexpected end of input".to_string());
                None
            }
        }
    }

    /// Read `n` raw bytes, returning a view into the input.
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            self.errors.on_error(
                self.here(),
                format!("unable to read {n} bytes, {} remaining", self.remaining()),
            );
            return None;
        }
        let start = self.buf.position() as usize;
        let slice = &self.buf.get_ref()[start..start + n];
        self.advance(n);
        Some(slice)
    }

    pub fn read_f32(&mut self) -> Option<F32> {
        if self.remaining() < 4 {
            self.errors
                .on_error(self.here(), "unable to read f32".to_string());
            return None;
        }
        let bits = self.buf.read_u32::<LittleEndian>().ok()?;
        Some(F32::from_bits(bits))
    }

    pub fn read_f64(&mut self) -> Option<F64> {
        if self.remaining() < 8 {
            self.errors
                .on_error(self.here(), "unable to read f64".to_string());
            return None;
        }
        let bits = self.buf.read_u64::<LittleEndian>().ok()?;
        Some(F64::from_bits(bits))
    }

    pub fn read_v128(&mut self) -> Option<V128> {
        let bytes = self.read_bytes(16)?;
        Some(V128(bytes.try_into().unwrap()))
    }

    fn read_leb<T>(
        &mut self,
        desc: &'static str,
        read: impl Fn(&[u8]) -> wasmtide_leb128::Result<(T, usize)>,
    ) -> Option<T> {
        let start = self.pos();
        match read(self.rest()) {
            Ok((value, len)) => {
                self.advance(len);
                Some(value)
            }
            Err(err) => {
                // The offending range is the run of continuation bytes.
                let len = self.rest().iter().take_while(|b| **b & 0x80 != 0).count() + 1;
                let len = len.min(self.remaining());
                let guard = ContextGuard::new(self.errors, Location::new(start, len), desc);
                self.errors
                    .on_error(Location::new(start, len), err.to_string());
                drop(guard);
                None
            }
        }
    }

    pub fn read_var_u32(&mut self) -> Option<u32> {
        self.read_leb("vu32", wasmtide_leb128::read_u32)
    }

    pub fn read_var_u64(&mut self) -> Option<u64> {
        self.read_leb("vu64", wasmtide_leb128::read_u64)
    }

    pub fn read_var_s32(&mut self) -> Option<i32> {
        self.read_leb("vs32", wasmtide_leb128::read_s32)
    }

    pub fn read_var_s33(&mut self) -> Option<i64> {
        self.read_leb("vs33", wasmtide_leb128::read_s33)
    }

    pub fn read_var_s64(&mut self) -> Option<i64> {
        self.read_leb("vs64", wasmtide_leb128::read_s64)
    }

    /// Read a `vu32` count. Every counted element needs at least one byte, so
    /// a count exceeding the remaining input is rejected up front.
    pub fn read_count(&mut self) -> Option<u32> {
        let start = self.pos();
        let count = self.read_var_u32()?;
        if count as usize > self.remaining() {
            self.errors.on_error(
                self.loc_from(start),
                format!(
                    "count of {count} exceeds the {} remaining bytes",
                    self.remaining()
                ),
            );
            return None;
        }
        Some(count)
    }

    /// Read a length-prefixed UTF-8 string, borrowing the input.
    pub fn read_str(&mut self) -> Option<&'a str> {
        let start = self.pos();
        let len = self.read_count()?;
        let bytes = self.read_bytes(len as usize)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Some(s),
            Err(_) => {
                self.errors
                    .on_error(self.loc_from(start), "string is not valid UTF-8".to_string());
                None
            }
        }
    }

    /// Read a count-prefixed vector of elements.
    pub fn read_vec<T>(&mut self, mut read: impl FnMut(&mut Self) -> Option<T>) -> Option<Vec<T>> {
        let count = self.read_count()?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(read(self)?);
        }
        Some(items)
    }

    /// Carve out the next `len` bytes as a sub-reader over that frame.
    pub fn sub_reader(&mut self, len: usize) -> Option<BinaryReader<'a>> {
        let base = self.pos();
        let data = self.read_bytes(len)?;
        Some(BinaryReader::new_at(data, base, self.errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Errors;

    #[test]
    fn absolute_locations_survive_carving() {
        let errors = Errors::new();
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut reader = BinaryReader::new(&data, &errors);
        reader.read_u8().unwrap();
        let mut sub = reader.sub_reader(3).unwrap();
        assert_eq!(sub.pos(), 1);
        sub.read_u8().unwrap();
        assert_eq!(sub.pos(), 2);
        assert_eq!(sub.loc_from(1), Location::new(1, 1));
        assert_eq!(reader.pos(), 4);
    }

    #[test]
    fn count_larger_than_input_is_rejected() {
        let errors = Errors::new();
        let data = [0x10, 0x00];
        let mut reader = BinaryReader::new(&data, &errors);
        assert_eq!(reader.read_count(), None);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn overlong_varint_reports_its_byte_range() {
        let errors = Errors::new();
        let data = [0x85, 0x80, 0x80, 0x80, 0x00];
        let mut reader = BinaryReader::new(&data, &errors);
        assert_eq!(reader.read_var_u32(), None);
        let collected = errors.into_errors();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].loc, Location::new(0, 5));
        assert_eq!(collected[0].message, "integer representation too long");
        assert_eq!(collected[0].context, vec![(Location::new(0, 5), "vu32")]);
    }

    #[test]
    fn strings_are_zero_copy() {
        let errors = Errors::new();
        let data = [0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut reader = BinaryReader::new(&data, &errors);
        let s = reader.read_str().unwrap();
        assert_eq!(s, "hello");
        assert!(std::ptr::eq(s.as_bytes(), &data[1..]));
    }
}
