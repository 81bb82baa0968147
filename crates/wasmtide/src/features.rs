use bitflags::bitflags;

bitflags! {
    /// The set of post-MVP proposals a consumer opts into.
    ///
    /// Every opcode and text keyword carries the bit that gates it; the
    /// decoder rejects instructions outside the enabled set, and the lexer
    /// surfaces the bits in [`OpcodeInfo`](crate::text::OpcodeInfo) so its
    /// consumer can do the same.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u16 {
        const SATURATING_FLOAT_TO_INT = 1 << 0;
        const SIGN_EXTENSION = 1 << 1;
        const MULTI_VALUE = 1 << 2;
        const BULK_MEMORY = 1 << 3;
        const REFERENCE_TYPES = 1 << 4;
        const SIMD = 1 << 5;
        const THREADS = 1 << 6;
        const TAIL_CALL = 1 << 7;
        const EXCEPTIONS = 1 << 8;
    }
}

impl Features {
    /// The WebAssembly MVP: no proposals enabled.
    pub fn mvp() -> Self {
        Self::empty()
    }
}
