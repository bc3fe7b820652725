// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

use bytes::{Buf, BufMut};

/// Encode a primitive value into a fixed-width buffer.
pub trait PrimitiveFixedWidthEncode: Copy + Clone + 'static + Send + Sync {
    /// Width of each element
    const WIDTH: usize;

    /// Encode the value to the end of the buffer.
    fn encode(&self, buffer: &mut impl BufMut);

    /// Decode a value from the front of the buffer.
    fn decode(buffer: &mut impl Buf) -> Self;
}

impl PrimitiveFixedWidthEncode for u32 {
    const WIDTH: usize = std::mem::size_of::<u32>();

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_u32_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_u32_le()
    }
}

impl PrimitiveFixedWidthEncode for u64 {
    const WIDTH: usize = std::mem::size_of::<u64>();

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_u64_le(*self);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_u64_le()
    }
}
