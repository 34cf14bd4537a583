//! Unsigned LEB128 varints.

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// Input ended before a terminating byte.
    Truncated,
    /// The terminated value does not fit in 64 bits.
    Overflow,
}

/// Incremental decoder fed one byte at a time, shared by the slice and
/// stream readers.
#[derive(Debug, Default)]
pub(crate) struct UvarintDecoder {
    value: u64,
    shift: u32,
    len: usize,
    overflow: bool,
}

impl UvarintDecoder {
    /// Feeds the next byte. Returns `Some` once a terminating byte is seen.
    pub fn push(&mut self, b: u8) -> Option<Result<u64, VarintError>> {
        self.len += 1;
        let done = b & 0x80 == 0;
        if self.len < MAX_VARINT_LEN {
            self.value |= ((b & 0x7f) as u64) << self.shift;
            self.shift += 7;
        } else if self.len == MAX_VARINT_LEN && !self.overflow {
            // The tenth byte only has room for bit 63.
            if b > 1 {
                self.overflow = true;
            } else {
                self.value |= (b as u64) << 63;
            }
        } else {
            self.overflow = true;
        }
        if !done {
            return None;
        }
        if self.overflow {
            Some(Err(VarintError::Overflow))
        } else {
            Some(Ok(self.value))
        }
    }
}

/// Decodes a varint from the front of `b`, returning the value and the
/// number of bytes consumed.
pub fn uvarint(b: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut dec = UvarintDecoder::default();
    for (i, &byte) in b.iter().enumerate() {
        if let Some(res) = dec.push(byte) {
            return res.map(|v| (v, i + 1));
        }
    }
    Err(VarintError::Truncated)
}

/// Appends the encoding of `v` to `out`.
pub fn put_uvarint(out: &mut Vec<u8>, v: u64) {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let n = encode(&mut scratch, v);
    out.extend_from_slice(&scratch[..n]);
}

/// Encodes `v` into `scratch`, returning the encoded length.
#[inline]
pub(crate) fn encode(scratch: &mut [u8; MAX_VARINT_LEN], mut v: u64) -> usize {
    let mut i = 0;
    while v >= 0x80 {
        scratch[i] = (v as u8) | 0x80;
        v >>= 7;
        i += 1;
    }
    scratch[i] = v as u8;
    i + 1
}
