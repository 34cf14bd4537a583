use bytes::{BufMut, BytesMut};

use crate::spec::EventType;
use crate::varint::{self, MAX_VARINT_LEN};

/// A buffer for encoding trace events.
pub struct EventBuffer {
    scratch: [u8; MAX_VARINT_LEN],
    buf: BytesMut,
}

impl AsRef<[u8]> for EventBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl EventBuffer {
    pub fn with_capacity(size: usize) -> Self {
        EventBuffer {
            scratch: [0; MAX_VARINT_LEN],
            buf: BytesMut::with_capacity(size),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Writes a single byte.
    #[inline]
    pub fn byte(&mut self, byte: u8) {
        self.buf.reserve(1);
        self.buf.put_u8(byte);
    }

    /// Writes an event type byte.
    #[inline]
    pub fn event_type(&mut self, ev: EventType) {
        self.byte(ev.0);
    }

    /// Writes a variable-length byte string.
    #[inline]
    pub fn byte_string(&mut self, bytes: &[u8]) {
        self.buf.reserve(MAX_VARINT_LEN + bytes.len());

        self.uvarint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a variable-length unsigned integer.
    #[inline]
    pub fn uvarint<U: Into<u64>>(&mut self, u: U) {
        let n = varint::encode(&mut self.scratch, u.into());
        self.buf.extend_from_slice(&self.scratch[..n]);
    }
}
