use crate::spec::EventType;
use crate::types::TraceError;
use crate::varint::{UvarintDecoder, VarintError};

/// A cursor-based reader over a batch payload.
///
/// Uses "sticky error" semantics: once an error occurs, all subsequent reads
/// return zero/default values. The error is checked after parsing completes.
pub(crate) struct EventReader<'a> {
    data: &'a [u8],
    pos: usize,
    err: Option<VarintError>,
}

impl<'a> EventReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            err: None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.err.is_some()
    }

    /// Converts the sticky error, if any, into a trace error located at
    /// `base` plus the current position.
    pub fn check(&self, base: u64) -> Result<(), TraceError> {
        let offset = base + self.pos as u64;
        match self.err {
            None => Ok(()),
            Some(VarintError::Truncated) => Err(TraceError::TruncatedStream { offset }),
            Some(VarintError::Overflow) => Err(TraceError::VarintOverflow { offset }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.has_error() || self.pos >= self.data.len()
    }

    fn ensure(&mut self, n: usize) -> bool {
        if self.err.is_some() || n > self.data.len() - self.pos {
            self.err.get_or_insert(VarintError::Truncated);
            false
        } else {
            true
        }
    }

    /// Read a single byte.
    pub fn byte(&mut self) -> u8 {
        if !self.ensure(1) {
            return 0;
        }
        let b = self.data[self.pos];
        self.pos += 1;
        b
    }

    pub fn event_type(&mut self) -> EventType {
        EventType(self.byte())
    }

    /// Read n bytes as a slice of the data.
    pub fn bytes(&mut self, n: usize) -> &'a [u8] {
        if !self.ensure(n) {
            return &[];
        }
        let start = self.pos;
        self.pos += n;
        &self.data[start..self.pos]
    }

    /// Read a variable-length unsigned integer.
    pub fn uvarint(&mut self) -> u64 {
        let mut dec = UvarintDecoder::default();
        loop {
            if !self.ensure(1) {
                return 0;
            }
            let b = self.data[self.pos];
            self.pos += 1;
            match dec.push(b) {
                None => continue,
                Some(Ok(v)) => return v,
                Some(Err(e)) => {
                    self.err = Some(e);
                    return 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_reader_byte() {
        let data = [0x42, 0xFF];
        let mut r = EventReader::new(&data);
        assert_eq!(r.byte(), 0x42);
        assert_eq!(r.byte(), 0xFF);
        assert!(!r.has_error());
        // Reading past end sets error
        assert_eq!(r.byte(), 0);
        assert!(r.has_error());
    }

    #[test]
    fn test_reader_uvarint() {
        let mut r = EventReader::new(&[0x00]);
        assert_eq!(r.uvarint(), 0);

        let mut r = EventReader::new(&[0x7F]);
        assert_eq!(r.uvarint(), 127);

        let mut r = EventReader::new(&[0x80, 0x01]);
        assert_eq!(r.uvarint(), 128);

        let mut r = EventReader::new(&[0xAC, 0x02, 0x01]);
        assert_eq!(r.uvarint(), 300);
        assert!(!r.is_empty());
        assert_eq!(r.bytes(1), &[0x01]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_reader_short_bytes() {
        let mut r = EventReader::new(&[0x05, 0x01]);
        let len = r.uvarint() as usize;
        assert!(r.bytes(len).is_empty());
        assert!(r.is_empty());
        assert_matches!(r.check(100), Err(TraceError::TruncatedStream { .. }));
    }

    #[test]
    fn test_sticky_error() {
        let data = [0x42, 0x80];
        let mut r = EventReader::new(&data);
        assert_eq!(r.byte(), 0x42);
        assert!(r.check(0).is_ok());

        // Unterminated varint fails and sets sticky error.
        assert_eq!(r.uvarint(), 0);
        assert!(r.has_error());

        // All subsequent reads should also return defaults
        assert_eq!(r.byte(), 0);
        assert!(r.bytes(1).is_empty());
        assert_matches!(r.check(10), Err(TraceError::TruncatedStream { offset: 12 }));
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut data = vec![0xff; 9];
        data.push(0x7f);
        let mut r = EventReader::new(&data);
        assert_eq!(r.uvarint(), 0);
        assert_matches!(r.check(0), Err(TraceError::VarintOverflow { offset: 10 }));
    }
}
