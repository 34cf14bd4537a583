use std::io::Read;

use super::{EventSource, RawEvent};
use crate::spec::{EventType, Version, FRAME_FIELDS, HEADER_LEN};
use crate::types::TraceError;
use crate::varint::{UvarintDecoder, VarintError};

/// A byte-at-a-time stream reader that tracks its offset.
///
/// Callers should hand it a buffered reader.
#[derive(Debug)]
pub(crate) struct ByteSource<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> ByteSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads one byte. `None` means a clean EOF.
    pub fn byte(&mut self) -> Result<Option<u8>, TraceError> {
        let mut b = [0u8; 1];
        match self.inner.read_exact(&mut b) {
            Ok(()) => {
                self.offset += 1;
                Ok(Some(b[0]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(TraceError::Io(e)),
        }
    }

    /// Reads one byte, treating EOF as truncation.
    pub fn byte_in_event(&mut self) -> Result<u8, TraceError> {
        self.byte()?.ok_or(TraceError::TruncatedStream {
            offset: self.offset,
        })
    }

    pub fn uvarint(&mut self) -> Result<u64, TraceError> {
        let start = self.offset;
        let mut dec = UvarintDecoder::default();
        loop {
            let b = self.byte_in_event()?;
            match dec.push(b) {
                None => continue,
                Some(Ok(v)) => return Ok(v),
                Some(Err(VarintError::Overflow)) => {
                    return Err(TraceError::VarintOverflow { offset: start })
                }
                Some(Err(VarintError::Truncated)) => {
                    return Err(TraceError::TruncatedStream {
                        offset: self.offset,
                    })
                }
            }
        }
    }

    /// Consumes `version`'s stream header, failing at the first differing byte.
    pub fn expect_header(&mut self, version: Version) -> Result<(), TraceError> {
        for (i, &want) in version.header().iter().enumerate() {
            if self.byte_in_event()? != want {
                return Err(TraceError::HeaderMismatch { offset: i });
            }
        }
        Ok(())
    }

    /// Reads exactly `n` bytes. The length is untrusted, so nothing is
    /// preallocated for it.
    pub fn exact(&mut self, n: u64) -> Result<Vec<u8>, TraceError> {
        let mut buf = Vec::new();
        let got = self.inner.by_ref().take(n).read_to_end(&mut buf)?;
        self.offset += got as u64;
        if (got as u64) < n {
            return Err(TraceError::TruncatedStream {
                offset: self.offset,
            });
        }
        Ok(buf)
    }
}

/// Decodes raw events from a binary trace stream.
///
/// The stream header is validated on construction; each call to
/// [`Decoder::next_event`] then yields one event in stream order until
/// [`TraceError::EndOfStream`].
#[derive(Debug)]
pub struct Decoder<R> {
    src: ByteSource<R>,
    version: Version,
}

impl<R: Read> Decoder<R> {
    /// Opens a stream that must carry `version`'s header.
    pub fn new(r: R, version: Version) -> Result<Self, TraceError> {
        let mut src = ByteSource::new(r);
        src.expect_header(version)?;
        Ok(Self { src, version })
    }

    /// Opens a stream of any known revision, picked by its header.
    pub fn detect(r: R) -> Result<Self, TraceError> {
        let mut src = ByteSource::new(r);
        let mut header = [0u8; HEADER_LEN];
        for b in header.iter_mut() {
            *b = src.byte_in_event()?;
        }
        match Version::from_header(&header) {
            Some(version) => Ok(Self { src, version }),
            None => {
                let offset = Version::ALL
                    .iter()
                    .map(|v| common_prefix(v.header(), &header))
                    .max()
                    .unwrap_or(0);
                Err(TraceError::HeaderMismatch { offset })
            }
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Bytes consumed so far, including the header.
    pub fn offset(&self) -> u64 {
        self.src.offset()
    }

    pub fn next_event(&mut self) -> Result<RawEvent, TraceError> {
        let offset = self.src.offset();
        let Some(b) = self.src.byte()? else {
            return Err(TraceError::EndOfStream);
        };
        let ev = EventType(b);
        let spec = self
            .version
            .spec(ev)
            .ok_or(TraceError::InvalidEventType { ev: b, offset })?;

        let mut args = Vec::with_capacity(spec.arity());
        for _ in 0..spec.arity() {
            args.push(self.src.uvarint()?);
        }
        if spec.is_stack {
            let nframes = args.get(1).copied().unwrap_or(0);
            for _ in 0..nframes {
                for _ in FRAME_FIELDS {
                    args.push(self.src.uvarint()?);
                }
            }
        }
        let data = if spec.has_data {
            let len = self.src.uvarint()?;
            Some(self.src.exact(len)?)
        } else {
            None
        };

        Ok(RawEvent {
            version: self.version,
            ev,
            args,
            data,
        })
    }
}

impl<R: Read> EventSource for Decoder<R> {
    fn version(&self) -> Version {
        self.version
    }

    fn next_event(&mut self) -> Result<RawEvent, TraceError> {
        Decoder::next_event(self)
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
