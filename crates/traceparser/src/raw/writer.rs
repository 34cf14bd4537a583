use std::io::Write;

use super::{EventSink, RawEvent};
use crate::eventbuf::EventBuffer;
use crate::spec::{Version, FRAME_FIELDS};
use crate::types::TraceError;

/// Encodes raw events into the binary form.
pub struct Writer<W> {
    w: W,
    version: Version,
    buf: EventBuffer,
    written: u64,
}

impl<W: Write> Writer<W> {
    /// Creates a writer and emits the stream header for `version`.
    pub fn new(mut w: W, version: Version) -> Result<Self, TraceError> {
        let header = version.header();
        w.write_all(header)?;
        Ok(Self {
            w,
            version,
            buf: EventBuffer::with_capacity(64),
            written: header.len() as u64,
        })
    }

    pub fn write_event(&mut self, e: &RawEvent) -> Result<(), TraceError> {
        if e.version != self.version {
            return Err(TraceError::VersionMismatch {
                writer: self.version,
                event: e.version,
            });
        }
        let spec = self
            .version
            .spec(e.ev)
            .ok_or(TraceError::InvalidEventType {
                ev: e.ev.0,
                offset: self.written,
            })?;

        let mut want = spec.arity();
        if spec.is_stack && e.args.len() >= want {
            let nframes = usize::try_from(e.args[1]).unwrap_or(usize::MAX);
            want = want.saturating_add(nframes.saturating_mul(FRAME_FIELDS.len()));
        }
        if e.args.len() != want {
            return Err(TraceError::ArgCount {
                name: spec.name,
                want,
                got: e.args.len(),
            });
        }
        if !spec.has_data && e.data.is_some() {
            return Err(TraceError::broken(format!(
                "event {} does not carry data",
                spec.name
            )));
        }

        self.buf.clear();
        self.buf.event_type(e.ev);
        for &arg in &e.args {
            self.buf.uvarint(arg);
        }
        if spec.has_data {
            self.buf.byte_string(e.data.as_deref().unwrap_or_default());
        }
        self.w.write_all(self.buf.as_ref())?;
        self.written += self.buf.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TraceError> {
        self.w.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

impl<W: Write> EventSink for Writer<W> {
    fn write_event(&mut self, ev: &RawEvent) -> Result<(), TraceError> {
        Writer::write_event(self, ev)
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        Writer::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::Decoder;
    use crate::spec::{go121, go122, EventType};
    use assert_matches::assert_matches;

    fn event(version: Version, ev: EventType, args: &[u64]) -> RawEvent {
        RawEvent {
            version,
            ev,
            args: args.to_vec(),
            data: None,
        }
    }

    #[test]
    fn test_write_header_and_events() {
        let mut w = Writer::new(Vec::new(), Version::Go122).unwrap();
        w.write_event(&event(Version::Go122, go122::PROC_STATUS, &[1, 0, 4]))
            .unwrap();
        let out = w.into_inner();
        assert_eq!(&out[..16], Version::Go122.header());
        assert_eq!(&out[16..], &[go122::PROC_STATUS.0, 1, 0, 4]);
    }

    #[test]
    fn test_reencode_is_byte_identical() {
        let mut body = vec![go122::STRINGS.0, go122::STRING.0, 1, 2, b'h', b'i'];
        body.extend_from_slice(&[go122::STACK.0, 2, 1, 0x90, 0x80, 0x01, 1, 2, 33]);
        body.extend_from_slice(&[go122::GO_CREATE.0, 0xff, 0x01, 7, 2, 0]);
        let mut input = Version::Go122.header().to_vec();
        input.extend_from_slice(&body);

        let mut d = Decoder::new(input.as_slice(), Version::Go122).unwrap();
        let mut w = Writer::new(Vec::new(), Version::Go122).unwrap();
        loop {
            match d.next_event() {
                Ok(e) => w.write_event(&e).unwrap(),
                Err(TraceError::EndOfStream) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(w.into_inner(), input);
    }

    #[test]
    fn test_version_mismatch() {
        let mut w = Writer::new(Vec::new(), Version::Go121).unwrap();
        let result = w.write_event(&event(Version::Go122, go122::GO_DESTROY, &[1]));
        assert_matches!(
            result,
            Err(TraceError::VersionMismatch {
                writer: Version::Go121,
                event: Version::Go122,
            })
        );
    }

    #[test]
    fn test_arg_count() {
        let mut w = Writer::new(Vec::new(), Version::Go121).unwrap();
        let result = w.write_event(&event(Version::Go121, go121::GC_BEGIN, &[1, 2]));
        assert_matches!(
            result,
            Err(TraceError::ArgCount {
                name: "GCBegin",
                want: 3,
                got: 2
            })
        );

        // Claims two frames but carries one.
        let result = w.write_event(&event(Version::Go121, go121::STACK, &[1, 2, 1, 2, 3, 4]));
        assert_matches!(result, Err(TraceError::ArgCount { want: 10, got: 6, .. }));

        // A frame count too large to address.
        let result = w.write_event(&event(Version::Go121, go121::STACK, &[1, u64::MAX]));
        assert_matches!(result, Err(TraceError::ArgCount { want: usize::MAX, got: 2, .. }));
    }

    #[test]
    fn test_undefined_type() {
        let mut w = Writer::new(Vec::new(), Version::Go122).unwrap();
        let result = w.write_event(&event(Version::Go122, EventType(0), &[]));
        assert_matches!(result, Err(TraceError::InvalidEventType { ev: 0, offset: 16 }));
    }
}
