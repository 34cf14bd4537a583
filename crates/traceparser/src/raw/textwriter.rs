use std::io::Write;

use super::{EventSink, RawEvent};
use crate::spec::Version;
use crate::types::TraceError;

/// Renders raw events in the text form, one line per event.
pub struct TextWriter<W> {
    w: W,
    version: Version,
}

impl<W: Write> TextWriter<W> {
    pub fn new(mut w: W, version: Version) -> Result<Self, TraceError> {
        writeln!(w, "Trace {version}")?;
        Ok(Self { w, version })
    }

    pub fn write_event(&mut self, e: &RawEvent) -> Result<(), TraceError> {
        if e.version != self.version {
            return Err(TraceError::VersionMismatch {
                writer: self.version,
                event: e.version,
            });
        }
        writeln!(self.w, "{e}")?;
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

impl<W: Write> EventSink for TextWriter<W> {
    fn write_event(&mut self, ev: &RawEvent) -> Result<(), TraceError> {
        TextWriter::write_event(self, ev)
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        TextWriter::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::go122;
    use assert_matches::assert_matches;

    #[test]
    fn test_text_output() {
        let mut w = TextWriter::new(Vec::new(), Version::Go122).unwrap();
        w.write_event(&RawEvent {
            version: Version::Go122,
            ev: go122::EVENT_BATCH,
            args: vec![1, 0, 100, 12],
            data: None,
        })
        .unwrap();
        w.write_event(&RawEvent {
            version: Version::Go122,
            ev: go122::GO_STATUS,
            args: vec![1, 7, 2],
            data: None,
        })
        .unwrap();

        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(
            out,
            "Trace Go1.22\n\
             EventBatch gen=1 m=0 ts=100 size=12\n\
             GoStatus dt=1 g=7 gstatus=2\n"
        );
    }

    #[test]
    fn test_version_mismatch() {
        let mut w = TextWriter::new(Vec::new(), Version::Go122).unwrap();
        let result = w.write_event(&RawEvent {
            version: Version::Go121,
            ev: go122::GO_DESTROY,
            args: vec![1],
            data: None,
        });
        assert_matches!(result, Err(TraceError::VersionMismatch { .. }));
    }
}
