//! Version-aware codec for raw trace events.
//!
//! A raw event is the wire record with no interpretation: its type, its
//! arguments exactly as encoded (stack entries include their expanded frames)
//! and an optional data blob. Raw events can be decoded from and encoded to
//! both the binary form and a line-oriented text form.

use std::fmt;

use crate::spec::{Spec, Version, FRAME_FIELDS};
use crate::types::TraceError;

mod reader;
mod textreader;
mod textwriter;
mod writer;

pub(crate) use reader::ByteSource;
pub use reader::Decoder;
pub use textreader::TextReader;
pub use textwriter::TextWriter;
pub use writer::Writer;

/// A single undecoded trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub version: Version,
    pub ev: crate::spec::EventType,
    pub args: Vec<u64>,
    pub data: Option<Vec<u8>>,
}

impl RawEvent {
    /// The event's spec, or `None` if the type is not defined in its revision.
    pub fn spec(&self) -> Option<&'static Spec> {
        self.version.spec(self.ev)
    }

    /// The expanded (pc, func, file, line) frames of a stack entry.
    pub fn frames(&self) -> impl Iterator<Item = &[u64]> + '_ {
        let (start, is_stack) = match self.spec() {
            Some(spec) => (spec.arity().min(self.args.len()), spec.is_stack),
            None => (self.args.len(), false),
        };
        let frames: &[u64] = if is_stack { &self.args[start..] } else { &[] };
        frames.chunks_exact(FRAME_FIELDS.len())
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(spec) = self.spec() else {
            write!(f, "Unknown({})", self.ev)?;
            for (i, arg) in self.args.iter().enumerate() {
                write!(f, " arg{i}={arg}")?;
            }
            return Ok(());
        };

        f.write_str(spec.name)?;
        for (arg, value) in spec.args.iter().zip(&self.args) {
            write!(f, " {}={}", arg.name, value)?;
        }
        for frame in self.frames() {
            for (name, value) in FRAME_FIELDS.iter().zip(frame) {
                write!(f, " {name}={value}")?;
            }
        }
        if spec.has_data {
            let data = self.data.as_deref().unwrap_or_default();
            write!(f, " data=\"{}\"", quote(data))?;
        }
        Ok(())
    }
}

/// Escapes `data` for the text form. Printable ASCII is kept as is.
pub(crate) fn quote(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

/// A source of raw events, binary or text.
pub trait EventSource {
    fn version(&self) -> Version;

    /// Returns the next event, or [`TraceError::EndOfStream`] when done.
    fn next_event(&mut self) -> Result<RawEvent, TraceError>;
}

/// A sink of raw events, binary or text.
pub trait EventSink {
    fn write_event(&mut self, ev: &RawEvent) -> Result<(), TraceError>;

    fn flush(&mut self) -> Result<(), TraceError>;
}

/// Moves every event from `src` to `dst`, returning the number of events.
pub fn copy(src: &mut dyn EventSource, dst: &mut dyn EventSink) -> Result<u64, TraceError> {
    let mut n = 0;
    loop {
        match src.next_event() {
            Ok(ev) => dst.write_event(&ev)?,
            Err(TraceError::EndOfStream) => break,
            Err(e) => return Err(e),
        }
        n += 1;
    }
    dst.flush()?;
    log::debug!("copied {n} raw events");
    Ok(n)
}
