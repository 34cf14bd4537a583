use std::io::BufRead;

use super::{EventSource, RawEvent};
use crate::spec::{Version, FRAME_FIELDS};
use crate::types::TraceError;

/// Parses the text form produced by [`super::TextWriter`].
///
/// Blank lines and `#` comments are ignored, so hand-written traces can be
/// annotated.
#[derive(Debug)]
pub struct TextReader<R> {
    r: R,
    version: Version,
    line: String,
    line_no: usize,
}

impl<R: BufRead> TextReader<R> {
    /// Reads the `Trace Go1.NN` header line.
    pub fn new(r: R) -> Result<Self, TraceError> {
        let mut tr = TextReader {
            r,
            version: Version::LATEST,
            line: String::new(),
            line_no: 0,
        };
        if !tr.next_line()? {
            return Err(TraceError::Syntax {
                line: tr.line_no,
                msg: "missing trace header".into(),
            });
        }

        let mut fields = Fields::new(&tr.line, tr.line_no);
        let version = match (fields.word(), fields.word()) {
            (Some("Trace"), Some(v)) => v
                .parse::<Version>()
                .map_err(|_| fields.err(format!("unknown version {v:?}")))?,
            _ => return Err(fields.err("expected header \"Trace Go1.NN\"")),
        };
        fields.end()?;
        tr.version = version;
        Ok(tr)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn next_event(&mut self) -> Result<RawEvent, TraceError> {
        if !self.next_line()? {
            return Err(TraceError::EndOfStream);
        }
        let mut fields = Fields::new(&self.line, self.line_no);

        let name = fields.word().unwrap_or_default();
        let ev = self.version.name_to_type(name)?;
        let spec = self
            .version
            .spec(ev)
            .ok_or_else(|| TraceError::UnknownEventName(name.to_string()))?;

        let mut args = Vec::with_capacity(spec.arity());
        for arg in spec.args {
            args.push(fields.uint(arg.name)?);
        }
        if spec.is_stack {
            let nframes = args.get(1).copied().unwrap_or(0);
            for _ in 0..nframes {
                for name in FRAME_FIELDS {
                    args.push(fields.uint(name)?);
                }
            }
        }
        let data = if spec.has_data {
            Some(fields.quoted("data")?)
        } else {
            None
        };
        fields.end()?;

        Ok(RawEvent {
            version: self.version,
            ev,
            args,
            data,
        })
    }

    /// Advances to the next line with content. Returns false at EOF.
    fn next_line(&mut self) -> Result<bool, TraceError> {
        loop {
            self.line.clear();
            if self.r.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            self.line_no += 1;
            let trimmed = self.line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(true);
            }
        }
    }
}

impl<R: BufRead> EventSource for TextReader<R> {
    fn version(&self) -> Version {
        self.version
    }

    fn next_event(&mut self) -> Result<RawEvent, TraceError> {
        TextReader::next_event(self)
    }
}

/// Scans `key=value` fields of one line.
struct Fields<'a> {
    line: &'a str,
    pos: usize,
    line_no: usize,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str, line_no: usize) -> Self {
        Fields {
            line: line.trim_end_matches(|c: char| c == '\n' || c == '\r'),
            pos: 0,
            line_no,
        }
    }

    fn err(&self, msg: impl Into<String>) -> TraceError {
        TraceError::Syntax {
            line: self.line_no,
            msg: msg.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.line.as_bytes().get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_space();
        matches!(self.peek(), None | Some(b'#'))
    }

    fn take_until(&mut self, stop: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stop(c) {
                break;
            }
            self.pos += 1;
        }
        &self.line[start..self.pos]
    }

    /// Next whitespace-separated word, if any.
    fn word(&mut self) -> Option<&'a str> {
        if self.at_end() {
            return None;
        }
        Some(self.take_until(|c| matches!(c, b' ' | b'\t' | b'#')))
    }

    fn key(&mut self, want: &str) -> Result<(), TraceError> {
        if self.at_end() {
            return Err(self.err(format!("missing argument {want}")));
        }
        let key = self.take_until(|c| matches!(c, b'=' | b' ' | b'\t'));
        if self.peek() != Some(b'=') {
            return Err(self.err(format!("expected {want}=<value>, found {key:?}")));
        }
        self.pos += 1;
        if key != want {
            return Err(self.err(format!("expected argument {want}, found {key}")));
        }
        Ok(())
    }

    fn uint(&mut self, want: &str) -> Result<u64, TraceError> {
        self.key(want)?;
        let value = self.take_until(|c| matches!(c, b' ' | b'\t' | b'#'));
        value
            .parse::<u64>()
            .map_err(|_| self.err(format!("bad value for {want}: {value:?}")))
    }

    fn quoted(&mut self, want: &str) -> Result<Vec<u8>, TraceError> {
        self.key(want)?;
        let (data, n) = unquote(&self.line.as_bytes()[self.pos..])
            .map_err(|msg| self.err(format!("bad value for {want}: {msg}")))?;
        self.pos += n;
        Ok(data)
    }

    fn end(&mut self) -> Result<(), TraceError> {
        if self.at_end() {
            Ok(())
        } else {
            let rest = &self.line[self.pos..];
            Err(self.err(format!("unexpected trailing input {rest:?}")))
        }
    }
}

/// Parses a quoted string at the start of `s`, returning the bytes and the
/// length consumed including both quotes.
fn unquote(s: &[u8]) -> Result<(Vec<u8>, usize), String> {
    if s.first() != Some(&b'"') {
        return Err("expected quoted string".into());
    }
    let mut out = Vec::new();
    let mut i = 1;
    loop {
        let Some(&c) = s.get(i) else {
            return Err("unterminated string".into());
        };
        i += 1;
        match c {
            b'"' => return Ok((out, i)),
            b'\\' => {
                let Some(&esc) = s.get(i) else {
                    return Err("unterminated escape".into());
                };
                i += 1;
                match esc {
                    b'"' | b'\\' => out.push(esc),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'x' => {
                        let hex = s
                            .get(i..i + 2)
                            .and_then(|h| std::str::from_utf8(h).ok())
                            .and_then(|h| u8::from_str_radix(h, 16).ok())
                            .ok_or_else(|| "bad \\x escape".to_string())?;
                        out.push(hex);
                        i += 2;
                    }
                    other => return Err(format!("unknown escape \\{}", other as char)),
                }
            }
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::quote;
    use crate::spec::go122;
    use assert_matches::assert_matches;

    fn reader(text: &str) -> TextReader<&[u8]> {
        TextReader::new(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_events() {
        let mut r = reader(
            "# comment before the header\n\
             Trace Go1.22\n\
             \n\
             ProcStart dt=1 p=2 p_seq=3   # trailing comment\n\
             Stack id=1 nframes=1 pc=10 func=2 file=3 line=4\n\
             String id=2 data=\"a b\\\"c\\x00\"\n",
        );
        assert_eq!(r.version(), Version::Go122);

        let e = r.next_event().unwrap();
        assert_eq!(e.ev, go122::PROC_START);
        assert_eq!(e.args, vec![1, 2, 3]);

        let e = r.next_event().unwrap();
        assert_eq!(e.ev, go122::STACK);
        assert_eq!(e.args, vec![1, 1, 10, 2, 3, 4]);

        let e = r.next_event().unwrap();
        assert_eq!(e.data.as_deref(), Some(&b"a b\"c\x00"[..]));

        assert_matches!(r.next_event(), Err(TraceError::EndOfStream));
    }

    #[test]
    fn test_bad_header() {
        assert_matches!(
            TextReader::new(&b"Trace Go1.05\n"[..]),
            Err(TraceError::Syntax { line: 1, .. })
        );
        assert_matches!(
            TextReader::new(&b"go 1.22 trace\n"[..]),
            Err(TraceError::Syntax { .. })
        );
        assert_matches!(TextReader::new(&b""[..]), Err(TraceError::Syntax { .. }));
    }

    #[test]
    fn test_unknown_name() {
        let mut r = reader("Trace Go1.21\nGCActive dt=1 gc_seq=2\n");
        assert_matches!(r.next_event(), Err(TraceError::UnknownEventName(n)) if n == "GCActive");
    }

    #[test]
    fn test_argument_errors() {
        let cases = [
            ("ProcStart dt=1 p=2", "missing argument p_seq"),
            ("ProcStart dt=1 q=2 p_seq=3", "expected argument p, found q"),
            ("ProcStart dt=1 p=x p_seq=3", "bad value for p: \"x\""),
            ("ProcStart dt=1 p=2 p_seq=3 extra=1", "unexpected trailing input"),
            ("String id=1 data=\"abc", "unterminated string"),
            ("String id=1 data=\"\\q\"", "unknown escape"),
        ];
        for (line, want) in cases {
            let text = format!("Trace Go1.22\n{line}\n");
            let mut r = reader(&text);
            match r.next_event() {
                Err(TraceError::Syntax { line: 2, msg }) => {
                    assert!(msg.contains(want), "{line}: got {msg:?}, want {want:?}")
                }
                other => panic!("{line}: expected syntax error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_unquote_inverts_quote() {
        let data: Vec<u8> = (0..=255).collect();
        let quoted = format!("\"{}\"", quote(&data));
        let (back, n) = unquote(quoted.as_bytes()).unwrap();
        assert_eq!(back, data);
        assert_eq!(n, quoted.len());
    }
}
