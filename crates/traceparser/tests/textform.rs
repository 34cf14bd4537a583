use std::fs;
use std::path::Path;

use exectrace_traceparser::raw::{self, Decoder, TextReader, TextWriter, Writer};
use exectrace_traceparser::TraceReader;
use tempfile::TempDir;

/// Unpacks every fixture archive into its own directory.
fn fixtures() -> Vec<(String, TempDir)> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata");
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().map_or(false, |e| e == "txtar") {
            let src = fs::read_to_string(&path).unwrap();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let tmp = TempDir::new().unwrap();
            txtar::from_str(&src).materialize(tmp.path()).unwrap();
            out.push((name, tmp));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    assert!(!out.is_empty(), "no fixtures found");
    out
}

fn file(dir: &TempDir, name: &str) -> Option<String> {
    fs::read_to_string(dir.path().join(name)).ok()
}

/// The text form as the text writer would produce it.
fn canonical(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn text_to_bytes(text: &str) -> Vec<u8> {
    let mut src = TextReader::new(text.as_bytes()).unwrap();
    let mut dst = Writer::new(Vec::new(), src.version()).unwrap();
    raw::copy(&mut src, &mut dst).unwrap();
    dst.into_inner()
}

fn bytes_to_text(data: &[u8]) -> String {
    let mut src = Decoder::detect(data).unwrap();
    let mut dst = TextWriter::new(Vec::new(), src.version()).unwrap();
    raw::copy(&mut src, &mut dst).unwrap();
    String::from_utf8(dst.into_inner()).unwrap()
}

#[test]
fn test_text_binary_round_trip() {
    for (name, dir) in fixtures() {
        let trace = file(&dir, "trace").unwrap_or_else(|| panic!("{name}: missing trace"));
        let data = text_to_bytes(&trace);
        let text = bytes_to_text(&data);
        assert_eq!(text, canonical(&trace), "{name}");
        assert_eq!(text_to_bytes(&text), data, "{name}: re-encoding differs");
    }
}

#[test]
fn test_ordered_events() {
    for (name, dir) in fixtures() {
        let Some(want) = file(&dir, "events") else {
            continue;
        };
        let data = text_to_bytes(&file(&dir, "trace").unwrap());
        let reader = TraceReader::new(&data[..]).unwrap();
        let mut got = String::new();
        for ev in reader {
            let ev = ev.unwrap_or_else(|e| panic!("{name}: {e}"));
            got.push_str(&format!("{} M={}\n", ev.name(), ev.thread()));
        }
        assert_eq!(got, want, "{name}");
    }
}
