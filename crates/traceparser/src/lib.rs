//! Codec and validating reader for Go execution traces.
//!
//! Two trace format revisions are supported, `Go1.21` and `Go1.22`. The
//! [`raw`] module decodes and encodes individual wire events for either
//! revision, in binary or text form. [`TraceReader`] goes further for `Go1.22`
//! streams: it reassembles generations, orders events across threads and
//! checks them against a model of the scheduler.
//!
//! # Protocol
//!
//! A stream starts with a 16-byte header (`go 1.22 trace\0\0\0`), followed by
//! events. Every event is a type byte followed by unsigned LEB128 varint
//! arguments:
//!
//! | Field        | Encoding                                   |
//! |--------------|--------------------------------------------|
//! | Type         | 1 byte, index into the revision's registry |
//! | Arguments    | one varint per argument in the registry    |
//! | Stack frames | stack entries only: 4 varints per frame    |
//! | Data         | data entries only: varint length + bytes   |
//!
//! Timed events carry a timestamp delta as their first argument. Events are
//! grouped in batches (`EventBatch gen m ts size`), each holding the events
//! of one thread within one generation.
//!
//! # Usage
//!
//! ```no_run
//! use exectrace_traceparser::{TraceError, TraceReader};
//!
//! let file = std::fs::File::open("trace.out").unwrap();
//! let mut reader = TraceReader::new(file).unwrap();
//!
//! loop {
//!     match reader.next_event() {
//!         Ok(event) => println!("{}", event),
//!         Err(TraceError::EndOfStream) => break,
//!         Err(e) => {
//!             eprintln!("parse error: {}", e);
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod baseevent;
mod batch;
mod batchcursor;
pub mod config;
pub mod event;
mod eventbuf;
pub mod generation;
pub mod order;
pub mod raw;
mod reader;
pub mod spec;
mod trace;
pub mod types;
pub mod varint;

#[cfg(test)]
mod testkit;

pub use baseevent::{read_base_event, BaseEvent};
pub use config::ReaderConfig;
pub use event::{Event, EventKind, GoState, ProcState, StateTransition};
pub use order::Ordering;
pub use raw::{Decoder, RawEvent, TextReader, TextWriter, Writer};
pub use spec::{EventType, Version};
pub use trace::TraceReader;
pub use types::TraceError;
