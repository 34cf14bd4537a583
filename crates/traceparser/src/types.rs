use std::fmt;

use crate::spec::{EventType, Version};

// === Error types ===

/// Errors that can occur while decoding, encoding or validating a trace.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Reached end of stream at a clean event boundary (no more events).
    #[error("end of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream header differs from the expected revision's header.
    #[error("header mismatch at byte {offset}")]
    HeaderMismatch { offset: usize },

    #[error("invalid event type {ev} at offset {offset}")]
    InvalidEventType { ev: u8, offset: u64 },

    /// The stream ended in the middle of a header, event or varint.
    #[error("truncated stream at offset {offset}")]
    TruncatedStream { offset: u64 },

    #[error("varint overflows 64 bits at offset {offset}")]
    VarintOverflow { offset: u64 },

    #[error("unknown event name: {0}")]
    UnknownEventName(String),

    #[error("mismatched version between writer ({writer}) and event ({event})")]
    VersionMismatch { writer: Version, event: Version },

    #[error("found event without a timestamp: type={0}")]
    NotATimedEvent(EventType),

    #[error("event type {0} has too many arguments for a base event")]
    TooManyArgs(EventType),

    #[error("event {name} has {got} arguments, expected {want}")]
    ArgCount {
        name: &'static str,
        want: usize,
        got: usize,
    },

    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    /// The trace is well-formed but describes an impossible execution.
    #[error("broken trace: {0}")]
    Broken(String),
}

impl TraceError {
    pub(crate) fn broken(msg: impl Into<String>) -> Self {
        TraceError::Broken(msg.into())
    }
}

// === Identifiers ===

macro_rules! signed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl $name {
            /// Sentinel for "no such entity".
            pub const NONE: $name = $name(-1);

            pub(crate) fn from_wire(v: u64) -> Self {
                $name(v as i64)
            }

            pub fn is_none(self) -> bool {
                self == Self::NONE
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

signed_id!(
    /// An OS thread (an M in scheduler terms).
    ThreadId
);
signed_id!(
    /// A virtual processor (a P).
    ProcId
);
signed_id!(
    /// A goroutine.
    GoId
);

/// A user task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    pub const NONE: TaskId = TaskId(0);
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id into a generation's string table. Id 0 is the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringId(pub u64);

/// Id into a generation's stack table. Id 0 is "no stack".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StackId(pub u64);

// === Time ===

/// A raw timestamp in trace clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(pub u64);

/// A time in nanoseconds on the trace's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(pub i64);

impl Time {
    /// The time `ns` nanoseconds later, failing if it leaves the clock's range.
    pub fn after(self, ns: i64) -> Result<Time, TraceError> {
        self.0
            .checked_add(ns)
            .map(Time)
            .ok_or_else(|| TraceError::broken(format!("time {} + {ns} overflows", self.0)))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nanoseconds per trace clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frequency(pub f64);

impl Frequency {
    /// Builds a frequency from the wire value, given in ticks per second.
    pub fn from_ticks_per_sec(ticks: u64) -> Self {
        Frequency(1.0 / (ticks as f64 / 1e9))
    }

    /// Converts ticks to nanoseconds. Fails if the result doesn't fit a [`Time`].
    pub fn mul(self, t: Timestamp) -> Result<Time, TraceError> {
        let ns = self.0 * t.0 as f64;
        if !(0.0..i64::MAX as f64).contains(&ns) {
            return Err(TraceError::broken(format!(
                "timestamp {} overflows the trace clock",
                t.0
            )));
        }
        Ok(Time(ns as i64))
    }
}

// === Scheduling context ===

/// The thread, processor and goroutine an event happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedCtx {
    pub g: GoId,
    pub p: ProcId,
    pub m: ThreadId,
}

impl SchedCtx {
    pub const NONE: SchedCtx = SchedCtx {
        g: GoId::NONE,
        p: ProcId::NONE,
        m: ThreadId::NONE,
    };
}

impl fmt::Display for SchedCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M={} P={} G={}", self.m, self.p, self.g)
    }
}
