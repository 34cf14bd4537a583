//! Event registries for each supported format revision.
//!
//! A registry is a static table indexed by [`EventType`]. Index 0 is reserved
//! and every other index describes the shape of one event: its argument list,
//! whether it carries a timestamp delta, a stack table entry or a data blob,
//! and which event (if any) opens the range it closes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::types::TraceError;

pub mod go121;
pub mod go122;

/// Length of the binary stream header.
pub const HEADER_LEN: usize = 16;

/// Identifies an event type within one revision's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EventType(pub u8);

impl EventType {
    pub const NONE: EventType = EventType(0);
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an argument's value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRole {
    Plain,
    /// An id into the generation's string table.
    String,
    /// The stack the event itself was emitted with.
    Stack,
    /// The stack of the resource the event transitions, not of the event.
    TransitionStack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arg {
    pub name: &'static str,
    pub role: ArgRole,
}

impl Arg {
    pub const fn plain(name: &'static str) -> Arg {
        Arg {
            name,
            role: ArgRole::Plain,
        }
    }

    pub const fn string(name: &'static str) -> Arg {
        Arg {
            name,
            role: ArgRole::String,
        }
    }

    pub const fn stack(name: &'static str) -> Arg {
        Arg {
            name,
            role: ArgRole::Stack,
        }
    }

    pub const fn transition_stack(name: &'static str) -> Arg {
        Arg {
            name,
            role: ArgRole::TransitionStack,
        }
    }
}

/// The shape of one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spec {
    pub name: &'static str,
    pub args: &'static [Arg],
    /// The event that opens the range this event closes or continues.
    pub start_ev: Option<EventType>,
    /// The first argument is a timestamp delta.
    pub is_timed_event: bool,
    /// The arguments are followed by a length-prefixed data blob.
    pub has_data: bool,
    /// A stack table entry: arguments are (id, frame count), followed by
    /// frame count × (pc, func, file, line).
    pub is_stack: bool,
}

impl Spec {
    /// A reserved table slot.
    pub const UNUSED: Spec = Spec::structural("", &[]);

    pub const fn structural(name: &'static str, args: &'static [Arg]) -> Spec {
        Spec {
            name,
            args,
            start_ev: None,
            is_timed_event: false,
            has_data: false,
            is_stack: false,
        }
    }

    pub const fn timed(name: &'static str, args: &'static [Arg]) -> Spec {
        Spec {
            is_timed_event: true,
            ..Spec::structural(name, args)
        }
    }

    pub const fn ends(self, start: EventType) -> Spec {
        Spec {
            start_ev: Some(start),
            ..self
        }
    }

    pub const fn with_data(self) -> Spec {
        Spec {
            has_data: true,
            ..self
        }
    }

    pub const fn stack_entry(self) -> Spec {
        Spec {
            is_stack: true,
            ..self
        }
    }

    /// Number of fixed arguments, excluding expanded stack frames.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Indices of arguments that are string ids.
    pub fn string_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices_with(|role| role == ArgRole::String)
    }

    /// Indices of arguments that are stack ids, the event's own stack first.
    pub fn stack_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices_with(|role| role == ArgRole::Stack)
            .chain(self.indices_with(|role| role == ArgRole::TransitionStack))
    }

    fn indices_with(&self, f: fn(ArgRole) -> bool) -> impl Iterator<Item = usize> + '_ {
        self.args
            .iter()
            .enumerate()
            .filter(move |(_, a)| f(a.role))
            .map(|(i, _)| i)
    }
}

/// Names of the four fields of an expanded stack frame.
pub const FRAME_FIELDS: [&str; 4] = ["pc", "func", "file", "line"];

// === Revisions ===

/// A trace format revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    #[serde(rename = "go1.21")]
    Go121,
    #[serde(rename = "go1.22")]
    Go122,
}

impl Version {
    pub const LATEST: Version = Version::Go122;
    pub const ALL: [Version; 2] = [Version::Go121, Version::Go122];

    pub fn minor(self) -> u32 {
        match self {
            Version::Go121 => 21,
            Version::Go122 => 22,
        }
    }

    /// The full registry, indexed by event type. Slot 0 is reserved.
    pub fn specs(self) -> &'static [Spec] {
        match self {
            Version::Go121 => &go121::SPECS,
            Version::Go122 => &go122::SPECS,
        }
    }

    /// Looks up a defined event type. Returns `None` for 0 and out-of-range types.
    pub fn spec(self, ev: EventType) -> Option<&'static Spec> {
        if ev == EventType::NONE {
            return None;
        }
        self.specs().get(ev.0 as usize)
    }

    pub fn header(self) -> &'static [u8; HEADER_LEN] {
        match self {
            Version::Go121 => b"go 1.21 trace\x00\x00\x00",
            Version::Go122 => b"go 1.22 trace\x00\x00\x00",
        }
    }

    /// Finds the revision whose header is exactly `header`.
    pub fn from_header(header: &[u8]) -> Option<Version> {
        Version::ALL
            .into_iter()
            .find(|v| v.header().as_slice() == header)
    }

    /// Reverse lookup from event name to type.
    pub fn name_to_type(self, name: &str) -> Result<EventType, TraceError> {
        let index = match self {
            Version::Go121 => &*GO121_NAMES,
            Version::Go122 => &*GO122_NAMES,
        };
        index
            .get(name)
            .copied()
            .ok_or_else(|| TraceError::UnknownEventName(name.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Go1.{}", self.minor())
    }
}

impl FromStr for Version {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("Go")
            .or_else(|| s.strip_prefix("go"))
            .unwrap_or(s);
        Version::ALL
            .into_iter()
            .find(|v| rest == format!("1.{}", v.minor()))
            .ok_or_else(|| TraceError::broken(format!("unknown trace version {s:?}")))
    }
}

static GO121_NAMES: Lazy<HashMap<&'static str, EventType>> =
    Lazy::new(|| build_name_index(&go121::SPECS));
static GO122_NAMES: Lazy<HashMap<&'static str, EventType>> =
    Lazy::new(|| build_name_index(&go122::SPECS));

fn build_name_index(specs: &'static [Spec]) -> HashMap<&'static str, EventType> {
    specs
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, s)| (s.name, EventType(i as u8)))
        .collect()
}

// === Statuses ===

/// Goroutine status as declared by `GoStatus` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GoStatus {
    Bad = 0,
    Runnable = 1,
    Running = 2,
    Syscall = 3,
    Waiting = 4,
}

impl GoStatus {
    pub fn from_wire(v: u64) -> Option<Self> {
        match v {
            0 => Some(GoStatus::Bad),
            1 => Some(GoStatus::Runnable),
            2 => Some(GoStatus::Running),
            3 => Some(GoStatus::Syscall),
            4 => Some(GoStatus::Waiting),
            _ => None,
        }
    }
}

impl fmt::Display for GoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoStatus::Bad => "Bad",
            GoStatus::Runnable => "Runnable",
            GoStatus::Running => "Running",
            GoStatus::Syscall => "Syscall",
            GoStatus::Waiting => "Waiting",
        };
        f.write_str(s)
    }
}

/// Processor status as declared by `ProcStatus` events.
///
/// `Syscall` is never declared for a generation start but is tracked while
/// the processor's goroutine is in a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcStatus {
    Bad = 0,
    Running = 1,
    Idle = 2,
    Syscall = 3,
    SyscallAbandoned = 4,
}

impl ProcStatus {
    pub fn from_wire(v: u64) -> Option<Self> {
        match v {
            0 => Some(ProcStatus::Bad),
            1 => Some(ProcStatus::Running),
            2 => Some(ProcStatus::Idle),
            3 => Some(ProcStatus::Syscall),
            4 => Some(ProcStatus::SyscallAbandoned),
            _ => None,
        }
    }
}

impl fmt::Display for ProcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcStatus::Bad => "Bad",
            ProcStatus::Running => "Running",
            ProcStatus::Idle => "Idle",
            ProcStatus::Syscall => "Syscall",
            ProcStatus::SyscallAbandoned => "SyscallAbandoned",
        };
        f.write_str(s)
    }
}
