use std::fmt;

use crate::baseevent::{read_base_event, BaseEvent};
use crate::batch::Batch;
use crate::spec::Version;
use crate::types::{Frequency, ThreadId, Time, TraceError};

/// Walks the batches of one thread, one timed event at a time.
#[derive(Debug, Clone)]
pub(crate) struct BatchCursor {
    pub m: ThreadId,
    last_ts: Option<Time>,
    idx: usize,
    data_off: usize,
    /// The last event read.
    pub ev: BaseEvent,
}

impl BatchCursor {
    pub fn new(m: ThreadId) -> Self {
        Self {
            m,
            last_ts: None,
            idx: 0,
            data_off: 0,
            ev: BaseEvent::default(),
        }
    }

    /// Reads the next event into `self.ev`. Returns false once every batch
    /// is exhausted.
    pub fn next_event(&mut self, batches: &[Batch], freq: Frequency) -> Result<bool, TraceError> {
        // Skip finished (or empty) batches.
        while self.idx < batches.len() && batches[self.idx].data.len() == self.data_off {
            self.idx += 1;
            self.data_off = 0;
            self.last_ts = None;
        }
        let Some(batch) = batches.get(self.idx) else {
            return Ok(false);
        };

        let last_ts = match self.last_ts {
            Some(t) => t,
            None => freq.mul(batch.time)?,
        };
        let base = batch.offset + self.data_off as u64;
        let (n, dt, mut ev) = read_base_event(Version::Go122, &batch.data[self.data_off..])
            .map_err(|e| relocate(e, base))?;

        ev.time = last_ts.after(freq.mul(dt)?.0)?;
        self.last_ts = Some(ev.time);
        self.data_off += n;
        self.ev = ev;
        Ok(true)
    }
}

impl fmt::Display for BatchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(spec) = Version::Go122.spec(self.ev.typ) else {
            return write!(f, "M {} [Unknown({}) time={}]", self.m, self.ev.typ, self.ev.time);
        };
        write!(f, "M {} [{} time={}", self.m, spec.name, self.ev.time)?;
        for (arg, v) in spec.args.iter().skip(1).zip(self.ev.args) {
            write!(f, " {}={v}", arg.name)?;
        }
        f.write_str("]")
    }
}

/// Shifts a slice-relative error offset to a stream offset.
fn relocate(err: TraceError, base: u64) -> TraceError {
    match err {
        TraceError::TruncatedStream { offset } => TraceError::TruncatedStream {
            offset: base + offset,
        },
        TraceError::VarintOverflow { offset } => TraceError::VarintOverflow {
            offset: base + offset,
        },
        TraceError::InvalidEventType { ev, offset } => TraceError::InvalidEventType {
            ev,
            offset: base + offset,
        },
        other => other,
    }
}

// === Frontier heap ===
//
// A binary min-heap of cursors ordered by the time of their current event.

fn parent(i: usize) -> usize {
    (i - 1) / 2
}

pub(crate) fn heap_insert(heap: &mut Vec<BatchCursor>, bc: BatchCursor) {
    heap.push(bc);
    let last = heap.len() - 1;
    sift_up(heap, last);
}

/// Restores heap order after the cursor at `i` advanced.
pub(crate) fn heap_update(heap: &mut [BatchCursor], i: usize) {
    if i > 0 && heap[parent(i)].ev.time > heap[i].ev.time {
        sift_up(heap, i);
        return;
    }
    sift_down(heap, i);
}

pub(crate) fn heap_remove(heap: &mut Vec<BatchCursor>, mut i: usize) -> BatchCursor {
    // Move i to the root regardless of order, then pop the root.
    while i > 0 {
        heap.swap(parent(i), i);
        i = parent(i);
    }
    let bc = heap.swap_remove(0);
    if !heap.is_empty() {
        sift_down(heap, 0);
    }
    bc
}

fn sift_up(heap: &mut [BatchCursor], mut i: usize) {
    while i > 0 && heap[parent(i)].ev.time > heap[i].ev.time {
        heap.swap(parent(i), i);
        i = parent(i);
    }
}

fn sift_down(heap: &mut [BatchCursor], mut i: usize) {
    loop {
        let mut m = i;
        let (l, r) = (2 * i + 1, 2 * i + 2);
        if l < heap.len() && heap[l].ev.time < heap[m].ev.time {
            m = l;
        }
        if r < heap.len() && heap[r].ev.time < heap[m].ev.time {
            m = r;
        }
        if m == i {
            return;
        }
        heap.swap(i, m);
        i = m;
    }
}
