//! Generations: the unit in which a trace is buffered and validated.
//!
//! A generation is every batch sharing one generation number. Besides the
//! per-thread event batches it carries the side-tables (strings, stacks),
//! the clock frequency and CPU samples, all scoped to that generation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::batch::{read_batch, Batch};
use crate::config::ReaderConfig;
use crate::raw::ByteSource;
use crate::reader::EventReader;
use crate::spec::{go122, FRAME_FIELDS};
use crate::types::{
    Frequency, GoId, ProcId, SchedCtx, StackId, StringId, ThreadId, Time, Timestamp, TraceError,
};

/// One frame of a stack table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub pc: u64,
    pub func: StringId,
    pub file: StringId,
    pub line: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stack {
    pub frames: Vec<Frame>,
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fr in &self.frames {
            writeln!(
                f,
                "\tpc={:#x} func={} file={} line={}",
                fr.pc, fr.func.0, fr.file.0, fr.line
            )?;
        }
        Ok(())
    }
}

/// Per-generation data needed to interpret individual events.
#[derive(Debug, Default)]
pub struct EvTable {
    pub freq: Frequency,
    strings: HashMap<StringId, String>,
    stacks: HashMap<StackId, Stack>,
}

impl EvTable {
    /// Resolves a string id. Id 0 is always the empty string.
    pub fn string(&self, id: StringId) -> Option<&str> {
        if id.0 == 0 {
            return Some("");
        }
        self.strings.get(&id).map(String::as_str)
    }

    /// Resolves a stack id. Id 0 means no stack.
    pub fn stack(&self, id: StackId) -> Option<&Stack> {
        if id.0 == 0 {
            return None;
        }
        self.stacks.get(&id)
    }
}

/// A CPU profile sample, timestamped on the trace clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSample {
    pub ctx: SchedCtx,
    pub time: Time,
    pub stack: StackId,
}

/// All trace data for one generation. Purely data: no parse state.
#[derive(Debug)]
pub struct Generation {
    pub gen: u64,
    pub batches: BTreeMap<ThreadId, Vec<Batch>>,
    pub cpu_samples: Vec<CpuSample>,
    pub table: Arc<EvTable>,
}

/// The first batch of the next generation, read while looking for the end
/// of the current one.
#[derive(Debug)]
pub(crate) struct SpilledBatch {
    pub gen: u64,
    pub batch: Batch,
}

struct Builder<'c> {
    cfg: &'c ReaderConfig,
    batches: BTreeMap<ThreadId, Vec<Batch>>,
    cpu_samples: Vec<CpuSample>,
    raw_cpu_times: Vec<Timestamp>,
    table: EvTable,
    has_freq: bool,
}

/// Reads batches until EOF or the first batch of the following generation.
///
/// Returns [`TraceError::EndOfStream`] if there is nothing left to read.
pub(crate) fn read_generation<R: Read>(
    src: &mut ByteSource<R>,
    spill: Option<SpilledBatch>,
    cfg: &ReaderConfig,
) -> Result<(Generation, Option<SpilledBatch>), TraceError> {
    let mut b = Builder {
        cfg,
        batches: BTreeMap::new(),
        cpu_samples: Vec::new(),
        raw_cpu_times: Vec::new(),
        table: EvTable::default(),
        has_freq: false,
    };

    let mut gen = None;
    if let Some(spill) = spill {
        gen = Some(spill.gen);
        b.process(spill.batch)?;
    }

    let mut next_spill = None;
    loop {
        let (batch, batch_gen) = match read_batch(src, cfg) {
            Ok(v) => v,
            Err(TraceError::EndOfStream) => break,
            Err(e) => return Err(e),
        };
        let current = *gen.get_or_insert(batch_gen);
        if current.checked_add(1) == Some(batch_gen) {
            next_spill = Some(SpilledBatch {
                gen: batch_gen,
                batch,
            });
            break;
        }
        if batch_gen != current {
            return Err(TraceError::broken(format!(
                "generations out of order: found batch for generation {batch_gen} in generation {current}"
            )));
        }
        b.process(batch)?;
    }

    let Some(gen) = gen else {
        return Err(TraceError::EndOfStream);
    };
    let generation = b.finish(gen)?;
    log::debug!(
        "read generation {}: {} threads, {} cpu samples",
        generation.gen,
        generation.batches.len(),
        generation.cpu_samples.len()
    );
    Ok((generation, next_spill))
}

impl Builder<'_> {
    fn process(&mut self, batch: Batch) -> Result<(), TraceError> {
        if batch.is_strings_batch() {
            self.add_strings(&batch)
        } else if batch.is_stacks_batch() {
            self.add_stacks(&batch)
        } else if batch.is_cpu_samples_batch() {
            self.add_cpu_samples(&batch)
        } else if batch.is_freq_batch() {
            self.set_freq(&batch)
        } else {
            if batch.data.is_empty() {
                log::warn!("empty batch for thread {} at offset {}", batch.m, batch.offset);
            }
            self.batches.entry(batch.m).or_default().push(batch);
            Ok(())
        }
    }

    fn add_strings(&mut self, batch: &Batch) -> Result<(), TraceError> {
        let base = batch.offset + 1;
        let mut r = EventReader::new(&batch.data[1..]);
        while !r.is_empty() {
            let ev = r.event_type();
            if ev != go122::STRING {
                return Err(TraceError::broken(format!("expected string event, got {ev}")));
            }
            let id = StringId(r.uvarint());
            let len = r.uvarint();
            r.check(base)?;
            if len > self.cfg.max_string_size {
                return Err(TraceError::broken(format!(
                    "invalid string size {len}, maximum is {}",
                    self.cfg.max_string_size
                )));
            }
            let s = r.bytes(len as usize);
            r.check(base)?;

            let s = String::from_utf8_lossy(s).into_owned();
            if let Some(prev) = self.table.strings.get(&id) {
                return Err(TraceError::broken(format!(
                    "multiple strings with the same ID: id={}, strings=[{prev}, {s}]",
                    id.0
                )));
            }
            self.table.strings.insert(id, s);
        }
        Ok(())
    }

    fn add_stacks(&mut self, batch: &Batch) -> Result<(), TraceError> {
        let base = batch.offset + 1;
        let mut r = EventReader::new(&batch.data[1..]);
        while !r.is_empty() {
            let ev = r.event_type();
            if ev != go122::STACK {
                return Err(TraceError::broken(format!("expected stack event, got {ev}")));
            }
            let id = StackId(r.uvarint());
            let nframes = r.uvarint();
            r.check(base)?;
            if nframes > self.cfg.max_stack_frames {
                return Err(TraceError::broken(format!(
                    "invalid stack size {nframes}, maximum is {}",
                    self.cfg.max_stack_frames
                )));
            }

            let mut frames = Vec::with_capacity(nframes as usize);
            for _ in 0..nframes {
                let mut fields = [0u64; FRAME_FIELDS.len()];
                for f in fields.iter_mut() {
                    *f = r.uvarint();
                }
                frames.push(Frame {
                    pc: fields[0],
                    func: StringId(fields[1]),
                    file: StringId(fields[2]),
                    line: fields[3],
                });
            }
            r.check(base)?;

            let stack = Stack { frames };
            if let Some(prev) = self.table.stacks.get(&id) {
                return Err(TraceError::broken(format!(
                    "multiple stacks with the same ID: id={}, stacks:\n{prev}\n\n{stack}",
                    id.0
                )));
            }
            self.table.stacks.insert(id, stack);
        }
        Ok(())
    }

    fn add_cpu_samples(&mut self, batch: &Batch) -> Result<(), TraceError> {
        let base = batch.offset + 1;
        let mut r = EventReader::new(&batch.data[1..]);
        while !r.is_empty() {
            let ev = r.event_type();
            if ev != go122::CPU_SAMPLE {
                return Err(TraceError::broken(format!(
                    "expected CPU sample event, got {ev}"
                )));
            }
            let ts = Timestamp(r.uvarint());
            let m = ThreadId::from_wire(r.uvarint());
            let p = ProcId::from_wire(r.uvarint());
            let g = GoId::from_wire(r.uvarint());
            let stack = StackId(r.uvarint());
            r.check(base)?;

            self.raw_cpu_times.push(ts);
            self.cpu_samples.push(CpuSample {
                ctx: SchedCtx { g, p, m },
                time: Time::default(),
                stack,
            });
        }
        Ok(())
    }

    fn set_freq(&mut self, batch: &Batch) -> Result<(), TraceError> {
        let mut r = EventReader::new(&batch.data[1..]);
        let ticks = r.uvarint();
        r.check(batch.offset + 1)?;
        if ticks == 0 {
            return Err(TraceError::broken("zero frequency"));
        }
        if self.has_freq {
            return Err(TraceError::broken("found multiple frequency events"));
        }
        self.table.freq = Frequency::from_ticks_per_sec(ticks);
        self.has_freq = true;
        Ok(())
    }

    fn finish(mut self, gen: u64) -> Result<Generation, TraceError> {
        if !self.has_freq {
            return Err(TraceError::broken("no frequency event found"));
        }
        for batches in self.batches.values() {
            if batches.windows(2).any(|w| w[0].time > w[1].time) {
                return Err(TraceError::broken("per-M streams are out-of-order"));
            }
        }

        let freq = self.table.freq;
        for (s, ts) in self.cpu_samples.iter_mut().zip(&self.raw_cpu_times) {
            s.time = freq.mul(*ts)?;
        }
        self.cpu_samples.sort_by_key(|s| s.time);

        Ok(Generation {
            gen,
            batches: self.batches,
            cpu_samples: self.cpu_samples,
            table: Arc::new(self.table),
        })
    }
}
