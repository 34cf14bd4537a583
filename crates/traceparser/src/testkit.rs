//! Builds binary traces from event names for tests.
//!
//! Every generation gets a frequency batch of one tick per nanosecond, so
//! batch timestamps and deltas read back as nanoseconds.

use crate::spec::{go122, EventType, Version};
use crate::varint::put_uvarint;

const TICKS_PER_SEC: u64 = 1_000_000_000;

#[derive(Default)]
pub(crate) struct TraceBuilder {
    gens: Vec<GenerationBuilder>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation. Generations are written in call order.
    pub fn generation(&mut self, gen: u64) -> &mut GenerationBuilder {
        self.gens.push(GenerationBuilder {
            gen,
            freq: true,
            strings: Vec::new(),
            stacks: Vec::new(),
            cpu_samples: Vec::new(),
            batches: Vec::new(),
        });
        self.gens.last_mut().unwrap()
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Version::Go122.header().to_vec();
        for g in &self.gens {
            g.write(&mut out);
        }
        out
    }
}

pub(crate) struct GenerationBuilder {
    gen: u64,
    freq: bool,
    strings: Vec<(u64, String)>,
    stacks: Vec<(u64, Vec<[u64; 4]>)>,
    cpu_samples: Vec<[u64; 5]>,
    batches: Vec<BatchBuilder>,
}

impl GenerationBuilder {
    /// Adds a string table entry and returns its id.
    pub fn string(&mut self, s: &str) -> u64 {
        let id = self.strings.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
        self.string_with_id(id, s);
        id
    }

    pub fn string_with_id(&mut self, id: u64, s: &str) {
        self.strings.push((id, s.to_string()));
    }

    /// Adds a stack of (pc, func, file, line) frames and returns its id.
    pub fn stack(&mut self, frames: &[[u64; 4]]) -> u64 {
        let id = self.stacks.len() as u64 + 1;
        self.stacks.push((id, frames.to_vec()));
        id
    }

    pub fn cpu_sample(&mut self, ts: u64, m: i64, p: i64, g: i64, stack: u64) {
        self.cpu_samples
            .push([ts, m as u64, p as u64, g as u64, stack]);
    }

    pub fn without_frequency(&mut self) -> &mut Self {
        self.freq = false;
        self
    }

    /// Starts an event batch for thread `m` with base timestamp `ts`.
    pub fn batch(&mut self, m: i64, ts: u64) -> &mut BatchBuilder {
        self.batches.push(BatchBuilder {
            m,
            ts,
            data: Vec::new(),
        });
        self.batches.last_mut().unwrap()
    }

    fn write(&self, out: &mut Vec<u8>) {
        if self.freq {
            let mut p = vec![go122::FREQUENCY.0];
            put_uvarint(&mut p, TICKS_PER_SEC);
            write_batch(out, self.gen, -1, 0, &p);
        }
        if !self.strings.is_empty() {
            let mut p = vec![go122::STRINGS.0];
            for (id, s) in &self.strings {
                p.push(go122::STRING.0);
                put_uvarint(&mut p, *id);
                put_uvarint(&mut p, s.len() as u64);
                p.extend_from_slice(s.as_bytes());
            }
            write_batch(out, self.gen, -1, 0, &p);
        }
        if !self.stacks.is_empty() {
            let mut p = vec![go122::STACKS.0];
            for (id, frames) in &self.stacks {
                p.push(go122::STACK.0);
                put_uvarint(&mut p, *id);
                put_uvarint(&mut p, frames.len() as u64);
                for v in frames.iter().flatten() {
                    put_uvarint(&mut p, *v);
                }
            }
            write_batch(out, self.gen, -1, 0, &p);
        }
        if !self.cpu_samples.is_empty() {
            let mut p = vec![go122::CPU_SAMPLES.0];
            for s in &self.cpu_samples {
                p.push(go122::CPU_SAMPLE.0);
                for v in s {
                    put_uvarint(&mut p, *v);
                }
            }
            write_batch(out, self.gen, -1, 0, &p);
        }
        for b in &self.batches {
            write_batch(out, self.gen, b.m, b.ts, &b.data);
        }
    }
}

fn write_batch(out: &mut Vec<u8>, gen: u64, m: i64, ts: u64, payload: &[u8]) {
    out.push(go122::EVENT_BATCH.0);
    put_uvarint(out, gen);
    put_uvarint(out, m as u64);
    put_uvarint(out, ts);
    put_uvarint(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

pub(crate) struct BatchBuilder {
    m: i64,
    ts: u64,
    data: Vec<u8>,
}

impl BatchBuilder {
    /// Appends a timed event one tick after the previous one. `args` excludes
    /// the timestamp delta.
    pub fn event(&mut self, name: &str, args: &[u64]) -> &mut Self {
        self.event_dt(name, 1, args)
    }

    pub fn event_dt(&mut self, name: &str, dt: u64, args: &[u64]) -> &mut Self {
        let typ: EventType = Version::Go122
            .name_to_type(name)
            .unwrap_or_else(|e| panic!("{e}"));
        let spec = Version::Go122.spec(typ).unwrap();
        assert!(spec.is_timed_event, "{name} is not a timed event");
        assert_eq!(args.len() + 1, spec.arity(), "wrong argument count for {name}");

        self.data.push(typ.0);
        put_uvarint(&mut self.data, dt);
        for a in args {
            put_uvarint(&mut self.data, *a);
        }
        self
    }
}
