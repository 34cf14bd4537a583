use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::sync::Arc;

use crate::batchcursor::{heap_insert, heap_remove, heap_update, BatchCursor};
use crate::config::ReaderConfig;
use crate::event::Event;
use crate::generation::{read_generation, CpuSample, Generation, SpilledBatch};
use crate::order::Ordering;
use crate::raw::ByteSource;
use crate::spec::Version;
use crate::types::{Time, TraceError};

/// Reads a `Go1.22` binary trace, validates it, and yields events in a
/// causally consistent order.
///
/// Events from all threads of a generation are merged by time. When the
/// earliest event can't happen yet (say, a goroutine is started before the
/// event that made it runnable was read) later events are tried first.
pub struct TraceReader<R: Read> {
    src: ByteSource<BufReader<R>>,
    cfg: ReaderConfig,
    last_ts: Option<Time>,
    gen: Option<Generation>,
    initial_gen: Option<u64>,
    spill: Option<SpilledBatch>,
    frontier: Vec<BatchCursor>,
    cpu_samples: VecDeque<CpuSample>,
    order: Ordering,
    emitted_sync: bool,
    generations: u64,
}

impl<R: Read> TraceReader<R> {
    pub fn new(r: R) -> Result<Self, TraceError> {
        Self::with_config(r, ReaderConfig::default())
    }

    pub fn with_config(r: R, cfg: ReaderConfig) -> Result<Self, TraceError> {
        let mut src = ByteSource::new(BufReader::new(r));
        src.expect_header(Version::Go122)?;
        Ok(Self {
            src,
            cfg,
            last_ts: None,
            gen: None,
            initial_gen: None,
            spill: None,
            frontier: Vec::new(),
            cpu_samples: VecDeque::new(),
            order: Ordering::new(),
            // No sync event before the first generation.
            emitted_sync: true,
            generations: 0,
        })
    }

    /// The scheduler state reconstructed so far.
    pub fn ordering(&self) -> &Ordering {
        &self.order
    }

    /// Number of generations read so far.
    pub fn generations(&self) -> u64 {
        self.generations
    }

    /// Reads the next event. Returns [`TraceError::EndOfStream`] once the
    /// trace is exhausted.
    ///
    /// Output times are strictly increasing.
    pub fn next_event(&mut self) -> Result<Event, TraceError> {
        let mut ev = self.read_event()?;
        if let Some(last) = self.last_ts {
            if ev.time() <= last {
                ev.set_time(last.after(1)?);
            }
        }
        self.last_ts = Some(ev.time());
        log::trace!("{ev}");
        Ok(ev)
    }

    fn read_event(&mut self) -> Result<Event, TraceError> {
        loop {
            if self.frontier.is_empty() && self.cpu_samples.is_empty() {
                if !self.emitted_sync {
                    self.emitted_sync = true;
                    let table = self
                        .gen
                        .as_ref()
                        .map(|g| g.table.clone())
                        .unwrap_or_default();
                    return Ok(Event::sync(table, self.last_ts.unwrap_or_default()));
                }
                if self.gen.is_some() && self.spill.is_none() {
                    return Err(TraceError::EndOfStream);
                }
                self.next_generation()?;
                continue;
            }

            let Some(gen) = self.gen.as_ref() else {
                return Err(TraceError::EndOfStream);
            };

            if let Some(s) = self.cpu_samples.front() {
                if self.frontier.first().map_or(true, |bc| s.time < bc.ev.time) {
                    let e = Event::cpu_sample(gen.table.clone(), s);
                    self.cpu_samples.pop_front();
                    return Ok(e);
                }
            }

            let initial = self.initial_gen == Some(gen.gen);
            for i in 0..self.frontier.len() {
                if i == 1 {
                    // The head is stuck. Sorting keeps the heap valid and
                    // lets the rest be tried in time order.
                    self.frontier.sort_by_key(|bc| bc.ev.time);
                }
                let bc = &self.frontier[i];
                if let Some(step) = self.order.advance(&bc.ev, &gen.table, bc.m, initial)? {
                    let e = Event::from_step(Arc::clone(&gen.table), bc.ev, step);
                    refresh(&mut self.frontier, gen, i)?;
                    return Ok(e);
                }
            }

            let dump: String = self
                .frontier
                .iter()
                .map(|bc| format!("{bc}\n"))
                .collect();
            return Err(TraceError::broken(format!(
                "failed to advance: frontier:\n{dump}\n{}",
                self.order
            )));
        }
    }

    fn next_generation(&mut self) -> Result<(), TraceError> {
        let (gen, spill) = read_generation(&mut self.src, self.spill.take(), &self.cfg)?;
        self.initial_gen.get_or_insert(gen.gen);
        self.cpu_samples = gen.cpu_samples.iter().copied().collect();

        self.frontier.clear();
        for (m, batches) in &gen.batches {
            let mut bc = BatchCursor::new(*m);
            if bc.next_event(batches, gen.table.freq)? {
                heap_insert(&mut self.frontier, bc);
            }
        }
        log::debug!(
            "generation {}: {} threads with events",
            gen.gen,
            self.frontier.len()
        );

        self.gen = Some(gen);
        self.spill = spill;
        self.emitted_sync = false;
        self.generations += 1;
        Ok(())
    }
}

/// Moves cursor `i` to its next event, dropping it once exhausted.
fn refresh(frontier: &mut Vec<BatchCursor>, gen: &Generation, i: usize) -> Result<(), TraceError> {
    let bc = &mut frontier[i];
    let batches = gen.batches.get(&bc.m).map_or(&[][..], Vec::as_slice);
    if bc.next_event(batches, gen.table.freq)? {
        heap_update(frontier, i);
    } else {
        heap_remove(frontier, i);
    }
    Ok(())
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = Result<Event, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Err(TraceError::EndOfStream) => None,
            res => Some(res),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, GoState, ProcState, StateTransition};
    use crate::spec::{GoStatus, ProcStatus};
    use crate::testkit::TraceBuilder;
    use crate::types::{GoId, ProcId, StackId, ThreadId};
    use assert_matches::assert_matches;

    const RUNNING: u64 = ProcStatus::Running as u64;
    const ABANDONED: u64 = ProcStatus::SyscallAbandoned as u64;
    const G_RUNNING: u64 = GoStatus::Running as u64;
    const G_SYSCALL: u64 = GoStatus::Syscall as u64;

    fn read_all(data: &[u8]) -> (TraceReader<&[u8]>, Result<Vec<Event>, TraceError>) {
        let mut r = TraceReader::new(data).unwrap();
        let mut events = Vec::new();
        loop {
            match r.next_event() {
                Ok(e) => events.push(e),
                Err(TraceError::EndOfStream) => return (r, Ok(events)),
                Err(e) => return (r, Err(e)),
            }
        }
    }

    fn names(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_steal_at_generation_boundary() {
        let mut t = TraceBuilder::new();
        let g = t.generation(1);
        g.batch(0, 0)
            .event("ProcStatus", &[0, RUNNING])
            .event("GoStatus", &[1, G_RUNNING])
            .event("GoSyscallBegin", &[0]);
        g.batch(1, 0).event("GoStatus", &[2, G_RUNNING]);

        let g = t.generation(2);
        g.batch(1, 10)
            .event("GoStatus", &[2, G_RUNNING])
            .event("ProcStatus", &[0, ABANDONED])
            .event("ProcSteal", &[0, 1, 0]);
        g.batch(0, 10)
            .event("GoStatus", &[1, G_SYSCALL])
            .event("GoSyscallEndBlocked", &[]);

        let data = t.bytes();

        let (r, events) = read_all(&data);
        let events = events.unwrap();
        assert_eq!(r.generations(), 2);
        assert_eq!(r.ordering().proc_status(ProcId(0)), Some(ProcStatus::Running));
        assert_eq!(r.ordering().proc_owner(ProcId(0)), Some(ThreadId(1)));
        assert_eq!(r.ordering().go_status(GoId(1)), Some(GoStatus::Runnable));

        let steal = events.iter().find(|e| e.name() == "ProcSteal").unwrap();
        assert_eq!(steal.thread(), ThreadId(1));
        assert_eq!(
            steal.state_transition(),
            Some(StateTransition::proc(ProcId(0), ProcState::Running, ProcState::Running))
        );

        // The abandoned status is attributed to the thread still in the syscall.
        let status = events
            .iter()
            .find(|e| e.name() == "ProcStatus" && e.time().0 > 10)
            .unwrap();
        assert_eq!(status.thread(), ThreadId(0));

        let syncs = events.iter().filter(|e| e.kind() == EventKind::Sync).count();
        assert_eq!(syncs, 2);
        let pos = |name: &str| names(&events).iter().position(|n| *n == name).unwrap();
        assert!(pos("ProcSteal") < pos("GoSyscallEndBlocked"));
    }

    #[test]
    fn test_abandoned_proc_stolen_in_first_generation() {
        let mut t = TraceBuilder::new();
        let g = t.generation(1);
        g.batch(0, 0).event("ProcStatus", &[0, ABANDONED]);
        g.batch(1, 5)
            .event("ProcStatus", &[2, RUNNING])
            .event("GoStatus", &[5, G_RUNNING])
            .event("ProcSteal", &[0, 1, 0]);

        let data = t.bytes();

        let (r, events) = read_all(&data);
        events.unwrap();
        assert_eq!(r.ordering().proc_status(ProcId(0)), Some(ProcStatus::Idle));
        assert_eq!(r.ordering().proc_owner(ProcId(0)), None);
        assert_eq!(r.ordering().proc_owner(ProcId(2)), Some(ThreadId(1)));
    }

    #[test]
    fn test_waits_for_unblock() {
        let mut t = TraceBuilder::new();
        let g = t.generation(1);
        let reason = g.string("chan receive");
        g.batch(0, 0)
            .event("ProcStatus", &[0, RUNNING])
            .event("GoStatus", &[1, G_RUNNING])
            .event("GoBlock", &[reason, 0])
            .event("ProcStop", &[]);
        // Stamped earlier than the unblock it depends on.
        g.batch(1, 0)
            .event("ProcStatus", &[1, RUNNING])
            .event("GoStart", &[1, 2]);
        g.batch(2, 20)
            .event("ProcStatus", &[2, RUNNING])
            .event("GoStatus", &[3, G_RUNNING])
            .event("GoUnblock", &[1, 1, 0]);

        let data = t.bytes();

        let (_, events) = read_all(&data);
        let events = events.unwrap();
        let order = names(&events);
        let unblock = order.iter().position(|n| *n == "GoUnblock").unwrap();
        let start = order.iter().position(|n| *n == "GoStart").unwrap();
        assert!(unblock < start);

        let block = events.iter().find(|e| e.name() == "GoBlock").unwrap();
        assert_matches!(
            block.state_transition(),
            Some(StateTransition::Goroutine { to: GoState::Waiting, reason, .. })
                if block.string(reason) == Some("chan receive")
        );

        let times: Vec<_> = events.iter().map(|e| e.time()).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_stacks_and_cpu_samples() {
        let mut t = TraceBuilder::new();
        let g = t.generation(1);
        let func = g.string("main.worker");
        let file = g.string("/app/main.go");
        let stk = g.stack(&[[0x4010, func, file, 33]]);
        g.batch(0, 0)
            .event("ProcStatus", &[0, RUNNING])
            .event("GoStatus", &[1, G_RUNNING])
            .event_dt("GoCreate", 10, &[2, stk, stk]);
        g.cpu_sample(5, 0, 0, 1, stk);

        let data = t.bytes();

        let (_, events) = read_all(&data);
        let events = events.unwrap();
        assert_eq!(
            names(&events),
            vec!["ProcStatus", "GoStatus", "CPUSample", "GoCreate", "Sync"]
        );

        let sample = &events[2];
        assert_eq!(sample.kind(), EventKind::StackSample);
        assert_eq!(sample.goroutine(), GoId(1));

        let create = &events[3];
        assert_eq!(create.time(), Time(12));
        let stack = create.stack().unwrap();
        assert_eq!(
            create.frame_names(stack),
            vec![("main.worker".to_string(), "/app/main.go".to_string(), 33)]
        );
        assert_matches!(
            create.state_transition(),
            Some(StateTransition::Goroutine { id: GoId(2), stack, .. }) if stack == StackId(stk)
        );
    }

    #[test]
    fn test_ranges_and_annotations() {
        let mut t = TraceBuilder::new();
        let g = t.generation(1);
        let kind = g.string("GC mark termination");
        let region = g.string("load");
        let key = g.string("user");
        let value = g.string("alice");
        g.batch(0, 0)
            .event("ProcStatus", &[0, RUNNING])
            .event("GoStatus", &[1, G_RUNNING])
            .event("GCBegin", &[1, 0])
            .event("STWBegin", &[kind, 0])
            .event("STWEnd", &[])
            .event("UserTaskBegin", &[3, 0, region, 0])
            .event("UserRegionBegin", &[3, region, 0])
            .event("UserLog", &[3, key, value, 0])
            .event("UserRegionEnd", &[3, region, 0])
            .event("UserTaskEnd", &[3, 0])
            .event("HeapAlloc", &[4096])
            .event("GCEnd", &[2]);

        let data = t.bytes();

        let (r, events) = read_all(&data);
        let events = events.unwrap();
        let stw_end = events.iter().find(|e| e.name() == "STWEnd").unwrap();
        assert_eq!(stw_end.kind(), EventKind::RangeEnd);
        assert_eq!(
            stw_end.range_name().as_deref(),
            Some("stop-the-world (GC mark termination)")
        );
        let log = events.iter().find(|e| e.kind() == EventKind::Log).unwrap();
        assert_eq!(log.log(), Some(("user", "alice")));
        let region_end = events.iter().find(|e| e.kind() == EventKind::RegionEnd).unwrap();
        assert_eq!(region_end.task_or_region_name(), Some("load"));
        assert_eq!(r.ordering().active_tasks(), 0);
        assert_eq!(r.ordering().gc_state(), crate::order::GcState::NotRunning);
    }

    #[test]
    fn test_stuck_frontier_is_broken() {
        let mut t = TraceBuilder::new();
        t.generation(1)
            .batch(0, 0)
            .event("ProcStatus", &[0, RUNNING])
            .event("GoStart", &[9, 1]);
        let data = t.bytes();
        let (_, events) = read_all(&data);
        assert_matches!(
            events,
            Err(TraceError::Broken(msg))
                if msg.contains("failed to advance") && msg.contains("M 0 [GoStart")
        );
    }

    #[test]
    fn test_clock_overflow_is_broken() {
        let mut t = TraceBuilder::new();
        t.generation(1)
            .batch(0, u64::MAX)
            .event("ProcStatus", &[0, RUNNING])
            .event("GoStatus", &[1, G_RUNNING]);
        let data = t.bytes();
        let (_, events) = read_all(&data);
        assert_matches!(events, Err(TraceError::Broken(msg)) if msg.contains("overflows"));

        let mut t = TraceBuilder::new();
        t.generation(1)
            .batch(0, 1 << 62)
            .event_dt("ProcStatus", 1 << 62, &[0, RUNNING]);
        let data = t.bytes();
        let (_, events) = read_all(&data);
        assert_matches!(events, Err(TraceError::Broken(msg)) if msg.contains("overflows"));
    }

    #[test]
    fn test_empty_and_wrong_header() {
        let mut r = TraceReader::new(&Version::Go122.header()[..]).unwrap();
        assert_matches!(r.next_event(), Err(TraceError::EndOfStream));

        assert_matches!(
            TraceReader::new(&Version::Go121.header()[..]).err(),
            Some(TraceError::HeaderMismatch { offset: 6 })
        );
    }

    #[test]
    fn test_iterator() {
        let mut t = TraceBuilder::new();
        t.generation(1).batch(0, 0).event("ProcStatus", &[0, RUNNING]);
        t.generation(2).batch(0, 0).event("ProcStatus", &[0, RUNNING]);
        let data = t.bytes();
        let events: Result<Vec<_>, _> = TraceReader::new(&data[..]).unwrap().collect();
        assert_eq!(
            names(&events.unwrap()),
            vec!["ProcStatus", "Sync", "ProcStatus", "Sync"]
        );
    }
}
