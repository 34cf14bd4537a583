//! The scheduler state machine that decides when an event may be emitted.
//!
//! Events from different threads are only partially ordered by timestamp.
//! [`Ordering::advance`] checks an event against the tracked goroutine,
//! processor and thread state: it either accepts the event (updating the
//! state), asks the caller to try another thread first, or reports the trace
//! as broken.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::baseevent::BaseEvent;
use crate::event::{GoState, ProcState, StateTransition};
use crate::generation::EvTable;
use crate::spec::{go122, EventType, GoStatus, ProcStatus, Version};
use crate::types::{GoId, ProcId, SchedCtx, StackId, StringId, TaskId, ThreadId, TraceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    MustHave,
    MayHave,
    MustNotHave,
}

/// What an event needs from its thread's scheduling context.
#[derive(Debug, Clone, Copy)]
struct SchedReqs {
    thread: Requirement,
    proc: Requirement,
    goroutine: Requirement,
}

use Requirement::*;

const USER_GO_REQS: SchedReqs = SchedReqs {
    thread: MustHave,
    proc: MustHave,
    goroutine: MustHave,
};

const PROC_REQS: SchedReqs = SchedReqs {
    thread: MustHave,
    proc: MustHave,
    goroutine: MayHave,
};

fn validate_ctx(ctx: SchedCtx, reqs: SchedReqs) -> Result<(), TraceError> {
    if reqs.thread == MustHave && ctx.m.is_none() {
        return Err(TraceError::broken("expected a thread but didn't have one"));
    }
    check_req("proc", ctx.p.is_none(), ctx.p.0, reqs.proc)?;
    check_req("goroutine", ctx.g.is_none(), ctx.g.0, reqs.goroutine)
}

fn check_req(what: &str, missing: bool, id: i64, req: Requirement) -> Result<(), TraceError> {
    match req {
        MustHave if missing => Err(TraceError::broken(format!(
            "expected a {what} but didn't have one"
        ))),
        MustNotHave if !missing => Err(TraceError::broken(format!(
            "expected no {what} but had one: {id}"
        ))),
        _ => Ok(()),
    }
}

/// Whether a GC mark phase is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Undetermined,
    NotRunning,
    Running,
}

/// An in-flight range: the event that began it and a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeType {
    typ: EventType,
    desc: StringId,
}

impl RangeType {
    /// Ranges are keyed by their begin event, whichever event refers to them.
    fn of(typ: EventType, desc: StringId) -> Self {
        let typ = Version::Go122
            .spec(typ)
            .and_then(|s| s.start_ev)
            .unwrap_or(typ);
        RangeType { typ, desc }
    }

    fn name(&self) -> &'static str {
        Version::Go122.spec(self.typ).map_or("?", |s| s.name)
    }
}

#[derive(Debug, Default)]
struct RangeState {
    in_flight: Vec<RangeType>,
}

impl RangeState {
    fn begin(&mut self, r: RangeType) -> Result<(), TraceError> {
        if self.in_flight.contains(&r) {
            return Err(TraceError::broken(format!(
                "discovered event already in-flight for: {}",
                r.name()
            )));
        }
        self.in_flight.push(r);
        Ok(())
    }

    /// Records a range found already running at a generation start.
    fn active(&mut self, r: RangeType, initial_gen: bool) -> Result<(), TraceError> {
        if self.in_flight.contains(&r) {
            return Ok(());
        }
        if !initial_gen {
            return Err(TraceError::broken(format!(
                "found named active range not in first gen: {}",
                r.name()
            )));
        }
        self.in_flight.push(r);
        Ok(())
    }

    /// Ends the range begun by `typ`'s start event and returns its description.
    fn end(&mut self, typ: EventType) -> Result<StringId, TraceError> {
        let r = RangeType::of(typ, StringId(0));
        match self.in_flight.iter().position(|f| f.typ == r.typ) {
            Some(i) => Ok(self.in_flight.swap_remove(i).desc),
            None => Err(TraceError::broken(format!(
                "tried to end event {}, but not in-flight",
                r.name()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UserRegion {
    task: TaskId,
    name: String,
}

#[derive(Debug)]
struct GState {
    status: GoStatus,
    seq: u64,
    regions: Vec<UserRegion>,
    ranges: RangeState,
}

impl GState {
    fn new(status: GoStatus) -> Self {
        GState {
            status,
            seq: 0,
            regions: Vec::new(),
            ranges: RangeState::default(),
        }
    }
}

#[derive(Debug)]
struct PState {
    status: ProcStatus,
    seq: u64,
    /// The thread that claimed this processor through a `ProcSteal` and has
    /// not yet handed it on with a `ProcStart` or `ProcStop`.
    stolen_by: Option<ThreadId>,
    ranges: RangeState,
}

impl PState {
    fn new(status: ProcStatus) -> Self {
        PState {
            status,
            seq: 0,
            stolen_by: None,
            ranges: RangeState::default(),
        }
    }
}

/// What a thread is currently bound to.
#[derive(Debug, Clone, Copy)]
struct MState {
    g: GoId,
    p: ProcId,
}

/// The result of accepting an event.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Step {
    /// The context the event happened in.
    pub ctx: SchedCtx,
    pub transition: Option<StateTransition>,
    /// The description of the range the event ended.
    pub range_desc: Option<StringId>,
}

type Advance = Result<Option<Step>, TraceError>;

fn ready(ctx: SchedCtx) -> Advance {
    Ok(Some(Step {
        ctx,
        transition: None,
        range_desc: None,
    }))
}

fn ready_with(ctx: SchedCtx, t: StateTransition) -> Advance {
    Ok(Some(Step {
        ctx,
        transition: Some(t),
        range_desc: None,
    }))
}

/// Tracks scheduler state across generations.
#[derive(Debug)]
pub struct Ordering {
    g_states: HashMap<GoId, GState>,
    p_states: HashMap<ProcId, PState>,
    m_states: HashMap<ThreadId, MState>,
    active_tasks: HashSet<TaskId>,
    gc_seq: u64,
    gc_state: GcState,
}

impl Default for Ordering {
    fn default() -> Self {
        Ordering {
            g_states: HashMap::new(),
            p_states: HashMap::new(),
            m_states: HashMap::new(),
            active_tasks: HashSet::new(),
            gc_seq: 0,
            gc_state: GcState::Undetermined,
        }
    }
}

impl Ordering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to advance the state machine by `ev`, which was read from
    /// thread `m`'s batches.
    ///
    /// Returns `Ok(None)` if the event cannot happen yet and another thread's
    /// event must be consumed first.
    pub(crate) fn advance(
        &mut self,
        ev: &BaseEvent,
        table: &EvTable,
        m: ThreadId,
        initial_gen: bool,
    ) -> Advance {
        let cur = if m.is_none() {
            SchedCtx::NONE
        } else {
            let ms = self.m_states.entry(m).or_insert(MState {
                g: GoId::NONE,
                p: ProcId::NONE,
            });
            SchedCtx { g: ms.g, p: ms.p, m }
        };

        let mut new = cur;
        let res = self.dispatch(ev, table, cur, &mut new, initial_gen);
        if !m.is_none() && matches!(res, Ok(Some(_))) {
            self.m_states.insert(m, MState { g: new.g, p: new.p });
        }
        res
    }

    fn dispatch(
        &mut self,
        ev: &BaseEvent,
        table: &EvTable,
        cur: SchedCtx,
        new: &mut SchedCtx,
        initial_gen: bool,
    ) -> Advance {
        match ev.typ {
            go122::PROC_STATUS => self.on_proc_status(ev, cur, new, initial_gen),
            go122::PROC_START => self.proc_start(ev, cur, new),
            go122::PROC_STOP => self.proc_stop(cur, new),
            go122::PROC_STEAL => self.proc_steal(ev, cur, new),

            go122::GO_STATUS => self.on_go_status(ev, cur, new, initial_gen),
            go122::GO_CREATE
            | go122::GO_DESTROY
            | go122::GO_STOP
            | go122::GO_BLOCK
            | go122::GO_SYSCALL_BEGIN => self.go_running(ev, cur, new),
            go122::GO_START => self.go_start(ev, cur, new),
            go122::GO_UNBLOCK => self.go_unblock(ev, cur),
            go122::GO_SYSCALL_END => self.go_syscall_end(cur),
            go122::GO_SYSCALL_END_BLOCKED => self.go_syscall_end_blocked(cur, new),

            go122::GC_ACTIVE | go122::GC_BEGIN | go122::GC_END => self.gc(ev, cur, initial_gen),
            go122::GC_SWEEP_BEGIN | go122::GC_SWEEP_ACTIVE | go122::GC_SWEEP_END => {
                self.proc_range(ev, cur, initial_gen)
            }
            go122::STW_BEGIN
            | go122::STW_END
            | go122::GC_MARK_ASSIST_BEGIN
            | go122::GC_MARK_ASSIST_ACTIVE
            | go122::GC_MARK_ASSIST_END => self.go_range(ev, cur, initial_gen),

            go122::USER_TASK_BEGIN | go122::USER_TASK_END => self.task(ev, cur),
            go122::USER_REGION_BEGIN | go122::USER_REGION_END => self.region(ev, table, cur),

            go122::GO_LABEL | go122::PROCS_CHANGE | go122::USER_LOG => {
                validate_ctx(cur, USER_GO_REQS)?;
                ready(cur)
            }
            go122::HEAP_ALLOC | go122::HEAP_GOAL => {
                validate_ctx(cur, PROC_REQS)?;
                ready(cur)
            }
            other => Err(TraceError::broken(format!(
                "bad event type found while ordering: {other}"
            ))),
        }
    }

    // === Processors ===

    fn on_proc_status(
        &mut self,
        ev: &BaseEvent,
        mut cur: SchedCtx,
        new: &mut SchedCtx,
        initial_gen: bool,
    ) -> Advance {
        let pid = ProcId::from_wire(ev.args[0]);
        let declared = ProcStatus::from_wire(ev.args[1])
            .ok_or_else(|| TraceError::broken(format!("invalid proc status {}", ev.args[1])))?;
        let mut reported = declared;
        let mut old = ProcState::from(declared);

        match self.p_states.get_mut(&pid) {
            Some(s) => {
                if s.status == ProcStatus::Bad {
                    old = ProcState::NotExist;
                    s.status = declared;
                } else if declared == ProcStatus::SyscallAbandoned
                    && s.status == ProcStatus::Syscall
                {
                    // The thread in the syscall still holds the processor.
                    old = ProcState::Running;
                    reported = ProcStatus::Syscall;
                } else if s.status != declared {
                    return Err(TraceError::broken(format!(
                        "inconsistent status for proc {pid}: old {} vs. new {declared}",
                        s.status
                    )));
                }
                s.seq = 0;
            }
            None if initial_gen => {
                self.p_states.insert(pid, PState::new(declared));
                old = ProcState::Undetermined;
            }
            None => {
                return Err(TraceError::broken(format!(
                    "found proc status for new proc {pid} after the first generation"
                )));
            }
        }

        if matches!(declared, ProcStatus::Running | ProcStatus::Syscall) {
            new.p = pid;
        }

        // An abandoned processor is still bound to the thread in the syscall.
        // Attribute the event to that thread.
        if declared == ProcStatus::SyscallAbandoned && old != ProcState::Undetermined {
            let holder = self
                .m_states
                .iter()
                .filter(|(_, ms)| ms.p == pid)
                .map(|(mid, ms)| (*mid, *ms))
                .min_by_key(|(mid, _)| *mid);
            match holder {
                Some((mid, ms)) => {
                    cur = SchedCtx {
                        g: ms.g,
                        p: pid,
                        m: mid,
                    };
                }
                None => {
                    return Err(TraceError::broken(format!(
                        "failed to find sched context for proc {pid} that's about to be stolen"
                    )));
                }
            }
        }

        ready_with(
            cur,
            StateTransition::proc(pid, old, ProcState::from(reported)),
        )
    }

    fn proc_start(&mut self, ev: &BaseEvent, cur: SchedCtx, new: &mut SchedCtx) -> Advance {
        let pid = ProcId::from_wire(ev.args[0]);
        let seq = ev.args[1];
        let Some(state) = self.p_states.get_mut(&pid) else {
            return Ok(None);
        };

        // A processor claimed by a steal is handed on by starting it.
        if let Some(thief) = state.stolen_by {
            if state.status == ProcStatus::Running
                && state.seq.checked_add(1) == Some(seq)
                && (cur.p.is_none() || cur.p == pid)
            {
                validate_ctx(
                    cur,
                    SchedReqs {
                        thread: MustHave,
                        proc: MayHave,
                        goroutine: MayHave,
                    },
                )?;
                state.seq = seq;
                state.stolen_by = None;
                if thief != cur.m {
                    if let Some(ms) = self.m_states.get_mut(&thief) {
                        if ms.p == pid {
                            ms.p = ProcId::NONE;
                        }
                    }
                }
                new.p = pid;
                return ready_with(
                    cur,
                    StateTransition::proc(pid, ProcState::Running, ProcState::Running),
                );
            }
        }

        if state.status != ProcStatus::Idle
            || state.seq.checked_add(1) != Some(seq)
            || !cur.p.is_none()
        {
            return Ok(None);
        }
        validate_ctx(
            cur,
            SchedReqs {
                thread: MustHave,
                proc: MustNotHave,
                goroutine: MayHave,
            },
        )?;
        state.status = ProcStatus::Running;
        state.seq = seq;
        new.p = pid;
        ready_with(
            cur,
            StateTransition::proc(pid, ProcState::Idle, ProcState::Running),
        )
    }

    fn proc_stop(&mut self, cur: SchedCtx, new: &mut SchedCtx) -> Advance {
        let Some(state) = self.p_states.get_mut(&cur.p) else {
            return Err(TraceError::broken(format!(
                "event ProcStop for proc ({}) that doesn't exist",
                cur.p
            )));
        };
        if !matches!(state.status, ProcStatus::Running | ProcStatus::Syscall) {
            return Err(TraceError::broken(format!(
                "ProcStop event for proc {} that's not Running or Syscall",
                cur.p
            )));
        }
        validate_ctx(cur, PROC_REQS)?;
        state.status = ProcStatus::Idle;
        state.stolen_by = None;
        new.p = ProcId::NONE;
        ready_with(
            cur,
            StateTransition::proc(cur.p, ProcState::Running, ProcState::Idle),
        )
    }

    fn proc_steal(&mut self, ev: &BaseEvent, cur: SchedCtx, new: &mut SchedCtx) -> Advance {
        let pid = ProcId::from_wire(ev.args[0]);
        let seq = ev.args[1];
        let victim = ThreadId::from_wire(ev.args[2]);
        let Some(state) = self.p_states.get_mut(&pid) else {
            return Ok(None);
        };
        let old = state.status;
        if !matches!(old, ProcStatus::Syscall | ProcStatus::SyscallAbandoned)
            || state.seq.checked_add(1) != Some(seq)
        {
            return Ok(None);
        }
        validate_ctx(
            cur,
            SchedReqs {
                thread: MustHave,
                proc: MayHave,
                goroutine: MayHave,
            },
        )?;

        // An abandoned processor has no thread to take it from.
        if old != ProcStatus::SyscallAbandoned {
            let Some(ms) = self.m_states.get_mut(&victim) else {
                return Err(TraceError::broken(format!(
                    "stole proc {pid} from non-existent thread {victim}"
                )));
            };
            if ms.p != pid {
                return Err(TraceError::broken(format!(
                    "tried to steal proc {pid} from thread {victim}, but got proc {} instead",
                    ms.p
                )));
            }
            ms.p = ProcId::NONE;
        }

        // A thread without a processor takes the stolen one over.
        let claim = cur.p.is_none();
        state.seq = seq;
        let to = if claim {
            state.status = ProcStatus::Running;
            state.stolen_by = Some(cur.m);
            new.p = pid;
            ProcState::Running
        } else {
            state.status = ProcStatus::Idle;
            ProcState::Idle
        };
        let from = if old == ProcStatus::SyscallAbandoned {
            ProcState::Idle
        } else {
            ProcState::Running
        };
        ready_with(cur, StateTransition::proc(pid, from, to))
    }

    // === Goroutines ===

    fn on_go_status(
        &mut self,
        ev: &BaseEvent,
        cur: SchedCtx,
        new: &mut SchedCtx,
        initial_gen: bool,
    ) -> Advance {
        let gid = GoId::from_wire(ev.args[0]);
        let status = GoStatus::from_wire(ev.args[1]).ok_or_else(|| {
            TraceError::broken(format!("invalid goroutine status {}", ev.args[1]))
        })?;
        let mut old = GoState::from(status);

        match self.g_states.get_mut(&gid) {
            Some(s) => {
                if s.status == GoStatus::Bad {
                    old = GoState::NotExist;
                    s.status = status;
                } else if s.status != status {
                    return Err(TraceError::broken(format!(
                        "inconsistent status for goroutine {gid}: old {} vs. new {status}",
                        s.status
                    )));
                }
                s.seq = 0;
            }
            None if initial_gen => {
                self.g_states.insert(gid, GState::new(status));
                old = GoState::Undetermined;
            }
            None => {
                return Err(TraceError::broken(format!(
                    "found goroutine status for new goroutine {gid} after the first generation"
                )));
            }
        }

        if matches!(status, GoStatus::Running | GoStatus::Syscall) {
            new.g = gid;
        }
        ready_with(
            cur,
            StateTransition::goroutine(gid, old, GoState::from(status)),
        )
    }

    /// Events emitted by the running goroutine about itself (or a child).
    fn go_running(&mut self, ev: &BaseEvent, cur: SchedCtx, new: &mut SchedCtx) -> Advance {
        validate_ctx(cur, USER_GO_REQS)?;
        let name = Version::Go122.spec(ev.typ).map_or("?", |s| s.name);
        let Some(state) = self.g_states.get_mut(&cur.g) else {
            return Err(TraceError::broken(format!(
                "event {name} for goroutine ({}) that doesn't exist",
                cur.g
            )));
        };
        if state.status != GoStatus::Running {
            return Err(TraceError::broken(format!(
                "{name} event for goroutine {} that's not Running",
                cur.g
            )));
        }

        let transition = match ev.typ {
            go122::GO_CREATE => {
                let child = GoId::from_wire(ev.args[0]);
                if self.g_states.contains_key(&child) {
                    return Err(TraceError::broken(format!(
                        "tried to create goroutine ({child}) that already exists"
                    )));
                }
                self.g_states.insert(child, GState::new(GoStatus::Runnable));
                StateTransition::Goroutine {
                    id: child,
                    from: GoState::NotExist,
                    to: GoState::Runnable,
                    reason: StringId(0),
                    stack: StackId(ev.args[1]),
                }
            }
            go122::GO_DESTROY => {
                self.g_states.remove(&cur.g);
                new.g = GoId::NONE;
                StateTransition::goroutine(cur.g, GoState::Running, GoState::NotExist)
            }
            go122::GO_STOP | go122::GO_BLOCK => {
                let (status, to) = if ev.typ == go122::GO_STOP {
                    (GoStatus::Runnable, GoState::Runnable)
                } else {
                    (GoStatus::Waiting, GoState::Waiting)
                };
                state.status = status;
                new.g = GoId::NONE;
                StateTransition::Goroutine {
                    id: cur.g,
                    from: GoState::Running,
                    to,
                    reason: StringId(ev.args[0]),
                    stack: StackId(ev.args[1]),
                }
            }
            _ => {
                state.status = GoStatus::Syscall;
                let Some(p) = self.p_states.get_mut(&cur.p) else {
                    return Err(TraceError::broken(format!(
                        "uninitialized proc {} found during GoSyscallBegin",
                        cur.p
                    )));
                };
                p.status = ProcStatus::Syscall;
                StateTransition::Goroutine {
                    id: cur.g,
                    from: GoState::Running,
                    to: GoState::Syscall,
                    reason: StringId(0),
                    stack: StackId(ev.args[0]),
                }
            }
        };
        ready_with(cur, transition)
    }

    fn go_start(&mut self, ev: &BaseEvent, cur: SchedCtx, new: &mut SchedCtx) -> Advance {
        let gid = GoId::from_wire(ev.args[0]);
        let seq = ev.args[1];
        let Some(state) = self.g_states.get_mut(&gid) else {
            return Ok(None);
        };
        if state.status != GoStatus::Runnable || state.seq.checked_add(1) != Some(seq) {
            return Ok(None);
        }
        validate_ctx(
            cur,
            SchedReqs {
                thread: MustHave,
                proc: MustHave,
                goroutine: MustNotHave,
            },
        )?;
        state.status = GoStatus::Running;
        state.seq = seq;
        new.g = gid;
        ready_with(
            cur,
            StateTransition::goroutine(gid, GoState::Runnable, GoState::Running),
        )
    }

    fn go_unblock(&mut self, ev: &BaseEvent, cur: SchedCtx) -> Advance {
        let gid = GoId::from_wire(ev.args[0]);
        let seq = ev.args[1];
        let Some(state) = self.g_states.get_mut(&gid) else {
            return Ok(None);
        };
        if state.status != GoStatus::Waiting || state.seq.checked_add(1) != Some(seq) {
            return Ok(None);
        }
        state.status = GoStatus::Runnable;
        state.seq = seq;
        ready_with(
            cur,
            StateTransition::Goroutine {
                id: gid,
                from: GoState::Waiting,
                to: GoState::Runnable,
                reason: StringId(0),
                stack: StackId(ev.args[2]),
            },
        )
    }

    fn go_syscall_end(&mut self, cur: SchedCtx) -> Advance {
        validate_ctx(cur, USER_GO_REQS)?;
        let Some(state) = self.g_states.get_mut(&cur.g) else {
            return Err(TraceError::broken(format!(
                "event GoSyscallEnd for goroutine ({}) that doesn't exist",
                cur.g
            )));
        };
        if state.status != GoStatus::Syscall {
            return Err(TraceError::broken(format!(
                "GoSyscallEnd event for goroutine {} that's not in a syscall",
                cur.g
            )));
        }
        state.status = GoStatus::Running;

        let Some(p) = self.p_states.get_mut(&cur.p) else {
            return Err(TraceError::broken(format!(
                "uninitialized proc {} found during GoSyscallEnd",
                cur.p
            )));
        };
        if p.status != ProcStatus::Syscall {
            return Err(TraceError::broken(format!(
                "expected proc {} in state Syscall, but got {} instead",
                cur.p, p.status
            )));
        }
        p.status = ProcStatus::Running;
        ready_with(
            cur,
            StateTransition::goroutine(cur.g, GoState::Syscall, GoState::Running),
        )
    }

    fn go_syscall_end_blocked(&mut self, cur: SchedCtx, new: &mut SchedCtx) -> Advance {
        // Wait for the processor to be stolen first.
        if !cur.p.is_none() {
            let Some(p) = self.p_states.get(&cur.p) else {
                return Err(TraceError::broken(format!(
                    "uninitialized proc {} found during GoSyscallEndBlocked",
                    cur.p
                )));
            };
            if p.status == ProcStatus::Syscall {
                return Ok(None);
            }
        }
        validate_ctx(
            cur,
            SchedReqs {
                thread: MustHave,
                proc: MayHave,
                goroutine: MustHave,
            },
        )?;
        let Some(state) = self.g_states.get_mut(&cur.g) else {
            return Err(TraceError::broken(format!(
                "event GoSyscallEndBlocked for goroutine ({}) that doesn't exist",
                cur.g
            )));
        };
        if state.status != GoStatus::Syscall {
            return Err(TraceError::broken(format!(
                "GoSyscallEndBlocked event for goroutine {} that's not in a syscall",
                cur.g
            )));
        }
        state.status = GoStatus::Runnable;
        new.g = GoId::NONE;
        ready_with(
            cur,
            StateTransition::goroutine(cur.g, GoState::Syscall, GoState::Runnable),
        )
    }

    // === GC and ranges ===

    fn gc(&mut self, ev: &BaseEvent, cur: SchedCtx, initial_gen: bool) -> Advance {
        let seq = ev.args[0];
        match ev.typ {
            go122::GC_ACTIVE => {
                if initial_gen {
                    if self.gc_state != GcState::Undetermined {
                        return Err(TraceError::broken(
                            "GCActive in the first generation isn't first GC event",
                        ));
                    }
                    self.gc_seq = seq;
                    self.gc_state = GcState::Running;
                    return ready(cur);
                }
                if self.gc_seq.checked_add(1) != Some(seq) {
                    return Ok(None);
                }
                if self.gc_state != GcState::Running {
                    return Err(TraceError::broken(format!(
                        "encountered GCActive while GC was not in progress (seq {seq})"
                    )));
                }
            }
            go122::GC_BEGIN => {
                if self.gc_state == GcState::Undetermined {
                    self.gc_seq = seq;
                    self.gc_state = GcState::Running;
                    return ready(cur);
                }
                if self.gc_seq.checked_add(1) != Some(seq) {
                    return Ok(None);
                }
                if self.gc_state == GcState::Running {
                    return Err(TraceError::broken(format!(
                        "encountered GCBegin while GC was already in progress (seq {seq})"
                    )));
                }
                self.gc_state = GcState::Running;
            }
            _ => {
                if self.gc_seq.checked_add(1) != Some(seq) {
                    return Ok(None);
                }
                if self.gc_state == GcState::NotRunning {
                    return Err(TraceError::broken(format!(
                        "encountered GCEnd when GC was not in progress (seq {seq})"
                    )));
                }
                self.gc_state = GcState::NotRunning;
            }
        }
        validate_ctx(cur, USER_GO_REQS)?;
        self.gc_seq = seq;
        ready(cur)
    }

    /// Sweep ranges, tracked per processor.
    fn proc_range(&mut self, ev: &BaseEvent, cur: SchedCtx, initial_gen: bool) -> Advance {
        let r = RangeType::of(ev.typ, StringId(0));
        if ev.typ == go122::GC_SWEEP_ACTIVE {
            let pid = ProcId::from_wire(ev.args[0]);
            let Some(state) = self.p_states.get_mut(&pid) else {
                return Err(TraceError::broken(format!(
                    "GCSweepActive for unknown proc {pid}"
                )));
            };
            state.ranges.active(r, initial_gen)?;
            return ready(cur);
        }

        validate_ctx(cur, PROC_REQS)?;
        let Some(state) = self.p_states.get_mut(&cur.p) else {
            return Err(TraceError::broken(format!(
                "sweep event for unknown proc {}",
                cur.p
            )));
        };
        if ev.typ == go122::GC_SWEEP_BEGIN {
            state.ranges.begin(r)?;
        } else {
            state.ranges.end(ev.typ)?;
        }
        ready(cur)
    }

    /// Stop-the-world and mark assist ranges, tracked per goroutine.
    fn go_range(&mut self, ev: &BaseEvent, cur: SchedCtx, initial_gen: bool) -> Advance {
        if ev.typ == go122::GC_MARK_ASSIST_ACTIVE {
            let gid = GoId::from_wire(ev.args[0]);
            let Some(state) = self.g_states.get_mut(&gid) else {
                return Err(TraceError::broken(format!(
                    "GCMarkAssistActive for unknown goroutine {gid}"
                )));
            };
            state
                .ranges
                .active(RangeType::of(ev.typ, StringId(0)), initial_gen)?;
            return ready(cur);
        }

        validate_ctx(cur, USER_GO_REQS)?;
        let Some(state) = self.g_states.get_mut(&cur.g) else {
            return Err(TraceError::broken(format!(
                "range event for unknown goroutine {}",
                cur.g
            )));
        };
        match ev.typ {
            go122::STW_BEGIN | go122::GC_MARK_ASSIST_BEGIN => {
                let desc = if ev.typ == go122::STW_BEGIN {
                    StringId(ev.args[0])
                } else {
                    StringId(0)
                };
                state.ranges.begin(RangeType::of(ev.typ, desc))?;
                ready(cur)
            }
            _ => {
                let desc = state.ranges.end(ev.typ)?;
                Ok(Some(Step {
                    ctx: cur,
                    transition: None,
                    range_desc: Some(desc),
                }))
            }
        }
    }

    // === User annotations ===

    fn task(&mut self, ev: &BaseEvent, cur: SchedCtx) -> Advance {
        validate_ctx(cur, USER_GO_REQS)?;
        let id = TaskId(ev.args[0]);
        if ev.typ == go122::USER_TASK_BEGIN {
            if !self.active_tasks.insert(id) {
                return Err(TraceError::broken(format!(
                    "task ID conflict: {id}"
                )));
            }
        } else {
            self.active_tasks.remove(&id);
        }
        ready(cur)
    }

    fn region(&mut self, ev: &BaseEvent, table: &EvTable, cur: SchedCtx) -> Advance {
        validate_ctx(cur, USER_GO_REQS)?;
        let task = TaskId(ev.args[0]);
        let name_id = StringId(ev.args[1]);
        let Some(name) = table.string(name_id) else {
            return Err(TraceError::broken(format!(
                "invalid string ID {} for region name",
                name_id.0
            )));
        };
        let region = UserRegion {
            task,
            name: name.to_string(),
        };
        let Some(state) = self.g_states.get_mut(&cur.g) else {
            return Err(TraceError::broken(format!(
                "region event for unknown goroutine {}",
                cur.g
            )));
        };
        if ev.typ == go122::USER_REGION_BEGIN {
            state.regions.push(region);
            return ready(cur);
        }
        match state.regions.last() {
            Some(top) if *top == region => {
                state.regions.pop();
                ready(cur)
            }
            Some(top) => Err(TraceError::broken(format!(
                "misuse of region in goroutine {}: region end {}/{} when the inner-most active region start event is {}/{}",
                cur.g, region.task, region.name, top.task, top.name
            ))),
            None => Err(TraceError::broken(format!(
                "region end {}/{} in goroutine {} without a matching begin",
                region.task, region.name, cur.g
            ))),
        }
    }

    // === Inspection ===

    pub fn go_status(&self, g: GoId) -> Option<GoStatus> {
        self.g_states.get(&g).map(|s| s.status)
    }

    pub fn proc_status(&self, p: ProcId) -> Option<ProcStatus> {
        self.p_states.get(&p).map(|s| s.status)
    }

    /// The thread currently bound to processor `p`.
    pub fn proc_owner(&self, p: ProcId) -> Option<ThreadId> {
        self.m_states
            .iter()
            .filter(|(_, ms)| ms.p == p)
            .map(|(m, _)| *m)
            .min()
    }

    /// The processor and goroutine thread `m` is bound to.
    pub fn thread(&self, m: ThreadId) -> Option<SchedCtx> {
        self.m_states
            .get(&m)
            .map(|ms| SchedCtx { g: ms.g, p: ms.p, m })
    }

    pub fn gc_state(&self) -> GcState {
        self.gc_state
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.len()
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms: Vec<_> = self.m_states.iter().collect();
        ms.sort_by_key(|(id, _)| **id);
        for (id, s) in ms {
            writeln!(f, "M {id} [G {}] [P {}]", s.g, s.p)?;
        }

        let mut ps: Vec<_> = self.p_states.iter().collect();
        ps.sort_by_key(|(id, _)| **id);
        for (id, s) in ps {
            write!(f, "P {id} [status={} seq={}", s.status, s.seq)?;
            for r in &s.ranges.in_flight {
                write!(f, " {}", r.name())?;
            }
            writeln!(f, "]")?;
        }

        let mut gs: Vec<_> = self.g_states.iter().collect();
        gs.sort_by_key(|(id, _)| **id);
        for (id, s) in gs {
            write!(f, "G {id} [status={} seq={}", s.status, s.seq)?;
            for r in &s.ranges.in_flight {
                write!(f, " {}", r.name())?;
            }
            writeln!(f, "]")?;
        }

        let mut tasks: Vec<_> = self.active_tasks.iter().collect();
        tasks.sort();
        if !tasks.is_empty() {
            write!(f, "Tasks")?;
            for t in tasks {
                write!(f, " {t}")?;
            }
            writeln!(f)?;
        }
        write!(f, "GC {:?} seq={}", self.gc_state, self.gc_seq)
    }
}
