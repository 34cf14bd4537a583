//! High-level events produced by the trace reader.

use std::fmt;
use std::sync::Arc;

use crate::baseevent::BaseEvent;
use crate::generation::{CpuSample, EvTable, Stack};
use crate::order::Step;
use crate::spec::{go122, EventType, GoStatus, ProcStatus, Version};
use crate::types::{GoId, ProcId, SchedCtx, StackId, StringId, TaskId, ThreadId, Time};

/// The state of a goroutine as seen by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoState {
    Undetermined,
    NotExist,
    Runnable,
    Running,
    Waiting,
    Syscall,
}

impl From<GoStatus> for GoState {
    fn from(s: GoStatus) -> Self {
        match s {
            GoStatus::Bad => GoState::Undetermined,
            GoStatus::Runnable => GoState::Runnable,
            GoStatus::Running => GoState::Running,
            GoStatus::Syscall => GoState::Syscall,
            GoStatus::Waiting => GoState::Waiting,
        }
    }
}

/// The state of a processor as seen by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcState {
    Undetermined,
    NotExist,
    Running,
    Idle,
}

impl From<ProcStatus> for ProcState {
    fn from(s: ProcStatus) -> Self {
        match s {
            ProcStatus::Bad => ProcState::Undetermined,
            ProcStatus::Running | ProcStatus::Syscall | ProcStatus::SyscallAbandoned => {
                ProcState::Running
            }
            ProcStatus::Idle => ProcState::Idle,
        }
    }
}

/// A change in the state of a goroutine or processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    Goroutine {
        id: GoId,
        from: GoState,
        to: GoState,
        /// Why the goroutine stopped or blocked. Id 0 if not applicable.
        reason: StringId,
        /// The goroutine's stack at the transition. For `GoCreate` this is
        /// the new goroutine's starting stack.
        stack: StackId,
    },
    Proc {
        id: ProcId,
        from: ProcState,
        to: ProcState,
    },
}

impl StateTransition {
    pub(crate) fn goroutine(id: GoId, from: GoState, to: GoState) -> Self {
        StateTransition::Goroutine {
            id,
            from,
            to,
            reason: StringId(0),
            stack: StackId(0),
        }
    }

    pub(crate) fn proc(id: ProcId, from: ProcState, to: ProcState) -> Self {
        StateTransition::Proc { id, from, to }
    }
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTransition::Goroutine { id, from, to, .. } => {
                write!(f, "G={id} {from:?}->{to:?}")
            }
            StateTransition::Proc { id, from, to } => write!(f, "P={id} {from:?}->{to:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Boundary between two generations.
    Sync,
    Metric,
    Label,
    StackSample,
    RangeBegin,
    RangeActive,
    RangeEnd,
    TaskBegin,
    TaskEnd,
    RegionBegin,
    RegionEnd,
    Log,
    StateTransition,
}

/// Pseudo-type for synthetic `Sync` events. Never appears on the wire.
const EV_SYNC: EventType = EventType(0);

fn kind_of(typ: EventType) -> EventKind {
    match typ {
        go122::PROCS_CHANGE | go122::HEAP_ALLOC | go122::HEAP_GOAL => EventKind::Metric,
        go122::GO_LABEL => EventKind::Label,
        go122::CPU_SAMPLE => EventKind::StackSample,
        go122::STW_BEGIN | go122::GC_BEGIN | go122::GC_SWEEP_BEGIN | go122::GC_MARK_ASSIST_BEGIN => {
            EventKind::RangeBegin
        }
        go122::GC_ACTIVE | go122::GC_SWEEP_ACTIVE | go122::GC_MARK_ASSIST_ACTIVE => {
            EventKind::RangeActive
        }
        go122::STW_END | go122::GC_END | go122::GC_SWEEP_END | go122::GC_MARK_ASSIST_END => {
            EventKind::RangeEnd
        }
        go122::USER_TASK_BEGIN => EventKind::TaskBegin,
        go122::USER_TASK_END => EventKind::TaskEnd,
        go122::USER_REGION_BEGIN => EventKind::RegionBegin,
        go122::USER_REGION_END => EventKind::RegionEnd,
        go122::USER_LOG => EventKind::Log,
        EV_SYNC => EventKind::Sync,
        _ => EventKind::StateTransition,
    }
}

/// A validated event, placed in its scheduling context.
///
/// Ids in the event (strings, stacks) are resolved against the table of the
/// generation it was read from.
#[derive(Debug, Clone)]
pub struct Event {
    table: Arc<EvTable>,
    ctx: SchedCtx,
    base: BaseEvent,
    transition: Option<StateTransition>,
    /// The description of the range this event ends, if any.
    range_desc: Option<StringId>,
}

impl Event {
    pub(crate) fn sync(table: Arc<EvTable>, time: Time) -> Self {
        Event {
            table,
            ctx: SchedCtx::NONE,
            base: BaseEvent {
                typ: EV_SYNC,
                time,
                args: [0; 4],
            },
            transition: None,
            range_desc: None,
        }
    }

    pub(crate) fn from_step(table: Arc<EvTable>, base: BaseEvent, step: Step) -> Self {
        Event {
            table,
            ctx: step.ctx,
            base,
            transition: step.transition,
            range_desc: step.range_desc,
        }
    }

    pub(crate) fn cpu_sample(table: Arc<EvTable>, s: &CpuSample) -> Self {
        Event {
            table,
            ctx: s.ctx,
            base: BaseEvent {
                typ: go122::CPU_SAMPLE,
                time: s.time,
                args: [s.stack.0, 0, 0, 0],
            },
            transition: None,
            range_desc: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        kind_of(self.base.typ)
    }

    /// The wire event type, or 0 for `Sync` events.
    pub fn event_type(&self) -> EventType {
        self.base.typ
    }

    pub fn name(&self) -> &'static str {
        if self.base.typ == EV_SYNC {
            return "Sync";
        }
        Version::Go122.spec(self.base.typ).map_or("", |s| s.name)
    }

    pub fn time(&self) -> Time {
        self.base.time
    }

    pub(crate) fn set_time(&mut self, t: Time) {
        self.base.time = t;
    }

    pub fn ctx(&self) -> SchedCtx {
        self.ctx
    }

    pub fn thread(&self) -> ThreadId {
        self.ctx.m
    }

    pub fn proc(&self) -> ProcId {
        self.ctx.p
    }

    pub fn goroutine(&self) -> GoId {
        self.ctx.g
    }

    /// The arguments following the timestamp delta.
    pub fn args(&self) -> &[u64] {
        let n = match self.base.typ {
            EV_SYNC => 0,
            go122::CPU_SAMPLE => 1,
            typ => Version::Go122
                .spec(typ)
                .map_or(0, |s| s.arity().saturating_sub(1)),
        };
        &self.base.args[..n]
    }

    pub fn state_transition(&self) -> Option<StateTransition> {
        self.transition
    }

    /// The stack the event was emitted with, if it has one.
    pub fn stack(&self) -> Option<&Stack> {
        let id = match self.base.typ {
            go122::CPU_SAMPLE => self.base.args[0],
            typ => {
                let spec = Version::Go122.spec(typ)?;
                let i = spec
                    .args
                    .iter()
                    .position(|a| a.role == crate::spec::ArgRole::Stack)?;
                self.base.args[i - 1]
            }
        };
        self.table.stack(StackId(id))
    }

    /// Resolves a string id against the event's generation.
    pub fn string(&self, id: StringId) -> Option<&str> {
        self.table.string(id)
    }

    /// Resolves a stack frame's function and file names.
    pub fn frame_names(&self, stack: &Stack) -> Vec<(String, String, u64)> {
        stack
            .frames
            .iter()
            .map(|fr| {
                (
                    self.string(fr.func).unwrap_or_default().to_string(),
                    self.string(fr.file).unwrap_or_default().to_string(),
                    fr.line,
                )
            })
            .collect()
    }

    /// The label of a `GoLabel` event.
    pub fn label(&self) -> Option<&str> {
        match self.base.typ {
            go122::GO_LABEL => self.string(StringId(self.base.args[0])),
            _ => None,
        }
    }

    /// The name and value of a metric event.
    pub fn metric(&self) -> Option<(&'static str, u64)> {
        let name = match self.base.typ {
            go122::PROCS_CHANGE => "/sched/gomaxprocs:threads",
            go122::HEAP_ALLOC => "/memory/classes/heap/objects:bytes",
            go122::HEAP_GOAL => "/gc/heap/goal:bytes",
            _ => return None,
        };
        Some((name, self.base.args[0]))
    }

    /// The name of the range a range event begins, continues or ends.
    pub fn range_name(&self) -> Option<String> {
        let name = match self.base.typ {
            go122::STW_BEGIN => {
                return Some(self.stw_name(StringId(self.base.args[0])));
            }
            go122::STW_END => {
                return Some(self.stw_name(self.range_desc.unwrap_or_default()));
            }
            go122::GC_BEGIN | go122::GC_ACTIVE | go122::GC_END => "GC concurrent mark phase",
            go122::GC_SWEEP_BEGIN | go122::GC_SWEEP_ACTIVE | go122::GC_SWEEP_END => {
                "GC incremental sweep"
            }
            go122::GC_MARK_ASSIST_BEGIN
            | go122::GC_MARK_ASSIST_ACTIVE
            | go122::GC_MARK_ASSIST_END => "GC mark assist",
            _ => return None,
        };
        Some(name.to_string())
    }

    fn stw_name(&self, kind: StringId) -> String {
        format!("stop-the-world ({})", self.string(kind).unwrap_or_default())
    }

    /// The task a task, region or log event refers to.
    pub fn task(&self) -> Option<TaskId> {
        match self.base.typ {
            go122::USER_TASK_BEGIN
            | go122::USER_TASK_END
            | go122::USER_REGION_BEGIN
            | go122::USER_REGION_END
            | go122::USER_LOG => Some(TaskId(self.base.args[0])),
            _ => None,
        }
    }

    /// The parent of a task begun by a `UserTaskBegin` event.
    pub fn parent_task(&self) -> Option<TaskId> {
        (self.base.typ == go122::USER_TASK_BEGIN).then(|| TaskId(self.base.args[1]))
    }

    /// The name of a task begin or region event.
    pub fn task_or_region_name(&self) -> Option<&str> {
        match self.base.typ {
            go122::USER_TASK_BEGIN => self.string(StringId(self.base.args[2])),
            go122::USER_REGION_BEGIN | go122::USER_REGION_END => {
                self.string(StringId(self.base.args[1]))
            }
            _ => None,
        }
    }

    /// The key and message of a `UserLog` event.
    pub fn log(&self) -> Option<(&str, &str)> {
        if self.base.typ != go122::USER_LOG {
            return None;
        }
        let key = self.string(StringId(self.base.args[1]))?;
        let value = self.string(StringId(self.base.args[2]))?;
        Some((key, value))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.base.time, self.name(), self.ctx)?;
        if let Some(spec) = Version::Go122.spec(self.base.typ) {
            for (arg, v) in spec.args.iter().skip(1).zip(self.args()) {
                write!(f, " {}={v}", arg.name)?;
            }
        }
        if let Some(t) = &self.transition {
            write!(f, " transition=[{t}]")?;
        }
        Ok(())
    }
}
