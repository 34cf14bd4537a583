//! Registry for the older revision (`go 1.21 trace`).
//!
//! Identical to the current revision up to `STWEnd`. It has no `*Active` GC
//! events, so every later event type is numbered differently, and it only
//! marks stack arguments: reasons and names are plain values.

use super::{Arg, EventType, Spec};

pub const EVENT_BATCH: EventType = EventType(1);
pub const STACKS: EventType = EventType(2);
pub const STACK: EventType = EventType(3);
pub const STRINGS: EventType = EventType(4);
pub const STRING: EventType = EventType(5);
pub const CPU_SAMPLES: EventType = EventType(6);
pub const CPU_SAMPLE: EventType = EventType(7);
pub const FREQUENCY: EventType = EventType(8);
pub const PROCS_CHANGE: EventType = EventType(9);
pub const PROC_START: EventType = EventType(10);
pub const PROC_STOP: EventType = EventType(11);
pub const PROC_STEAL: EventType = EventType(12);
pub const PROC_STATUS: EventType = EventType(13);
pub const GO_CREATE: EventType = EventType(14);
pub const GO_START: EventType = EventType(15);
pub const GO_DESTROY: EventType = EventType(16);
pub const GO_STOP: EventType = EventType(17);
pub const GO_BLOCK: EventType = EventType(18);
pub const GO_UNBLOCK: EventType = EventType(19);
pub const GO_SYSCALL_BEGIN: EventType = EventType(20);
pub const GO_SYSCALL_END: EventType = EventType(21);
pub const GO_SYSCALL_END_BLOCKED: EventType = EventType(22);
pub const GO_STATUS: EventType = EventType(23);
pub const STW_BEGIN: EventType = EventType(24);
pub const STW_END: EventType = EventType(25);
pub const GC_BEGIN: EventType = EventType(26);
pub const GC_END: EventType = EventType(27);
pub const GC_SWEEP_BEGIN: EventType = EventType(28);
pub const GC_SWEEP_END: EventType = EventType(29);
pub const GC_MARK_ASSIST_BEGIN: EventType = EventType(30);
pub const GC_MARK_ASSIST_END: EventType = EventType(31);
pub const HEAP_ALLOC: EventType = EventType(32);
pub const HEAP_GOAL: EventType = EventType(33);
pub const GO_LABEL: EventType = EventType(34);
pub const USER_TASK_BEGIN: EventType = EventType(35);
pub const USER_TASK_END: EventType = EventType(36);
pub const USER_REGION_BEGIN: EventType = EventType(37);
pub const USER_REGION_END: EventType = EventType(38);
pub const USER_LOG: EventType = EventType(39);

const DT: Arg = Arg::plain("dt");
const STK: Arg = Arg::stack("stack");

pub static SPECS: [Spec; 40] = [
    Spec::UNUSED,
    Spec::structural(
        "EventBatch",
        &[
            Arg::plain("gen"),
            Arg::plain("m"),
            Arg::plain("ts"),
            Arg::plain("size"),
        ],
    ),
    Spec::structural("Stacks", &[]),
    Spec::structural("Stack", &[Arg::plain("id"), Arg::plain("nframes")]).stack_entry(),
    Spec::structural("Strings", &[]),
    Spec::structural("String", &[Arg::plain("id")]).with_data(),
    Spec::structural("CPUSamples", &[]),
    Spec::structural(
        "CPUSample",
        &[
            Arg::plain("ts"),
            Arg::plain("m"),
            Arg::plain("p"),
            Arg::plain("g"),
            Arg::plain("stack"),
        ],
    ),
    Spec::structural("Frequency", &[Arg::plain("freq")]),
    Spec::timed("ProcsChange", &[DT, Arg::plain("procs_value"), STK]),
    Spec::timed("ProcStart", &[DT, Arg::plain("p"), Arg::plain("p_seq")]),
    Spec::timed("ProcStop", &[DT]),
    Spec::timed(
        "ProcSteal",
        &[DT, Arg::plain("p"), Arg::plain("p_seq"), Arg::plain("m")],
    ),
    Spec::timed("ProcStatus", &[DT, Arg::plain("p"), Arg::plain("pstatus")]),
    Spec::timed(
        "GoCreate",
        &[DT, Arg::plain("new_g"), Arg::plain("new_stack"), STK],
    ),
    Spec::timed("GoStart", &[DT, Arg::plain("g"), Arg::plain("g_seq")]),
    Spec::timed("GoDestroy", &[DT]),
    Spec::timed("GoStop", &[DT, Arg::plain("reason"), STK]),
    Spec::timed("GoBlock", &[DT, Arg::plain("reason"), STK]),
    Spec::timed(
        "GoUnblock",
        &[DT, Arg::plain("g"), Arg::plain("g_seq"), STK],
    ),
    Spec::timed("GoSyscallBegin", &[DT, STK]),
    Spec::timed("GoSyscallEnd", &[DT]).ends(GO_SYSCALL_BEGIN),
    Spec::timed("GoSyscallEndBlocked", &[DT]).ends(GO_SYSCALL_BEGIN),
    Spec::timed("GoStatus", &[DT, Arg::plain("g"), Arg::plain("status")]),
    Spec::timed("STWBegin", &[DT, Arg::plain("kind"), STK]),
    Spec::timed("STWEnd", &[DT]).ends(STW_BEGIN),
    Spec::timed("GCBegin", &[DT, Arg::plain("seq"), STK]),
    Spec::timed("GCEnd", &[DT, Arg::plain("seq")]).ends(GC_BEGIN),
    Spec::timed("GCSweepBegin", &[DT, STK]),
    Spec::timed(
        "GCSweepEnd",
        &[DT, Arg::plain("swept"), Arg::plain("reclaimed")],
    )
    .ends(GC_SWEEP_BEGIN),
    Spec::timed("GCMarkAssistBegin", &[DT, STK]),
    Spec::timed("GCMarkAssistEnd", &[DT]).ends(GC_MARK_ASSIST_BEGIN),
    Spec::timed("HeapAlloc", &[DT, Arg::plain("heap_alloc")]),
    Spec::timed("HeapGoal", &[DT, Arg::plain("heap_goal")]),
    Spec::timed("GoLabel", &[DT, Arg::plain("label")]),
    Spec::timed(
        "UserTaskBegin",
        &[
            DT,
            Arg::plain("task"),
            Arg::plain("parent_task"),
            Arg::plain("name"),
            STK,
        ],
    ),
    Spec::timed("UserTaskEnd", &[DT, Arg::plain("task"), STK]),
    Spec::timed(
        "UserRegionBegin",
        &[DT, Arg::plain("task"), Arg::plain("name"), STK],
    ),
    Spec::timed(
        "UserRegionEnd",
        &[DT, Arg::plain("task"), Arg::plain("name"), STK],
    )
    .ends(USER_REGION_BEGIN),
    Spec::timed(
        "UserLog",
        &[
            DT,
            Arg::plain("task"),
            Arg::plain("key"),
            Arg::plain("value"),
            STK,
        ],
    ),
];
