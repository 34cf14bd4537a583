//! Registry for the current revision (`go 1.22 trace`).
//!
//! Arguments carry typed roles for string and stack ids, and the GC phases
//! have `*Active` events declaring ranges already in progress at the start
//! of a generation.

use super::{Arg, EventType, Spec};

// Structural events.
pub const EVENT_BATCH: EventType = EventType(1);
pub const STACKS: EventType = EventType(2);
pub const STACK: EventType = EventType(3);
pub const STRINGS: EventType = EventType(4);
pub const STRING: EventType = EventType(5);
pub const CPU_SAMPLES: EventType = EventType(6);
pub const CPU_SAMPLE: EventType = EventType(7);
pub const FREQUENCY: EventType = EventType(8);

// Procs.
pub const PROCS_CHANGE: EventType = EventType(9);
pub const PROC_START: EventType = EventType(10);
pub const PROC_STOP: EventType = EventType(11);
pub const PROC_STEAL: EventType = EventType(12);
pub const PROC_STATUS: EventType = EventType(13);

// Goroutines.
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

// STW.
pub const STW_BEGIN: EventType = EventType(24);
pub const STW_END: EventType = EventType(25);

// GC.
pub const GC_ACTIVE: EventType = EventType(26);
pub const GC_BEGIN: EventType = EventType(27);
pub const GC_END: EventType = EventType(28);
pub const GC_SWEEP_ACTIVE: EventType = EventType(29);
pub const GC_SWEEP_BEGIN: EventType = EventType(30);
pub const GC_SWEEP_END: EventType = EventType(31);
pub const GC_MARK_ASSIST_ACTIVE: EventType = EventType(32);
pub const GC_MARK_ASSIST_BEGIN: EventType = EventType(33);
pub const GC_MARK_ASSIST_END: EventType = EventType(34);
pub const HEAP_ALLOC: EventType = EventType(35);
pub const HEAP_GOAL: EventType = EventType(36);

// Annotations.
pub const GO_LABEL: EventType = EventType(37);
pub const USER_TASK_BEGIN: EventType = EventType(38);
pub const USER_TASK_END: EventType = EventType(39);
pub const USER_REGION_BEGIN: EventType = EventType(40);
pub const USER_REGION_END: EventType = EventType(41);
pub const USER_LOG: EventType = EventType(42);

const DT: Arg = Arg::plain("dt");
const STK: Arg = Arg::stack("stack");

pub static SPECS: [Spec; 43] = [
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
        &[
            DT,
            Arg::plain("new_g"),
            Arg::transition_stack("new_stack"),
            STK,
        ],
    ),
    Spec::timed("GoStart", &[DT, Arg::plain("g"), Arg::plain("g_seq")]),
    Spec::timed("GoDestroy", &[DT]),
    Spec::timed("GoStop", &[DT, Arg::string("reason_string"), STK]),
    Spec::timed("GoBlock", &[DT, Arg::string("reason_string"), STK]),
    Spec::timed(
        "GoUnblock",
        &[DT, Arg::plain("g"), Arg::plain("g_seq"), STK],
    ),
    Spec::timed("GoSyscallBegin", &[DT, STK]),
    Spec::timed("GoSyscallEnd", &[DT]).ends(GO_SYSCALL_BEGIN),
    Spec::timed("GoSyscallEndBlocked", &[DT]).ends(GO_SYSCALL_BEGIN),
    Spec::timed("GoStatus", &[DT, Arg::plain("g"), Arg::plain("gstatus")]),
    Spec::timed("STWBegin", &[DT, Arg::string("kind_string"), STK]),
    Spec::timed("STWEnd", &[DT]).ends(STW_BEGIN),
    Spec::timed("GCActive", &[DT, Arg::plain("gc_seq")]).ends(GC_BEGIN),
    Spec::timed("GCBegin", &[DT, Arg::plain("gc_seq"), STK]),
    Spec::timed("GCEnd", &[DT, Arg::plain("gc_seq")]).ends(GC_BEGIN),
    Spec::timed("GCSweepActive", &[DT, Arg::plain("p")]).ends(GC_SWEEP_BEGIN),
    Spec::timed("GCSweepBegin", &[DT, STK]),
    Spec::timed(
        "GCSweepEnd",
        &[DT, Arg::plain("swept_value"), Arg::plain("reclaimed_value")],
    )
    .ends(GC_SWEEP_BEGIN),
    Spec::timed("GCMarkAssistActive", &[DT, Arg::plain("g")]).ends(GC_MARK_ASSIST_BEGIN),
    Spec::timed("GCMarkAssistBegin", &[DT, STK]),
    Spec::timed("GCMarkAssistEnd", &[DT]).ends(GC_MARK_ASSIST_BEGIN),
    Spec::timed("HeapAlloc", &[DT, Arg::plain("heapalloc_value")]),
    Spec::timed("HeapGoal", &[DT, Arg::plain("heapgoal_value")]),
    Spec::timed("GoLabel", &[DT, Arg::string("label_string")]),
    Spec::timed(
        "UserTaskBegin",
        &[
            DT,
            Arg::plain("task"),
            Arg::plain("parent_task"),
            Arg::string("name_string"),
            STK,
        ],
    ),
    Spec::timed("UserTaskEnd", &[DT, Arg::plain("task"), STK]),
    Spec::timed(
        "UserRegionBegin",
        &[DT, Arg::plain("task"), Arg::string("name_string"), STK],
    ),
    Spec::timed(
        "UserRegionEnd",
        &[DT, Arg::plain("task"), Arg::string("name_string"), STK],
    )
    .ends(USER_REGION_BEGIN),
    Spec::timed(
        "UserLog",
        &[
            DT,
            Arg::plain("task"),
            Arg::string("key_string"),
            Arg::string("value_string"),
            STK,
        ],
    ),
];
