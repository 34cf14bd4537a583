use crate::spec::{EventType, Version};
use crate::types::{Time, Timestamp, TraceError};
use crate::varint::{self, VarintError};

/// Maximum number of arguments of a timed event, timestamp delta included.
pub const MAX_ARGS: usize = 5;

/// A timed event decoded without allocation.
///
/// `args` holds the arguments after the timestamp delta; unused slots are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BaseEvent {
    pub typ: EventType,
    pub time: Time,
    pub args: [u64; MAX_ARGS - 1],
}

/// Decodes one timed event from the front of `b`.
///
/// Returns the number of bytes consumed, the event's timestamp delta, and the
/// event with its time left at zero for the caller to resolve.
pub fn read_base_event(
    version: Version,
    b: &[u8],
) -> Result<(usize, Timestamp, BaseEvent), TraceError> {
    let Some(&first) = b.first() else {
        return Err(TraceError::TruncatedStream { offset: 0 });
    };
    let typ = EventType(first);
    let spec = version.spec(typ).ok_or(TraceError::InvalidEventType {
        ev: first,
        offset: 0,
    })?;
    if spec.arity() == 0 || !spec.is_timed_event {
        return Err(TraceError::NotATimedEvent(typ));
    }
    if spec.arity() > MAX_ARGS {
        return Err(TraceError::TooManyArgs(typ));
    }

    let mut n = 1;
    let read = |n: &mut usize| -> Result<u64, TraceError> {
        let offset = *n as u64;
        match varint::uvarint(&b[*n..]) {
            Ok((v, len)) => {
                *n += len;
                Ok(v)
            }
            Err(VarintError::Truncated) => Err(TraceError::TruncatedStream {
                offset: b.len() as u64,
            }),
            Err(VarintError::Overflow) => Err(TraceError::VarintOverflow { offset }),
        }
    };

    let dt = Timestamp(read(&mut n)?);
    let mut ev = BaseEvent {
        typ,
        ..BaseEvent::default()
    };
    for slot in ev.args.iter_mut().take(spec.arity() - 1) {
        *slot = read(&mut n)?;
    }
    Ok((n, dt, ev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{go121, go122};
    use assert_matches::assert_matches;

    #[test]
    fn test_read_timed_event() {
        let b = [go122::PROC_STEAL.0, 0x80, 0x01, 2, 3, 4, 0xAA];
        let (n, dt, ev) = read_base_event(Version::Go122, &b).unwrap();
        assert_eq!(n, 6);
        assert_eq!(dt, Timestamp(128));
        assert_eq!(ev.typ, go122::PROC_STEAL);
        assert_eq!(ev.args, [2, 3, 4, 0]);
        assert_eq!(ev.time, Time(0));
    }

    #[test]
    fn test_five_args() {
        let b = [go122::USER_LOG.0, 1, 2, 3, 4, 5];
        let (n, dt, ev) = read_base_event(Version::Go122, &b).unwrap();
        assert_eq!((n, dt), (6, Timestamp(1)));
        assert_eq!(ev.args, [2, 3, 4, 5]);
    }

    #[test]
    fn test_revisions_decode_differently() {
        // Type 26 is GCBegin in the older revision and GCActive in the newer.
        let b = [26, 1, 9, 0];
        let (n, _, ev) = read_base_event(Version::Go121, &b).unwrap();
        assert_eq!((n, ev.typ), (4, go121::GC_BEGIN));
        let (n, _, ev) = read_base_event(Version::Go122, &b).unwrap();
        assert_eq!((n, ev.typ), (3, go122::GC_ACTIVE));
    }

    #[test]
    fn test_rejects_untimed() {
        assert_matches!(
            read_base_event(Version::Go122, &[go122::FREQUENCY.0, 1]),
            Err(TraceError::NotATimedEvent(t)) if t == go122::FREQUENCY
        );
        assert_matches!(
            read_base_event(Version::Go122, &[go122::STACKS.0]),
            Err(TraceError::NotATimedEvent(_))
        );
    }

    #[test]
    fn test_rejects_invalid_type() {
        assert_matches!(
            read_base_event(Version::Go122, &[0, 1]),
            Err(TraceError::InvalidEventType { ev: 0, .. })
        );
        assert_matches!(
            read_base_event(Version::Go122, &[250, 1]),
            Err(TraceError::InvalidEventType { ev: 250, .. })
        );
        assert_matches!(
            read_base_event(Version::Go122, &[]),
            Err(TraceError::TruncatedStream { offset: 0 })
        );
    }

    #[test]
    fn test_truncated_args() {
        assert_matches!(
            read_base_event(Version::Go122, &[go122::PROC_START.0, 1, 2]),
            Err(TraceError::TruncatedStream { offset: 3 })
        );
    }
}
