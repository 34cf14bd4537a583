use std::io::Read;

use bytes::Bytes;

use crate::config::ReaderConfig;
use crate::raw::ByteSource;
use crate::spec::{go122, EventType};
use crate::types::{ThreadId, Timestamp, TraceError};

/// The payload of one `EventBatch` record: events from a single thread
/// within a single generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub m: ThreadId,
    pub time: Timestamp,
    pub data: Bytes,
    /// Stream offset of the first payload byte.
    pub offset: u64,
}

impl Batch {
    fn first_is(&self, ev: EventType) -> bool {
        self.data.first() == Some(&ev.0)
    }

    pub fn is_strings_batch(&self) -> bool {
        self.first_is(go122::STRINGS)
    }

    pub fn is_stacks_batch(&self) -> bool {
        self.first_is(go122::STACKS)
    }

    pub fn is_cpu_samples_batch(&self) -> bool {
        self.first_is(go122::CPU_SAMPLES)
    }

    pub fn is_freq_batch(&self) -> bool {
        self.first_is(go122::FREQUENCY)
    }
}

/// Reads one batch and returns it with its generation number.
///
/// Returns [`TraceError::EndOfStream`] on a clean EOF before the batch.
pub(crate) fn read_batch<R: Read>(
    src: &mut ByteSource<R>,
    cfg: &ReaderConfig,
) -> Result<(Batch, u64), TraceError> {
    let offset = src.offset();
    let Some(b) = src.byte()? else {
        return Err(TraceError::EndOfStream);
    };
    if EventType(b) != go122::EVENT_BATCH {
        return Err(TraceError::broken(format!(
            "expected batch event at offset {offset}, got {b}"
        )));
    }

    let gen = src.uvarint()?;
    let m = src.uvarint()?;
    let ts = src.uvarint()?;
    let size = src.uvarint()?;
    if size > cfg.max_batch_size {
        return Err(TraceError::broken(format!(
            "invalid batch size {size}, maximum is {}",
            cfg.max_batch_size
        )));
    }

    let offset = src.offset();
    let data = src.exact(size)?;
    Ok((
        Batch {
            m: ThreadId::from_wire(m),
            time: Timestamp(ts),
            data: Bytes::from(data),
            offset,
        },
        gen,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn source(data: &[u8]) -> ByteSource<&[u8]> {
        ByteSource::new(data)
    }

    #[test]
    fn test_read_batch() {
        let data = [go122::EVENT_BATCH.0, 3, 0x7f, 10, 2, go122::GO_DESTROY.0, 1];
        let mut src = source(&data);
        let (batch, gen) = read_batch(&mut src, &ReaderConfig::default()).unwrap();
        assert_eq!(gen, 3);
        assert_eq!(batch.m, ThreadId(127));
        assert_eq!(batch.time, Timestamp(10));
        assert_eq!(&batch.data[..], &[go122::GO_DESTROY.0, 1]);
        assert_eq!(batch.offset, 5);

        assert_matches!(
            read_batch(&mut src, &ReaderConfig::default()),
            Err(TraceError::EndOfStream)
        );
    }

    #[test]
    fn test_no_thread() {
        let mut data = vec![go122::EVENT_BATCH.0, 1];
        data.extend_from_slice(&[0xff; 9]);
        data.extend_from_slice(&[0x01, 0, 1, go122::FREQUENCY.0]);
        let (batch, _) = read_batch(&mut source(&data), &ReaderConfig::default()).unwrap();
        assert_eq!(batch.m, ThreadId::NONE);
        assert!(batch.is_freq_batch());
    }

    #[test]
    fn test_rejects_non_batch() {
        assert_matches!(
            read_batch(&mut source(&[go122::GO_DESTROY.0, 1]), &ReaderConfig::default()),
            Err(TraceError::Broken(_))
        );
    }

    #[test]
    fn test_size_limit() {
        let cfg = ReaderConfig {
            max_batch_size: 4,
            ..ReaderConfig::default()
        };
        let data = [go122::EVENT_BATCH.0, 1, 0, 0, 5, 0, 0, 0, 0, 0];
        assert_matches!(read_batch(&mut source(&data), &cfg), Err(TraceError::Broken(_)));
    }

    #[test]
    fn test_truncated_payload() {
        let data = [go122::EVENT_BATCH.0, 1, 0, 0, 5, 0];
        assert_matches!(
            read_batch(&mut source(&data), &ReaderConfig::default()),
            Err(TraceError::TruncatedStream { offset: 6 })
        );
    }
}
