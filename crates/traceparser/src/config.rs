use serde::{Deserialize, Serialize};

/// Limits enforced while reading generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Longest string table entry, in bytes.
    pub max_string_size: u64,
    /// Most frames in one stack table entry.
    pub max_stack_frames: u64,
    /// Largest batch payload, in bytes.
    pub max_batch_size: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_string_size: 1 << 10,
            max_stack_frames: 128,
            max_batch_size: 64 << 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let cfg: ReaderConfig = serde_json::from_str(r#"{"max_stack_frames": 16}"#).unwrap();
        assert_eq!(cfg.max_stack_frames, 16);
        assert_eq!(cfg.max_string_size, 1024);
        assert_eq!(cfg.max_batch_size, 65536);
    }

    #[test]
    fn test_empty_config() {
        let cfg: ReaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ReaderConfig::default());
    }
}
