//! Resource limits for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource limits applied to a single command execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum bytes kept for each of stdout and stderr
    pub max_output_bytes: u64,
    /// Wall-clock timeout
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: 1024 * 1024,    // 1 MB output
            timeout: Duration::from_secs(30), // 30 second wall clock
        }
    }
}

impl ResourceLimits {
    /// Copy of these limits with a different timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Buffer that limits how much data can be kept
///
/// Bytes past the limit are dropped as they arrive. The cut never splits a
/// UTF-8 sequence.
#[derive(Debug, Clone)]
pub(crate) struct LimitedBuffer {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Default for LimitedBuffer {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl LimitedBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub(crate) fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Keep as much of `data` as fits. Always reports the full length as
    /// consumed.
    pub(crate) fn push(&mut self, data: &[u8]) -> usize {
        if self.truncated {
            return data.len();
        }

        let remaining = self.limit.saturating_sub(self.buffer.len());
        if data.len() <= remaining {
            self.buffer.extend_from_slice(data);
        } else {
            let cut = utf8_floor(data, remaining);
            self.buffer.extend_from_slice(&data[..cut]);
            self.truncated = true;
        }
        data.len()
    }

    /// Move everything out of `other` into this buffer.
    pub(crate) fn append(&mut self, other: &mut LimitedBuffer) {
        self.push(&other.buffer);
        self.truncated |= other.truncated;
        other.buffer.clear();
        other.truncated = false;
    }

    /// Take the kept bytes, leaving the buffer empty.
    pub(crate) fn take(&mut self) -> Vec<u8> {
        self.truncated = false;
        std::mem::take(&mut self.buffer)
    }

    pub(crate) fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.buffer).into_owned();
        if self.truncated {
            text.push_str("\n... [output truncated] ...\n");
        }
        text
    }

    #[cfg(test)]
    fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl std::io::Write for LimitedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(self.push(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Largest index `<= at` that does not fall inside a UTF-8 sequence.
fn utf8_floor(data: &[u8], at: usize) -> usize {
    let mut at = at.min(data.len());
    // A sequence is at most 4 bytes, so at most 3 continuation bytes to skip
    for _ in 0..3 {
        if at == 0 || at == data.len() || data[at] & 0xC0 != 0x80 {
            break;
        }
        at -= 1;
    }
    at
}
