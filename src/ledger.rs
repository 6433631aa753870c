use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub sent_at: Instant,
    pub segment_size: u32,
    /// number of times the segment was re-sent after the initial send
    pub retries: u32,
}

/// A segment whose acknowledgement timed out, and that is due for re-sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredSegment {
    pub offset: u32,
    pub segment_size: u32,
    pub retries: u32,
}

/// The segments of one outbound message that were sent but not acknowledged yet, keyed by
///  their offset in the message.
#[derive(Default, Debug)]
pub struct OutstandingLedger {
    entries: BTreeMap<u32, LedgerEntry>,
}

impl OutstandingLedger {
    pub fn insert(&mut self, offset: u32, segment_size: u32, now: Instant) {
        self.entries.insert(offset, LedgerEntry {
            sent_at: now,
            segment_size,
            retries: 0,
        });
    }

    /// Removes the entry for an acknowledged segment. `None` means there is no such segment
    ///  outstanding, either because it was never sent or because it was acknowledged before.
    pub fn acknowledge(&mut self, offset: u32) -> Option<LedgerEntry> {
        self.entries.remove(&offset)
    }

    /// Collects all entries that were sent more than `timeout` ago. Their entries stay in the
    ///  ledger with the send timestamp moved to `now` and the retry counter incremented, i.e.
    ///  the caller is expected to actually re-send them.
    pub fn take_expired(&mut self, now: Instant, timeout: Duration) -> Vec<ExpiredSegment> {
        let mut result = Vec::new();
        for (&offset, entry) in self.entries.iter_mut() {
            if now.saturating_duration_since(entry.sent_at) > timeout {
                entry.sent_at = now;
                entry.retries += 1;
                result.push(ExpiredSegment {
                    offset,
                    segment_size: entry.segment_size,
                    retries: entry.retries,
                });
            }
        }
        result
    }

    #[cfg(test)]
    pub fn get(&self, offset: u32) -> Option<&LedgerEntry> {
        self.entries.get(&offset)
    }

    pub fn offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
