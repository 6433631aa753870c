//! Receive side of a single message: segments arrive in any order, possibly duplicated, and
//!  are copied into a buffer of the size announced by the message's initial segment.

use thiserror::Error;
use tracing::trace;
use crate::interval_store::{IntervalStore, Placement};

/// Result of successfully feeding a segment into a [SegmentReassembler]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// The message still has missing byte ranges
    Incomplete,
    /// All bytes of the message were received
    Complete,
}

/// Rejections of a single segment. None of them changes the reassembler's state, so it is up
///  to the caller whether to just drop the segment or give up on the message / peer.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ReceiveError {
    #[error("segment {offset}+{len} exceeds the message size of {total_size}")]
    OutOfBounds { offset: u32, len: usize, total_size: usize },
    #[error("retransmitted segment at {offset} has length {len}, previously received with length {expected_len}")]
    RetransmitSizeMismatch { offset: u32, len: usize, expected_len: usize },
    #[error("retransmitted segment at {offset} has different content than previously received")]
    RetransmitDataMismatch { offset: u32 },
    #[error("segment {offset}+{len} overlaps previously received data")]
    Overlapped { offset: u32, len: usize },
    #[error("no message buffer: reassembler is not initialized or the message was claimed")]
    NotInitialized,
}

#[derive(Default)]
pub struct SegmentReassembler {
    buffer: Option<Vec<u8>>,
    total_size: usize,
    blocks: IntervalStore,
}

impl SegmentReassembler {
    /// Start a new message of the given size, discarding whatever was there before
    pub fn init(&mut self, size: usize) {
        if self.buffer.is_some() && !self.blocks.is_empty() {
            trace!("re-initializing reassembler, discarding {} of {} received bytes", self.blocks.covered_bytes(), self.total_size);
        }

        self.buffer = Some(vec![0; size]);
        self.total_size = size;
        self.blocks.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn receive(&mut self, data: &[u8], offset: u32) -> Result<ReceiveStatus, ReceiveError> {
        let buffer = match &mut self.buffer {
            Some(buffer) => buffer,
            None => return Err(ReceiveError::NotInitialized),
        };

        let start = offset as usize;
        let end = match start.checked_add(data.len()) {
            Some(end) if end <= self.total_size => end,
            _ => return Err(ReceiveError::OutOfBounds { offset, len: data.len(), total_size: self.total_size }),
        };

        // NB: fits into u32 because offset + len <= total size, and total size is bounded by the u32 length field
        let len = data.len() as u32;
        match self.blocks.classify(offset, len) {
            Placement::Exact { len: expected_len } => {
                if expected_len != len {
                    return Err(ReceiveError::RetransmitSizeMismatch { offset, len: data.len(), expected_len: expected_len as usize });
                }
                if &buffer[start..end] != data {
                    return Err(ReceiveError::RetransmitDataMismatch { offset });
                }
                trace!("received identical retransmission of segment {}+{}", offset, len);
            }
            Placement::Overlapping => {
                return Err(ReceiveError::Overlapped { offset, len: data.len() });
            }
            // empty segments carry no data, and they are not recorded as blocks
            Placement::Free if data.is_empty() => {}
            Placement::Free => {
                buffer[start..end].copy_from_slice(data);
                self.blocks.insert(offset, len);
            }
        }

        Ok(self.status())
    }

    fn status(&self) -> ReceiveStatus {
        if self.is_complete() {
            ReceiveStatus::Complete
        }
        else {
            ReceiveStatus::Incomplete
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received_size() == self.total_size
    }

    /// Take ownership of the message buffer - complete or not. The reassembler has no buffer
    ///  afterwards until it is initialized again.
    pub fn claim(&mut self) -> Option<Vec<u8>> {
        self.buffer.take()
    }

    pub fn peek(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// the message's total size as announced at initialization
    pub fn size(&self) -> usize {
        self.total_size
    }

    /// number of distinct bytes received so far
    pub fn received_size(&self) -> usize {
        self.blocks.covered_bytes() as usize
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// true if exactly this segment was accepted before. This keeps working after
    ///  [SegmentReassembler::claim], for recognizing retransmissions of a delivered message.
    pub fn is_known_segment(&self, offset: u32, len: usize) -> bool {
        if len == 0 {
            // the only empty segment ever sent is the single segment of an empty message
            return offset == 0 && self.total_size == 0;
        }
        u32::try_from(len).is_ok_and(|len| self.blocks.classify(offset, len) == Placement::Exact { len })
    }
}
