//! Send side of a single message.
//!
//! A [TxJob] splits its message into segments and sends them to the peer. In acknowledged mode,
//!  the first segment is sent on its own, and nothing else is sent until the peer acknowledges
//!  it - that way, a peer is not flooded with segments for a message it may reject. After that,
//!  a window of unacknowledged segments is kept in flight, and segments are re-sent if their
//!  acknowledgement does not arrive within the retry timeout.
//!
//! Acknowledgements are delivered by the receive path through [TxJob::on_ack], concurrently to
//!  the job's own [TxJob::run] loop. Both sides share the ledger of outstanding segments, and
//!  an arriving ack wakes the run loop immediately rather than waiting for the next poll.
//!
//! In unacknowledged mode, all segments are sent right away, and nothing is tracked or re-sent.

use std::cmp::min;
use std::net::SocketAddr;
use std::sync::Arc;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};
use crate::config::TransportConfig;
use crate::ledger::OutstandingLedger;
use crate::message_id::MessageId;
use crate::segment_header::SegmentHeader;
use crate::send_pipeline::{FramingError, SendPipeline};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TxJobError {
    #[error("segment at offset {offset} was not acknowledged after {max_retries} re-sends")]
    RetryLimitExceeded { offset: u32, max_retries: u32 },
    #[error("message of {len} bytes is too long to be addressed by 32 bit offsets")]
    MessageTooLong { len: usize },
    #[error(transparent)]
    Framing(#[from] FramingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// the acknowledged segment was outstanding and is now removed from the ledger
    Accepted,
    /// no segment is outstanding at the acknowledged offset: it was never sent, or it was
    ///  acknowledged before
    Unknown,
}

/// Lifecycle of a [TxJob], derived from its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxJobState {
    Unsent,
    /// In acknowledged mode, nothing is sent beyond the first segment until it is acknowledged.
    ///  A job that stays here is stalled on an unresponsive peer.
    FirstSentUnacked,
    WindowedSending,
    /// everything is sent, waiting for outstanding acknowledgements
    DrainingAcks,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxJobStats {
    /// number of distinct segments sent, not counting re-sends
    pub segments_sent: u64,
    pub retransmissions: u64,
    pub unknown_acks: u64,
}

/// Algorithm identifiers announced in a message's initial segment. They are passed through
///  to the peer, but never interpreted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentProtection {
    pub int_prot_alg: u8,
    pub cipher_alg: u8,
}

struct TxJobInner {
    first_sent: bool,
    first_acked: bool,
    failed: bool,
    /// start of the first segment that was not sent yet
    next_offset: usize,
    ledger: OutstandingLedger,
    stats: TxJobStats,
}

pub struct TxJob {
    config: Arc<TransportConfig>,
    send_pipeline: Arc<SendPipeline>,
    destination: SocketAddr,
    message_id: MessageId,
    payload: Bytes,
    ack_mode: bool,
    protection: SegmentProtection,

    inner: Mutex<TxJobInner>,
    ack_notify: Notify,
}

impl TxJob {
    pub fn new(
        config: Arc<TransportConfig>,
        send_pipeline: Arc<SendPipeline>,
        destination: SocketAddr,
        message_id: MessageId,
        payload: Bytes,
        ack_mode: bool,
        protection: SegmentProtection,
    ) -> TxJob {
        TxJob {
            config,
            send_pipeline,
            destination,
            message_id,
            payload,
            ack_mode,
            protection,
            inner: Mutex::new(TxJobInner {
                first_sent: false,
                first_acked: false,
                failed: false,
                next_offset: 0,
                ledger: OutstandingLedger::default(),
                stats: TxJobStats::default(),
            }),
            ack_notify: Notify::new(),
        }
    }

    /// Called by the receive path when the peer acknowledges the segment at `offset`.
    pub async fn on_ack(&self, offset: u32) -> AckOutcome {
        let mut inner = self.inner.lock().await;

        if offset == 0 && !inner.first_acked {
            debug!("message {} to {:?}: first segment acknowledged", self.message_id, self.destination);
            inner.first_acked = true;
        }

        match inner.ledger.acknowledge(offset) {
            Some(entry) => {
                trace!("message {} to {:?}: ack for segment {}+{}", self.message_id, self.destination, offset, entry.segment_size);
                drop(inner);
                self.ack_notify.notify_one();
                AckOutcome::Accepted
            }
            None => {
                debug!("message {} to {:?}: ack for offset {} which is not outstanding - ignoring", self.message_id, self.destination, offset);
                inner.stats.unknown_acks += 1;
                AckOutcome::Unknown
            }
        }
    }

    /// true while there are unsent bytes or unacknowledged segments
    pub async fn has_pending_work(&self) -> bool {
        let inner = self.inner.lock().await;
        !inner.ledger.is_empty() || inner.next_offset < self.payload.len()
    }

    pub async fn state(&self) -> TxJobState {
        let inner = self.inner.lock().await;
        if inner.failed {
            TxJobState::Failed
        }
        else if !inner.first_sent {
            TxJobState::Unsent
        }
        else if self.ack_mode && !inner.first_acked {
            TxJobState::FirstSentUnacked
        }
        else if inner.next_offset < self.payload.len() {
            TxJobState::WindowedSending
        }
        else if !inner.ledger.is_empty() {
            TxJobState::DrainingAcks
        }
        else {
            TxJobState::Done
        }
    }

    pub async fn stats(&self) -> TxJobStats {
        self.inner.lock().await.stats
    }

    /// offsets of all segments that are sent but not acknowledged
    pub async fn outstanding_segments(&self) -> Vec<u32> {
        self.inner.lock().await.ledger.offsets().collect()
    }

    /// Sends the message, returning when all segments are sent and - in acknowledged mode -
    ///  acknowledged. This is intended to run as a task of its own.
    pub async fn run(&self) -> Result<TxJobStats, TxJobError> {
        debug!("message {} to {:?}: sending {} bytes (acknowledged mode: {})", self.message_id, self.destination, self.payload.len(), self.ack_mode);

        match self.do_run().await {
            Ok(()) => {
                let stats = self.stats().await;
                debug!("message {} to {:?}: done - {:?}", self.message_id, self.destination, stats);
                Ok(stats)
            }
            Err(e) => {
                warn!("message {} to {:?}: giving up - {}", self.message_id, self.destination, e);
                self.inner.lock().await.failed = true;
                Err(e)
            }
        }
    }

    async fn do_run(&self) -> Result<(), TxJobError> {
        if self.payload.len() > u32::MAX as usize {
            return Err(TxJobError::MessageTooLong { len: self.payload.len() });
        }

        self.send_first().await?;
        while self.has_pending_work().await {
            self.scheduled_send().await?;
            self.scheduled_resend().await?;
        }
        Ok(())
    }

    /// Advances the send cursor by one segment, registering the segment as outstanding in
    ///  acknowledged mode. The segment is expected to be actually sent by the caller.
    fn claim_next_segment(&self, inner: &mut TxJobInner) -> (u32, u32) {
        let offset = inner.next_offset;
        let segment_size = min(self.config.segment_size, self.payload.len() - offset);
        inner.next_offset += segment_size;
        inner.stats.segments_sent += 1;

        // NB: do_run() verified that all offsets fit into u32
        let (offset, segment_size) = (offset as u32, segment_size as u32);
        if self.ack_mode {
            inner.ledger.insert(offset, segment_size, Instant::now());
        }
        (offset, segment_size)
    }

    fn header_for(&self, offset: u32) -> SegmentHeader {
        if offset == 0 {
            // the initial header announces the message, so it is used for re-sends of the first
            //  segment as well
            SegmentHeader::InitialData {
                message_id: self.message_id,
                total_len: self.payload.len() as u32,
                ack_mode: self.ack_mode,
                int_prot_alg: self.protection.int_prot_alg,
                cipher_alg: self.protection.cipher_alg,
            }
        }
        else {
            SegmentHeader::Data {
                message_id: self.message_id,
                offset,
            }
        }
    }

    async fn send_segment(&self, offset: u32, segment_size: u32) -> Result<(), FramingError> {
        let start = offset as usize;
        let payload = &self.payload[start..start + segment_size as usize];
        self.send_pipeline.send_segment(self.destination, &self.header_for(offset), payload).await
    }

    async fn send_first(&self) -> Result<(), TxJobError> {
        let (offset, segment_size) = {
            let mut inner = self.inner.lock().await;
            inner.first_sent = true;
            self.claim_next_segment(&mut inner)
        };
        self.send_segment(offset, segment_size).await?;
        Ok(())
    }

    /// Top up the window of outstanding segments. This does nothing in acknowledged mode until
    ///  the first segment is acknowledged.
    async fn scheduled_send(&self) -> Result<(), TxJobError> {
        let segments = {
            let mut inner = self.inner.lock().await;
            if self.ack_mode && !inner.first_acked {
                return Ok(());
            }

            let num_to_send = if self.ack_mode {
                self.config.send_window_size.saturating_sub(inner.ledger.len())
            }
            else {
                usize::MAX
            };

            let mut segments = Vec::new();
            while segments.len() < num_to_send && inner.next_offset < self.payload.len() {
                segments.push(self.claim_next_segment(&mut inner));
            }
            segments
        };

        for (offset, segment_size) in segments {
            self.send_segment(offset, segment_size).await?;
        }
        Ok(())
    }

    /// Wait for an acknowledgement to arrive - for one poll interval at most - and re-send
    ///  all segments whose acknowledgement timed out.
    async fn scheduled_resend(&self) -> Result<(), TxJobError> {
        if !self.ack_mode {
            return Ok(());
        }

        // NB: waking up without an ack is expected, timeouts need to be checked regardless
        let _ = timeout(self.config.ack_poll_interval, self.ack_notify.notified()).await;

        let expired = {
            let mut inner = self.inner.lock().await;
            let expired = inner.ledger.take_expired(Instant::now(), self.config.retry_timeout);

            if let Some(max_retries) = self.config.max_retries {
                if let Some(exhausted) = expired.iter().find(|s| s.retries > max_retries) {
                    return Err(TxJobError::RetryLimitExceeded { offset: exhausted.offset, max_retries });
                }
            }

            inner.stats.retransmissions += expired.len() as u64;
            expired
        };

        for segment in expired {
            debug!("message {} to {:?}: no ack for segment {}+{} - re-sending (#{})", self.message_id, self.destination, segment.offset, segment.segment_size, segment.retries);
            self.send_segment(segment.offset, segment.segment_size).await?;
        }
        Ok(())
    }
}
