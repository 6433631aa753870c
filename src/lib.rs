//! Reliable delivery of messages over UDP, by splitting them into segments that are
//!  acknowledged and re-sent individually.
//!
//! ## Design goals
//!
//! * The abstraction is sending / receiving *messages* (i.e. defined-length chunks of data as
//!   opposed to streams of bytes). Messages are identified by a 16 bit id chosen by the
//!   application, and they are independent of each other: there is no ordering between messages
//! * Big messages are sent without IP-level fragmentation - this protocol takes care of chunking
//!   and re-assembling, based on a configured MTU
//! * Segments may arrive in any order, and they may be duplicated by retransmission. The receiver
//!   accepts identical retransmissions, but it rejects segments that contradict data it has
//!   already received
//! * There is no handshake. The first segment of a message announces its total size, and the
//!   sender waits for this segment to be acknowledged before sending more - a peer that does
//!   not want the message costs a single packet
//! * After that, a fixed-size window of unacknowledged segments is kept in flight, and segments
//!   are re-sent on timeout. There is no congestion control or adaptive timing: segment size,
//!   window size and timeouts are configured values
//! * Messages can optionally be sent *unacknowledged*, i.e. all segments are sent once without
//!   tracking or re-sending them. This is for data that is obsolete by the time a retransmission
//!   would arrive
//! * Integrity protection and encryption are out of scope. The initial segment carries
//!   identifiers for them, but they are opaque to this protocol
//!
//! ## Packet structure
//!
//! Every UDP packet carries a single segment, i.e. a [segment_header::SegmentHeader] followed by
//!  the segment's payload:
//!
//! ```ascii
//! sender                                   receiver
//!   | -- INIT(id: total length) + bytes 0..n -->  |  reassembly of `total length` bytes
//!   | <------------- ACK(id @ 0) ---------------- |
//!   | -- DATA(id @ n) + bytes n..2n ----------->  |
//!   | -- DATA(id @ 2n) + bytes 2n..3n --------->  |  (up to `send_window_size` in flight)
//!   | <------------- ACK(id @ n) ---------------- |
//!   |                  ...                        |
//! ```
//!
//! Acks refer to a segment by its offset in the message.

pub mod buffers;
pub mod config;
pub mod end_point;
pub mod interval_store;
pub mod ledger;
pub mod message_dispatcher;
pub mod message_id;
pub mod reassembler;
pub mod segment_header;
pub mod send_pipeline;
pub mod tx_job;

#[cfg(test)] mod test_util;

#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
