use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use std::net::SocketAddr;
use std::sync::Arc;
use bytes::BufMut;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{error, trace};
use crate::buffers::fixed_buffer::FixedBuf;
use crate::message_id::MessageId;
use crate::segment_header::SegmentHeader;

/// This is an abstraction for sending a buffer on a UDP socket, introduced to facilitate mocking
///  the I/O part away for testing.
///
/// Sending is fire-and-forget: callers do not learn whether a packet actually left the host.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]);
}

#[async_trait]
impl SendSocket for Arc<UdpSocket> {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) {
        trace!("UDP socket: sending packet to {:?}", to);

        if let Err(e) = self.send_to(packet_buf, to).await {
            error!("error sending UDP packet to {:?}: {}", to, e);
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("segment of {payload_len} bytes with a {header_len} byte header does not fit into a packet of {max_packet_len} bytes")]
    PacketTooLarge {
        header_len: usize,
        payload_len: usize,
        max_packet_len: usize,
    },
}

/// Frames segments (header + payload) and hands them to the socket.
///
/// Every call frames into its own scratch buffer sized to the configured UDP payload, which
///  is dropped after the packet was handed to the socket.
#[derive(Clone)]
pub struct SendPipeline {
    socket: Arc<dyn SendSocket>,
    max_packet_len: usize,
}

impl SendPipeline {
    pub fn new(socket: Arc<dyn SendSocket>, max_packet_len: usize) -> SendPipeline {
        SendPipeline { socket, max_packet_len, }
    }

    fn frame(&self, header: &SegmentHeader, payload: &[u8]) -> Result<FixedBuf, FramingError> {
        let mut packet_buf = FixedBuf::new(self.max_packet_len);

        let header_len = header.serialized_len();
        if header_len + payload.len() > packet_buf.remaining_capacity() {
            return Err(FramingError::PacketTooLarge {
                header_len,
                payload_len: payload.len(),
                max_packet_len: self.max_packet_len,
            });
        }

        header.ser(&mut packet_buf);
        packet_buf.put_slice(payload);
        Ok(packet_buf)
    }

    pub async fn send_segment(&self, to: SocketAddr, header: &SegmentHeader, payload: &[u8]) -> Result<(), FramingError> {
        let packet_buf = self.frame(header, payload)?;
        trace!("sending {:?} with {} payload bytes to {:?}", header, payload.len(), to);
        self.socket.do_send_packet(to, packet_buf.as_ref()).await;
        Ok(())
    }

    pub async fn send_ack(&self, to: SocketAddr, message_id: MessageId, offset: u32) {
        let header = SegmentHeader::Ack { message_id, offset };
        // an ack header is far smaller than any valid packet size
        if let Err(e) = self.send_segment(to, &header, &[]).await {
            error!("could not frame {:?} for {:?}: {}", header, to, e);
        }
    }
}
