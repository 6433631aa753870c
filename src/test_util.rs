use std::net::SocketAddr;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use crate::message_dispatcher::MessageDispatcher;
use crate::message_id::MessageId;
use crate::segment_header::SegmentHeader;
use crate::send_pipeline::SendSocket;

/// A [SendSocket] that hands every packet to a channel instead of the network, for tests that
///  need to look at (or act on) the traffic rather than just verify it
pub struct ChannelSendSocket {
    sender: UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl ChannelSendSocket {
    pub fn new() -> (ChannelSendSocket, UnboundedReceiver<(SocketAddr, Vec<u8>)>) {
        let (sender, receiver) = unbounded_channel();
        (ChannelSendSocket { sender }, receiver)
    }
}

#[async_trait]
impl SendSocket for ChannelSendSocket {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) {
        // the receiving side going away is fine for tests that are done looking
        let _ = self.sender.send((to, packet_buf.to_vec()));
    }
}

/// a parsed packet as captured by a [ChannelSendSocket]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSegment {
    pub to: SocketAddr,
    pub header: SegmentHeader,
    pub payload: Vec<u8>,
}

impl SentSegment {
    pub fn parse(to: SocketAddr, packet: &[u8]) -> SentSegment {
        let mut parse_buf = packet;
        let header = SegmentHeader::deser(&mut parse_buf).unwrap();
        SentSegment {
            to,
            header,
            payload: parse_buf.to_vec(),
        }
    }
}

/// wait for the next packet sent through a [ChannelSendSocket]
pub async fn next_segment(receiver: &mut UnboundedReceiver<(SocketAddr, Vec<u8>)>) -> SentSegment {
    let (to, packet) = receiver.recv().await.unwrap();
    SentSegment::parse(to, &packet)
}

/// serialize a header with its payload, i.e. create a packet as it arrives from the network
pub fn packet(header: SegmentHeader, payload: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    header.ser(&mut result);
    result.extend_from_slice(payload);
    result
}

/// A [MessageDispatcher] forwarding all messages to a channel
pub struct ChannelDispatcher {
    sender: UnboundedSender<(SocketAddr, MessageId, Vec<u8>)>,
}

impl ChannelDispatcher {
    pub fn new() -> (Arc<ChannelDispatcher>, UnboundedReceiver<(SocketAddr, MessageId, Vec<u8>)>) {
        let (sender, receiver) = unbounded_channel();
        (Arc::new(ChannelDispatcher { sender }), receiver)
    }
}

#[async_trait]
impl MessageDispatcher for ChannelDispatcher {
    async fn on_message(&self, sender: SocketAddr, message_id: MessageId, message: Vec<u8>) {
        let _ = self.sender.send((sender, message_id, message));
    }
}
