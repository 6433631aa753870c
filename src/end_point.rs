use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};
use crate::config::TransportConfig;
use crate::message_dispatcher::MessageDispatcher;
use crate::message_id::{MessageId, MessageKey};
use crate::reassembler::{ReceiveStatus, SegmentReassembler};
use crate::segment_header::SegmentHeader;
use crate::send_pipeline::{SendPipeline, SendSocket};
use crate::tx_job::{SegmentProtection, TxJob, TxJobError, TxJobStats};

/// Receive side state for one (peer, message id)
struct InboundMessage {
    ack_mode: bool,
    reassembler: SegmentReassembler,
    /// Set when the message was handed to the application. The record is kept around for a
    ///  while after that to re-acknowledge retransmissions, and its buffer is gone.
    completed_at: Option<Instant>,
    /// arrival of the most recent segment, for discarding messages that never complete
    last_activity: Instant,
}

/// What to do after a segment was fed into its reassembly, once the table lock is released
struct Accepted {
    ack_mode: bool,
    completed_message: Option<Vec<u8>>,
}

/// EndPoint ties sending and receiving together: it runs outbound [TxJob]s, routes incoming
///  acks to them, and reassembles incoming messages, handing them to the application's
///  [MessageDispatcher] when they are complete.
pub struct EndPoint {
    config: Arc<TransportConfig>,
    send_pipeline: Arc<SendPipeline>,
    message_dispatcher: Arc<dyn MessageDispatcher>,
    tx_jobs: Mutex<FxHashMap<MessageKey, Arc<TxJob>>>,
    inbound: Mutex<FxHashMap<MessageKey, InboundMessage>>,
}

impl EndPoint {
    pub fn new(
        config: Arc<TransportConfig>,
        send_socket: Arc<dyn SendSocket>,
        message_dispatcher: Arc<dyn MessageDispatcher>,
    ) -> anyhow::Result<EndPoint> {
        config.validate()?;

        Ok(EndPoint {
            send_pipeline: Arc::new(SendPipeline::new(send_socket, config.payload_size_inside_udp)),
            config,
            message_dispatcher,
            tx_jobs: Default::default(),
            inbound: Default::default(),
        })
    }

    /// Convenience for the common case of sending and receiving through the same UDP socket.
    ///  The caller is responsible for spawning [EndPoint::recv_loop] with the returned socket.
    pub async fn bind(
        self_addr: SocketAddr,
        config: Arc<TransportConfig>,
        message_dispatcher: Arc<dyn MessageDispatcher>,
    ) -> anyhow::Result<(EndPoint, Arc<UdpSocket>)> {
        let socket = Arc::new(UdpSocket::bind(self_addr).await?);
        info!("bound socket to {:?}", socket.local_addr()?);

        let end_point = EndPoint::new(config, Arc::new(socket.clone()), message_dispatcher)?;
        Ok((end_point, socket))
    }

    /// Send a message, returning when it was sent completely, and - in acknowledged mode - all
    ///  of its segments were acknowledged.
    ///
    /// Message ids are chosen by the application. Reusing an id for the same peer while the
    ///  previous message is still in flight (or while the peer may still have it in its
    ///  retention period) is not supported. NB: This is not detected reliably - if the new
    ///  message has the same size as the old one, the peer re-acknowledges its segments as
    ///  retransmissions of the delivered message, so this returns `Ok` while the new message
    ///  is silently dropped.
    pub async fn send_message(&self, to: SocketAddr, message_id: MessageId, payload: Bytes, ack_mode: bool) -> Result<TxJobStats, TxJobError> {
        let key = (to, message_id);
        let job = Arc::new(TxJob::new(
            self.config.clone(),
            self.send_pipeline.clone(),
            to,
            message_id,
            payload,
            ack_mode,
            SegmentProtection::default(),
        ));

        if self.tx_jobs.lock().await.insert(key, job.clone()).is_some() {
            warn!("message {} to {:?}: replacing a job that is still running - acks will be routed to the new job", message_id, to);
        }

        let result = job.run().await;

        let mut tx_jobs = self.tx_jobs.lock().await;
        if tx_jobs.get(&key).is_some_and(|registered| Arc::ptr_eq(registered, &job)) {
            tx_jobs.remove(&key);
        }
        result
    }

    /// number of outbound messages currently in flight
    pub async fn num_running_jobs(&self) -> usize {
        self.tx_jobs.lock().await.len()
    }

    pub async fn recv_loop(&self, socket: Arc<UdpSocket>) {
        info!("starting receive loop");

        let mut buf = vec![0u8; self.config.payload_size_inside_udp];
        loop {
            let (num_read, from) = match socket.recv_from(&mut buf).await {
                Ok(x) => x,
                Err(e) => {
                    error!("socket error: {}", e);
                    continue;
                }
            };

            let span = span!(Level::TRACE, "packet_received", ?from);
            self.on_packet(from, &buf[..num_read]).instrument(span).await;
        }
    }

    /// Handle a single packet received from the network
    pub async fn on_packet(&self, from: SocketAddr, packet: &[u8]) {
        let mut parse_buf = packet;
        let header = match SegmentHeader::deser(&mut parse_buf) {
            Ok(header) => header,
            Err(e) => {
                warn!("received packet with unparsable header from {:?}: {} - dropping", from, e);
                return;
            }
        };
        trace!("received {:?} with {} payload bytes from {:?}", header, parse_buf.len(), from);

        match header {
            SegmentHeader::Ack { message_id, offset } => self.on_ack(from, message_id, offset).await,
            SegmentHeader::InitialData { .. } | SegmentHeader::Data { .. } => self.on_segment(from, &header, parse_buf).await,
        }
    }

    async fn on_ack(&self, from: SocketAddr, message_id: MessageId, offset: u32) {
        let job = self.tx_jobs.lock().await
            .get(&(from, message_id))
            .cloned();

        match job {
            Some(job) => {
                job.on_ack(offset).await;
            }
            None => debug!("message {} to {:?}: ack for {} without a running job - ignoring", message_id, from, offset),
        }
    }

    async fn on_segment(&self, from: SocketAddr, header: &SegmentHeader, payload: &[u8]) {
        let message_id = header.message_id();
        let offset = header.offset();

        let accepted = {
            let mut inbound = self.inbound.lock().await;
            self.discard_expired(&mut inbound);
            self.feed_segment(&mut inbound, from, header, payload)
        };

        let Some(accepted) = accepted else {
            return;
        };

        if accepted.ack_mode {
            self.send_pipeline.send_ack(from, message_id, offset).await;
        }
        if let Some(message) = accepted.completed_message {
            debug!("message {} from {:?}: complete with {} bytes - dispatching", message_id, from, message.len());
            self.message_dispatcher.on_message(from, message_id, message).await;
        }
    }

    fn discard_expired(&self, inbound: &mut FxHashMap<MessageKey, InboundMessage>) {
        let now = Instant::now();
        inbound.retain(|(from, message_id), msg| match msg.completed_at {
            Some(completed_at) => now.saturating_duration_since(completed_at) < self.config.completed_retention,
            None => {
                let is_alive = now.saturating_duration_since(msg.last_activity) < self.config.incomplete_timeout;
                if !is_alive {
                    debug!("message {} from {:?}: no segment for {:?} - discarding {} of {} bytes", message_id, from, self.config.incomplete_timeout, msg.reassembler.received_size(), msg.reassembler.size());
                }
                is_alive
            }
        });
    }

    /// Returns `None` if the segment is dropped
    fn feed_segment(&self, inbound: &mut FxHashMap<MessageKey, InboundMessage>, from: SocketAddr, header: &SegmentHeader, payload: &[u8]) -> Option<Accepted> {
        let message_id = header.message_id();
        let offset = header.offset();

        let msg = match *header {
            SegmentHeader::InitialData { total_len, ack_mode, .. } => {
                if total_len > self.config.max_message_size {
                    warn!("message {} from {:?}: announced size {} exceeds the maximum of {} - dropping", message_id, from, total_len, self.config.max_message_size);
                    return None;
                }
                let total_len = total_len as usize;

                match inbound.entry((from, message_id)) {
                    Entry::Occupied(e) => {
                        let msg = e.into_mut();
                        if msg.reassembler.size() != total_len || msg.ack_mode != ack_mode {
                            debug!("message {} from {:?}: initial segment announces a different message - starting over", message_id, from);
                            Self::init_inbound(msg, total_len, ack_mode);
                        }
                        msg
                    }
                    Entry::Vacant(e) => {
                        debug!("message {} from {:?}: starting reassembly of {} bytes", message_id, from, total_len);
                        let mut msg = InboundMessage {
                            ack_mode,
                            reassembler: SegmentReassembler::default(),
                            completed_at: None,
                            last_activity: Instant::now(),
                        };
                        Self::init_inbound(&mut msg, total_len, ack_mode);
                        e.insert(msg)
                    }
                }
            }
            _ => match inbound.get_mut(&(from, message_id)) {
                Some(msg) => msg,
                None => {
                    debug!("message {} from {:?}: segment at {} for a message without initial segment - dropping", message_id, from, offset);
                    return None;
                }
            }
        };

        if msg.completed_at.is_some() {
            if !msg.reassembler.is_known_segment(offset, payload.len()) {
                warn!("message {} from {:?}: segment {}+{} does not match the message that was dispatched already - dropping", message_id, from, offset, payload.len());
                return None;
            }
            trace!("message {} from {:?}: retransmission of segment at {} for a message that was dispatched already", message_id, from, offset);
            return Some(Accepted { ack_mode: msg.ack_mode, completed_message: None });
        }

        msg.last_activity = Instant::now();

        match msg.reassembler.receive(payload, offset) {
            Ok(ReceiveStatus::Incomplete) => Some(Accepted { ack_mode: msg.ack_mode, completed_message: None }),
            Ok(ReceiveStatus::Complete) => {
                msg.completed_at = Some(Instant::now());
                Some(Accepted { ack_mode: msg.ack_mode, completed_message: msg.reassembler.claim() })
            }
            Err(e) => {
                warn!("message {} from {:?}: rejected segment at {} - {}", message_id, from, offset, e);
                None
            }
        }
    }

    fn init_inbound(msg: &mut InboundMessage, total_len: usize, ack_mode: bool) {
        msg.ack_mode = ack_mode;
        msg.completed_at = None;
        msg.reassembler.init(total_len);
    }
}
