use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use std::net::SocketAddr;
use crate::message_id::MessageId;

/// Application callback for inbound messages. It is called exactly once per completely
///  reassembled message, after the message's last segment was accepted (and acknowledged,
///  if the message was sent in acknowledged mode).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageDispatcher: Send + Sync + 'static {
    async fn on_message(&self, sender: SocketAddr, message_id: MessageId, message: Vec<u8>);
}
