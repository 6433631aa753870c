use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

/// Identifies a message between a pair of peers. Ids are assigned by the sending application,
///  the protocol treats them as opaque.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MessageId(u16);

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MessageId {
    pub fn from_raw(value: u16) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }
}

/// The key for one outbound job or one inbound reassembly: the peer's network address plus
///  the message id
pub type MessageKey = (SocketAddr, MessageId);
