use crate::message_id::MessageId;
use bitflags::bitflags;
use bytes::{Buf, BufMut};
use std::fmt::Debug;

bitflags! {
    #[derive(PartialEq, Eq, Copy, Clone)]
    struct Flags: u8 {
        const MASK_KIND = 0b0000_0011;

        const KIND_INITIAL_DATA = 0b0000_0000;
        const KIND_DATA         = 0b0000_0001;
        const KIND_ACK          = 0b0000_0010;

        const ACK_MODE = 0b0000_0100;
    }
}

/// Header in front of every segment on the wire - all numbers in network byte order (BE):
///
/// ```ascii
/// 0: flags (u8)
///    * bit 0-1: kind of segment
///      * 00 initial data (the segment at offset 0, which announces the message)
///      * 01 data (continuation at some offset)
///      * 10 ack
///    * bit 2: acknowledged mode, set for initial data only
///    * bit 3-7: unused, should be 0
/// 1: message id (u16)
///
/// initial data:
/// 3: total message length (u32)
/// 7: integrity protection algorithm (u8) - opaque, not interpreted by this protocol
/// 8: cipher algorithm (u8) - opaque, not interpreted by this protocol
///
/// data and ack:
/// 3: offset of the segment in the message (u32)
/// ```
///
/// The segment's payload follows immediately after the header. Ack headers have no payload.
#[derive(Clone, Eq, PartialEq)]
pub enum SegmentHeader {
    InitialData {
        message_id: MessageId,
        total_len: u32,
        ack_mode: bool,
        int_prot_alg: u8,
        cipher_alg: u8,
    },
    Data {
        message_id: MessageId,
        offset: u32,
    },
    Ack {
        message_id: MessageId,
        offset: u32,
    },
}

impl Debug for SegmentHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentHeader::InitialData { message_id, total_len, ack_mode, .. } => {
                write!(f, "INIT({}:{}{})", message_id, total_len, if *ack_mode { "" } else { "-unacked" })
            }
            SegmentHeader::Data { message_id, offset } => write!(f, "DATA({}@{})", message_id, offset),
            SegmentHeader::Ack { message_id, offset } => write!(f, "ACK({}@{})", message_id, offset),
        }
    }
}

impl SegmentHeader {
    pub const MAX_SERIALIZED_LEN: usize = 9;

    pub fn message_id(&self) -> MessageId {
        match self {
            SegmentHeader::InitialData { message_id, .. } => *message_id,
            SegmentHeader::Data { message_id, .. } => *message_id,
            SegmentHeader::Ack { message_id, .. } => *message_id,
        }
    }

    /// offset in the message of the segment that follows this header, or that is acknowledged
    pub fn offset(&self) -> u32 {
        match self {
            SegmentHeader::InitialData { .. } => 0,
            SegmentHeader::Data { offset, .. } => *offset,
            SegmentHeader::Ack { offset, .. } => *offset,
        }
    }

    pub fn serialized_len(&self) -> usize {
        let kind_specific = match self {
            SegmentHeader::InitialData { .. } =>
                size_of::<u32>()     // total length
                + size_of::<u8>()    // integrity protection
                + size_of::<u8>(),   // cipher
            SegmentHeader::Data { .. } | SegmentHeader::Ack { .. } =>
                size_of::<u32>(),    // offset
        };

        size_of::<u8>()        // flags
            + size_of::<u16>() // message id
            + kind_specific
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        let flags = match self {
            SegmentHeader::InitialData { ack_mode: true, .. } => Flags::KIND_INITIAL_DATA | Flags::ACK_MODE,
            SegmentHeader::InitialData { ack_mode: false, .. } => Flags::KIND_INITIAL_DATA,
            SegmentHeader::Data { .. } => Flags::KIND_DATA,
            SegmentHeader::Ack { .. } => Flags::KIND_ACK,
        };
        buf.put_u8(flags.bits());
        buf.put_u16(self.message_id().to_raw());

        match self {
            SegmentHeader::InitialData { total_len, int_prot_alg, cipher_alg, .. } => {
                buf.put_u32(*total_len);
                buf.put_u8(*int_prot_alg);
                buf.put_u8(*cipher_alg);
            }
            SegmentHeader::Data { offset, .. } | SegmentHeader::Ack { offset, .. } => {
                buf.put_u32(*offset);
            }
        }
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<SegmentHeader> {
        let flags = Flags::from_bits_truncate(buf.try_get_u8()?);
        let message_id = MessageId::from_raw(buf.try_get_u16()?);

        let header = match flags & Flags::MASK_KIND {
            Flags::KIND_INITIAL_DATA => SegmentHeader::InitialData {
                message_id,
                total_len: buf.try_get_u32()?,
                ack_mode: flags.contains(Flags::ACK_MODE),
                int_prot_alg: buf.try_get_u8()?,
                cipher_alg: buf.try_get_u8()?,
            },
            Flags::KIND_DATA => SegmentHeader::Data { message_id, offset: buf.try_get_u32()? },
            Flags::KIND_ACK => SegmentHeader::Ack { message_id, offset: buf.try_get_u32()? },
            _ => return Err(anyhow::anyhow!("unsupported flags for segment kind: {:x}", flags.bits())),
        };
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use SegmentHeader::*;

    fn id(raw: u16) -> MessageId {
        MessageId::from_raw(raw)
    }

    #[rstest]
    #[case::initial_acked(InitialData { message_id: id(5), total_len: 1000, ack_mode: true, int_prot_alg: 0, cipher_alg: 0 }, vec![4, 0,5, 0,0,3,232, 0, 0])]
    #[case::initial_unacked(InitialData { message_id: id(258), total_len: 7, ack_mode: false, int_prot_alg: 3, cipher_alg: 9 }, vec![0, 1,2, 0,0,0,7, 3, 9])]
    #[case::data(Data { message_id: id(5), offset: 300 }, vec![1, 0,5, 0,0,1,44])]
    #[case::data_max(Data { message_id: id(u16::MAX), offset: u32::MAX }, vec![1, 255,255, 255,255,255,255])]
    #[case::ack_zero(Ack { message_id: id(5), offset: 0 }, vec![2, 0,5, 0,0,0,0])]
    #[case::ack(Ack { message_id: id(1), offset: 900 }, vec![2, 0,1, 0,0,3,132])]
    fn test_ser_deser(#[case] header: SegmentHeader, #[case] expected: Vec<u8>) {
        let mut buf = Vec::new();
        header.ser(&mut buf);
        assert_eq!(buf, expected);
        assert_eq!(buf.len(), header.serialized_len());
        assert!(buf.len() <= SegmentHeader::MAX_SERIALIZED_LEN);

        let mut b: &[u8] = &buf;
        let deser = SegmentHeader::deser(&mut b).unwrap();
        assert!(b.is_empty());
        assert_eq!(deser, header);
    }

    #[test]
    fn test_deser_leaves_payload() {
        let mut buf = Vec::new();
        Data { message_id: id(3), offset: 600 }.ser(&mut buf);
        buf.extend_from_slice(&[9, 8, 7]);

        let mut b: &[u8] = &buf;
        let header = SegmentHeader::deser(&mut b).unwrap();
        assert_eq!(header.offset(), 600);
        assert_eq!(header.message_id(), id(3));
        assert_eq!(b, &[9, 8, 7]);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::no_message_id(vec![1, 0])]
    #[case::truncated_offset(vec![1, 0,5, 0,0,1])]
    #[case::truncated_initial(vec![4, 0,5, 0,0,3,232, 0])]
    #[case::unknown_kind(vec![3, 0,5, 0,0,0,0])]
    fn test_deser_invalid(#[case] buf: Vec<u8>) {
        let mut b: &[u8] = &buf;
        assert!(SegmentHeader::deser(&mut b).is_err());
    }

    #[rstest]
    #[case::initial(InitialData { message_id: id(5), total_len: 1000, ack_mode: true, int_prot_alg: 0, cipher_alg: 0 }, "INIT(5:1000)")]
    #[case::initial_unacked(InitialData { message_id: id(5), total_len: 1000, ack_mode: false, int_prot_alg: 0, cipher_alg: 0 }, "INIT(5:1000-unacked)")]
    #[case::data(Data { message_id: id(2), offset: 300 }, "DATA(2@300)")]
    #[case::ack(Ack { message_id: id(2), offset: 600 }, "ACK(2@600)")]
    fn test_debug(#[case] header: SegmentHeader, #[case] expected: &str) {
        assert_eq!(format!("{:?}", header), expected);
    }
}
