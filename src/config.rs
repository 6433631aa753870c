use std::time::Duration;
use anyhow::bail;
use crate::segment_header::SegmentHeader;

pub struct TransportConfig {
    /// This is the payload size inside UDP packets that is assumed for framing. Every segment
    ///  is framed into a scratch buffer of this size, so header plus segment payload must fit.
    ///
    /// With full Ethernet frames and no optional IP headers, this payload is `1500 - 20 - 8 = 1472`
    ///  for IPV4 and `1500 - 40 - 8 = 1452` for IPV6.
    pub payload_size_inside_udp: usize,

    /// Number of message bytes per segment. The last segment of a message carries whatever
    ///  is left and may be shorter.
    pub segment_size: usize,

    /// This is the maximum number of *segments* (not bytes) that are sent but unacknowledged
    ///  at any given time
    pub send_window_size: usize,

    /// An unacknowledged segment is sent again once it is older than this
    pub retry_timeout: Duration,
    /// Upper bound for waiting on an acknowledgement before timeouts are re-checked
    pub ack_poll_interval: Duration,
    /// A job fails if a single segment needs more re-sends than this. `None` means the job
    ///  retries forever.
    pub max_retries: Option<u32>,

    /// Receive side: initial segments announcing longer messages are dropped rather than
    ///  allocating a buffer for them
    pub max_message_size: u32,
    /// Receive side: how long the record of a delivered message is kept around to re-ack
    ///  late retransmissions
    pub completed_retention: Duration,
    /// Receive side: a message that stays incomplete without receiving a segment for this long
    ///  is discarded together with its buffer. This should exceed the time a sender keeps
    ///  retrying, i.e. `retry_timeout * max_retries`.
    pub incomplete_timeout: Duration,
}

impl TransportConfig {
    pub fn default_ipv4() -> TransportConfig {
        TransportConfig {
            payload_size_inside_udp: 1472,
            segment_size: 300, //TODO derive from channel quality
            send_window_size: 10,
            retry_timeout: Duration::from_millis(500),
            ack_poll_interval: Duration::from_millis(1),
            max_retries: Some(40),
            max_message_size: 16*1024*1024,
            completed_retention: Duration::from_secs(5),
            incomplete_timeout: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.segment_size == 0 {
            bail!("segment size must not be zero");
        }
        if self.segment_size + SegmentHeader::MAX_SERIALIZED_LEN > self.payload_size_inside_udp {
            bail!("segment size {} plus header does not fit into a UDP payload of {} bytes", self.segment_size, self.payload_size_inside_udp);
        }
        if self.segment_size > u32::MAX as usize {
            bail!("segment size exceeds the offset range");
        }
        if self.send_window_size == 0 {
            bail!("send window size must not be zero");
        }
        if self.retry_timeout.is_zero() {
            bail!("retry timeout must not be zero");
        }
        if self.ack_poll_interval.is_zero() {
            bail!("ack poll interval must not be zero");
        }
        if self.incomplete_timeout.is_zero() {
            bail!("incomplete timeout must not be zero");
        }

        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::default_ipv4()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TransportConfig::default_ipv4().validate().is_ok());
    }

    #[rstest]
    #[case::zero_segment(0, 1472, 10, 500, 1, false)]
    #[case::segment_fills_payload(1463, 1472, 10, 500, 1, true)]
    #[case::segment_too_big(1464, 1472, 10, 500, 1, false)]
    #[case::zero_window(300, 1472, 0, 500, 1, false)]
    #[case::zero_timeout(300, 1472, 10, 0, 1, false)]
    #[case::zero_poll_interval(300, 1472, 10, 500, 0, false)]
    #[case::small(1, 10, 1, 1, 1, true)]
    fn test_validate(
        #[case] segment_size: usize,
        #[case] payload_size_inside_udp: usize,
        #[case] send_window_size: usize,
        #[case] retry_timeout_millis: u64,
        #[case] ack_poll_interval_millis: u64,
        #[case] expected_valid: bool,
    ) {
        let config = TransportConfig {
            segment_size,
            payload_size_inside_udp,
            send_window_size,
            retry_timeout: Duration::from_millis(retry_timeout_millis),
            ack_poll_interval: Duration::from_millis(ack_poll_interval_millis),
            ..TransportConfig::default_ipv4()
        };
        assert_eq!(config.validate().is_ok(), expected_valid);
    }

    #[test]
    fn test_validate_zero_incomplete_timeout() {
        let config = TransportConfig {
            incomplete_timeout: Duration::ZERO,
            ..TransportConfig::default_ipv4()
        };
        assert!(config.validate().is_err());
    }
}
