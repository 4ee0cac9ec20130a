use crate::icmp::message::{self, IcmpMessage};
use crate::icmp::socket::TSocket;
use crate::records::InFlightPacket;
use crate::statistics::PingStatistics;
use crate::{AddressFamily, PingError, PingEvent, PingOutput, PingResult, Ttl};
use std::sync::Arc;
use std::time::Duration;

/// When the hop limit stops growing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct TtlEscalation {
    pub max_ttl: Ttl,
    pub after_reply: bool,
}

/// Decodes inbound datagrams, matches them against our identifier and drives the hop limit.
pub(crate) struct PacketProcessor<S> {
    socket: Arc<S>,
    family: AddressFamily,
    identifier: u16,
    ttl: Ttl,
    escalation: TtlEscalation,
    target_replied: bool,
}

impl<S> PacketProcessor<S>
where
    S: TSocket + 'static,
{
    pub(crate) fn new(
        socket: Arc<S>,
        family: AddressFamily,
        identifier: u16,
        ttl: Ttl,
        escalation: TtlEscalation,
    ) -> Self {
        PacketProcessor { socket, family, identifier, ttl, escalation, target_replied: false }
    }

    pub(crate) fn current_ttl(&self) -> Ttl {
        self.ttl
    }

    /// Observations made on `packet`, none for traffic that belongs to someone else.
    pub(crate) fn process(
        &mut self,
        packet: &InFlightPacket,
        statistics: &mut PingStatistics,
    ) -> PingResult<Vec<PingEvent>> {
        match message::decode(self.family, &packet.bytes)? {
            IcmpMessage::EchoReply { identifier, sequence_number, payload } => {
                if identifier != self.identifier {
                    tracing::debug!("ignoring echo reply for identifier {}", identifier);
                    return Ok(vec![]);
                }
                let send_time = message::decode_timestamp(&payload)?;
                let ping_duration = packet.received_at.duration_since(send_time).unwrap_or_else(|_| {
                    tracing::warn!("echo reply {} is stamped later than its arrival", sequence_number);
                    Duration::ZERO
                });
                statistics.record_reply(ping_duration);
                self.target_replied = true;
                Ok(vec![PingEvent::Reply(PingOutput {
                    package_size: packet.n_bytes,
                    ip_addr: packet.source,
                    ttl: packet.ttl,
                    sequence_number: sequence_number.into(),
                    ping_duration,
                })])
            }
            IcmpMessage::TimeExceeded { original_identifier } => {
                if original_identifier != self.identifier {
                    tracing::debug!("ignoring time exceeded for identifier {}", original_identifier);
                    return Ok(vec![]);
                }
                let mut events = vec![PingEvent::HopExpired { ttl: self.ttl, hop: packet.source }];
                if let Err(e) = self.escalate() {
                    events.push(PingEvent::TtlNotRaised { ttl: self.ttl, error: e });
                }
                Ok(events)
            }
            IcmpMessage::Other { icmp_type, icmp_code } => Err(PingError::Classification { icmp_type, icmp_code }),
        }
    }

    fn escalate(&mut self) -> PingResult<()> {
        if self.target_replied && !self.escalation.after_reply {
            tracing::debug!("target already replied, keeping ttl {}", self.ttl);
            return Ok(());
        }
        let Some(next_ttl) = self.ttl.next(self.escalation.max_ttl) else {
            tracing::warn!("ttl {} is at its limit, not escalating", self.ttl);
            return Ok(());
        };
        // The hop limit only moves once the socket took it.
        self.socket.set_ttl(next_ttl)?;
        tracing::debug!("ttl raised from {} to {}", self.ttl, next_ttl);
        self.ttl = next_ttl;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::message::tests::{echo_reply, time_exceeded};
    use crate::icmp::message::encode_timestamp;
    use crate::icmp::socket::tests::{OnSend, SocketMock};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::SystemTime;

    const IDENTIFIER: u16 = 0x4242;
    const TARGET: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1));
    const ROUTER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 254));

    fn processor(socket: &SocketMock, ttl: Ttl) -> PacketProcessor<SocketMock> {
        let escalation = TtlEscalation { max_ttl: Ttl::max_value(), after_reply: false };
        PacketProcessor::new(Arc::new(socket.clone()), AddressFamily::V4, IDENTIFIER, ttl, escalation)
    }

    fn packet(bytes: Vec<u8>, source: IpAddr, received_at: SystemTime) -> InFlightPacket {
        InFlightPacket { n_bytes: bytes.len(), bytes, ttl: Some(Ttl(57)), source, received_at }
    }

    #[test]
    fn matching_echo_reply_records_rtt() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(64));
        let mut statistics = PingStatistics::default();
        let arrival = SystemTime::now();
        let send_time = arrival - Duration::from_millis(20);
        let bytes = echo_reply(AddressFamily::V4, IDENTIFIER, 3, &encode_timestamp(send_time));

        let events = processor.process(&packet(bytes, TARGET, arrival), &mut statistics).unwrap();

        match events.as_slice() {
            [PingEvent::Reply(output)] => {
                assert_eq!(3, output.sequence_number);
                assert_eq!(TARGET, output.ip_addr);
                assert_eq!(Some(Ttl(57)), output.ttl);
                assert_eq!(16, output.package_size);
                assert_eq!(Duration::from_millis(20), output.ping_duration);
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(1, statistics.received());
        assert_eq!(&[Duration::from_millis(20)], statistics.rtts());
    }

    #[test]
    fn foreign_echo_reply_is_ignored() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(64));
        let mut statistics = PingStatistics::default();
        let arrival = SystemTime::now();
        let bytes = echo_reply(AddressFamily::V4, IDENTIFIER + 1, 3, &encode_timestamp(arrival));

        let events = processor.process(&packet(bytes, TARGET, arrival), &mut statistics).unwrap();

        assert!(events.is_empty());
        assert_eq!(0, statistics.received());
        assert!(statistics.rtts().is_empty());
    }

    #[test]
    fn reply_stamped_in_the_future_counts_as_zero_rtt() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(64));
        let mut statistics = PingStatistics::default();
        let arrival = SystemTime::now();
        let stamp = encode_timestamp(arrival + Duration::from_secs(1));
        let bytes = echo_reply(AddressFamily::V4, IDENTIFIER, 0, &stamp);

        processor.process(&packet(bytes, TARGET, arrival), &mut statistics).unwrap();

        assert_eq!(&[Duration::ZERO], statistics.rtts());
    }

    #[test]
    fn matching_time_exceeded_raises_ttl() {
        let socket = SocketMock::new(OnSend::ReturnDefault, Ttl(5));
        let mut processor = processor(&socket, Ttl(5));
        let mut statistics = PingStatistics::default();
        let bytes = time_exceeded(AddressFamily::V4, IDENTIFIER);

        let events = processor.process(&packet(bytes, ROUTER, SystemTime::now()), &mut statistics).unwrap();

        assert!(matches!(events.as_slice(), [PingEvent::HopExpired { ttl: Ttl(5), hop }] if *hop == ROUTER));
        assert_eq!(Ttl(6), processor.current_ttl());
        assert_eq!(vec![Ttl(5), Ttl(6)], socket.ttl_history());
        assert_eq!(0, statistics.received());
    }

    #[test]
    fn hop_is_reported_when_raising_ttl_fails() {
        let socket = SocketMock::new_default();
        socket.fail_set_ttl();
        let mut processor = processor(&socket, Ttl(5));
        let mut statistics = PingStatistics::default();
        let bytes = time_exceeded(AddressFamily::V4, IDENTIFIER);

        let events = processor.process(&packet(bytes, ROUTER, SystemTime::now()), &mut statistics).unwrap();

        match events.as_slice() {
            [PingEvent::HopExpired { ttl: Ttl(5), hop }, PingEvent::TtlNotRaised { ttl: Ttl(5), error }] => {
                assert_eq!(ROUTER, *hop);
                assert!(matches!(error, PingError::Io(_)));
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(Ttl(5), processor.current_ttl());
        assert_eq!(vec![Ttl(64)], socket.ttl_history());
    }

    #[test]
    fn ttl_grows_by_one_per_time_exceeded() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(1));
        let mut statistics = PingStatistics::default();

        for _ in 0..3 {
            let bytes = time_exceeded(AddressFamily::V4, IDENTIFIER);
            processor.process(&packet(bytes, ROUTER, SystemTime::now()), &mut statistics).unwrap();
        }

        assert_eq!(Ttl(4), processor.current_ttl());
    }

    #[test]
    fn foreign_time_exceeded_keeps_ttl() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(5));
        let mut statistics = PingStatistics::default();
        let bytes = time_exceeded(AddressFamily::V4, IDENTIFIER ^ 0xFFFF);

        let events = processor.process(&packet(bytes, ROUTER, SystemTime::now()), &mut statistics).unwrap();

        assert!(events.is_empty());
        assert_eq!(Ttl(5), processor.current_ttl());
        assert_eq!(vec![Ttl(64)], socket.ttl_history());
    }

    #[test]
    fn ttl_stops_at_its_cap() {
        let socket = SocketMock::new_default();
        let escalation = TtlEscalation { max_ttl: Ttl(6), after_reply: false };
        let mut processor =
            PacketProcessor::new(Arc::new(socket.clone()), AddressFamily::V4, IDENTIFIER, Ttl(5), escalation);
        let mut statistics = PingStatistics::default();

        for _ in 0..3 {
            let bytes = time_exceeded(AddressFamily::V4, IDENTIFIER);
            processor.process(&packet(bytes, ROUTER, SystemTime::now()), &mut statistics).unwrap();
        }

        assert_eq!(Ttl(6), processor.current_ttl());
    }

    #[test]
    fn escalation_halts_after_first_reply_by_default() {
        let socket = SocketMock::new_default();
        let escalation = TtlEscalation { max_ttl: Ttl::max_value(), after_reply: false };
        let mut processor =
            PacketProcessor::new(Arc::new(socket.clone()), AddressFamily::V4, IDENTIFIER, Ttl(5), escalation);
        let mut statistics = PingStatistics::default();
        let now = SystemTime::now();

        let reply = echo_reply(AddressFamily::V4, IDENTIFIER, 0, &encode_timestamp(now));
        processor.process(&packet(reply, TARGET, now), &mut statistics).unwrap();
        let notice = time_exceeded(AddressFamily::V4, IDENTIFIER);
        let events = processor.process(&packet(notice, ROUTER, now), &mut statistics).unwrap();

        assert!(matches!(events.as_slice(), [PingEvent::HopExpired { ttl: Ttl(5), .. }]));
        assert_eq!(Ttl(5), processor.current_ttl());
    }

    #[test]
    fn escalation_may_continue_after_reply() {
        let socket = SocketMock::new_default();
        let escalation = TtlEscalation { max_ttl: Ttl::max_value(), after_reply: true };
        let mut processor =
            PacketProcessor::new(Arc::new(socket.clone()), AddressFamily::V4, IDENTIFIER, Ttl(5), escalation);
        let mut statistics = PingStatistics::default();
        let now = SystemTime::now();

        let reply = echo_reply(AddressFamily::V4, IDENTIFIER, 0, &encode_timestamp(now));
        processor.process(&packet(reply, TARGET, now), &mut statistics).unwrap();
        let notice = time_exceeded(AddressFamily::V4, IDENTIFIER);
        processor.process(&packet(notice, ROUTER, now), &mut statistics).unwrap();

        assert_eq!(Ttl(6), processor.current_ttl());
    }

    #[test]
    fn malformed_datagram_is_a_decode_error() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(64));
        let mut statistics = PingStatistics::default();

        let result = processor.process(&packet(vec![0, 0], TARGET, SystemTime::now()), &mut statistics);

        assert!(matches!(result, Err(PingError::Decode(_))));
        assert_eq!(0, statistics.received());
        assert_eq!(Ttl(64), processor.current_ttl());
    }

    #[test]
    fn echo_request_is_a_classification_error() {
        let socket = SocketMock::new_default();
        let mut processor = processor(&socket, Ttl(64));
        let mut statistics = PingStatistics::default();
        let bytes = vec![8, 0, 0, 0, 0x42, 0x42, 0, 0];

        let result = processor.process(&packet(bytes, TARGET, SystemTime::now()), &mut statistics);

        assert!(matches!(result, Err(PingError::Classification { icmp_type: 8, icmp_code: 0 })));
    }

    #[test]
    fn icmpv6_reply_and_time_exceeded() {
        let socket = SocketMock::new_default();
        let escalation = TtlEscalation { max_ttl: Ttl::max_value(), after_reply: true };
        let mut processor =
            PacketProcessor::new(Arc::new(socket.clone()), AddressFamily::V6, IDENTIFIER, Ttl(9), escalation);
        let mut statistics = PingStatistics::default();
        let source: IpAddr = "2001:db8::1".parse().unwrap();
        let now = SystemTime::now();

        let reply = echo_reply(AddressFamily::V6, IDENTIFIER, 2, &encode_timestamp(now));
        let events = processor.process(&packet(reply, source, now), &mut statistics).unwrap();
        assert!(matches!(events.as_slice(), [PingEvent::Reply(_)]));

        let notice = time_exceeded(AddressFamily::V6, IDENTIFIER);
        processor.process(&packet(notice, source, now), &mut statistics).unwrap();
        assert_eq!(Ttl(10), processor.current_ttl());
    }
}
