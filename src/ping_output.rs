use crate::{PingError, Ttl};
use std::fmt;
use std::net::IpAddr;
use std::sync::mpsc;
use std::time::Duration;

/// One matched echo reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PingOutput {
    pub package_size: usize,
    pub ip_addr: IpAddr,
    pub ttl: Option<Ttl>,
    pub sequence_number: u16,
    pub ping_duration: Duration,
}

impl fmt::Display for PingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes from {}: icmp_seq={}", self.package_size, self.ip_addr, self.sequence_number)?;
        if let Some(ttl) = self.ttl {
            write!(f, " ttl={ttl}")?;
        }
        write!(f, " time={:?}", self.ping_duration)
    }
}

/// Observations made by a running [`crate::Pinger`].
#[derive(Debug)]
pub enum PingEvent {
    Reply(PingOutput),
    /// A router at `hop` dropped a probe sent with hop limit `ttl`.
    HopExpired { ttl: Ttl, hop: IpAddr },
    /// The hop limit could not be raised after a `HopExpired`; probes keep using `ttl`.
    TtlNotRaised { ttl: Ttl, error: PingError },
    SendFailed(PingError),
    /// An inbound datagram that could not be decoded or classified.
    Discarded(PingError),
    ReadFault(PingError),
}

pub(crate) type PingEventSender = mpsc::Sender<PingEvent>;
pub type PingEventReceiver = mpsc::Receiver<PingEvent>;

pub(crate) fn ping_event_channel() -> (PingEventSender, PingEventReceiver) {
    mpsc::channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn fmt_ping_output() {
        let output = PingOutput {
            package_size: 16,
            ip_addr: IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)),
            ttl: Some(Ttl(57)),
            sequence_number: 3,
            ping_duration: Duration::from_millis(20),
        };
        assert_eq!("16 bytes from 198.51.100.1: icmp_seq=3 ttl=57 time=20ms", format!("{output}"));
    }

    #[test]
    fn fmt_ping_output_without_ttl() {
        let output = PingOutput {
            package_size: 16,
            ip_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ttl: None,
            sequence_number: 0,
            ping_duration: Duration::from_micros(1500),
        };
        assert_eq!("16 bytes from 127.0.0.1: icmp_seq=0 time=1.5ms", format!("{output}"));
    }
}
