use crate::{PingError, PingResult};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Counters owned by the engine loop.
#[derive(Debug, Default)]
pub(crate) struct PingStatistics {
    sent: u64,
    received: u64,
    rtts: Vec<Duration>,
}

impl PingStatistics {
    pub(crate) fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub(crate) fn record_reply(&mut self, rtt: Duration) {
        self.received += 1;
        self.rtts.push(rtt);
    }

    pub(crate) fn sent(&self) -> u64 {
        self.sent
    }

    pub(crate) fn received(&self) -> u64 {
        self.received
    }

    pub(crate) fn rtts(&self) -> &[Duration] {
        &self.rtts
    }

    pub(crate) fn into_summary(self, host: String, destination: IpAddr, stop_reason: StopReason) -> PingSummary {
        PingSummary { host, destination, sent: self.sent, received: self.received, rtts: self.rtts, stop_reason }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    Requested,
    /// The socket failed with something other than a read timeout.
    ReadFault,
}

/// Final report of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct PingSummary {
    pub host: String,
    pub destination: IpAddr,
    pub sent: u64,
    pub received: u64,
    pub rtts: Vec<Duration>,
    pub stop_reason: StopReason,
}

impl PingSummary {
    /// `(sent - received) / sent * 100`; undefined when nothing was sent.
    #[allow(clippy::cast_precision_loss)]
    pub fn loss_percentage(&self) -> PingResult<f64> {
        if self.sent == 0 {
            return Err(PingError::UndefinedLoss);
        }
        let lost = self.sent.saturating_sub(self.received);
        Ok(lost as f64 / self.sent as f64 * 100.0)
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.rtts.iter().min().copied()
    }

    pub fn max_rtt(&self) -> Option<Duration> {
        self.rtts.iter().max().copied()
    }

    pub fn avg_rtt(&self) -> Option<Duration> {
        let count = u32::try_from(self.rtts.len()).ok().filter(|&count| count > 0)?;
        Some(self.rtts.iter().sum::<Duration>() / count)
    }
}

impl fmt::Display for PingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary for {} ({})", self.host, self.destination)?;
        write!(f, "{} packets transmitted, {} packets received, ", self.sent, self.received)?;
        match self.loss_percentage() {
            Ok(loss) => write!(f, "{loss:.1}% packet loss")?,
            Err(_) => write!(f, "undefined packet loss")?,
        }
        if let (Some(min), Some(avg), Some(max)) = (self.min_rtt(), self.avg_rtt(), self.max_rtt()) {
            write!(f, "\nrtt min/avg/max = {min:?}/{avg:?}/{max:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn summary(sent: u64, received: u64, rtts: Vec<Duration>) -> PingSummary {
        PingSummary {
            host: "example".to_string(),
            destination: IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)),
            sent,
            received,
            rtts,
            stop_reason: StopReason::Requested,
        }
    }

    #[test]
    fn statistics_count_sent_and_replies() {
        let mut statistics = PingStatistics::default();
        statistics.record_sent();
        statistics.record_sent();
        statistics.record_reply(Duration::from_millis(3));

        assert_eq!(2, statistics.sent());
        assert_eq!(1, statistics.received());
        assert_eq!(&[Duration::from_millis(3)], statistics.rtts());
    }

    #[test]
    fn loss_percentage() {
        assert!((summary(4, 3, vec![]).loss_percentage().unwrap() - 25.0).abs() < f64::EPSILON);
        assert!((summary(4, 4, vec![]).loss_percentage().unwrap()).abs() < f64::EPSILON);
        assert!((summary(3, 0, vec![]).loss_percentage().unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn loss_is_undefined_without_sent_packets() {
        assert!(matches!(summary(0, 0, vec![]).loss_percentage(), Err(PingError::UndefinedLoss)));
    }

    #[test]
    fn rtt_statistics() {
        let s = summary(3, 3, vec![Duration::from_millis(10), Duration::from_millis(30), Duration::from_millis(20)]);
        assert_eq!(Some(Duration::from_millis(10)), s.min_rtt());
        assert_eq!(Some(Duration::from_millis(20)), s.avg_rtt());
        assert_eq!(Some(Duration::from_millis(30)), s.max_rtt());
        assert_eq!(None, summary(1, 0, vec![]).avg_rtt());
    }

    #[test]
    fn fmt_summary() {
        let s = summary(2, 1, vec![Duration::from_millis(20)]);
        assert_eq!(
            "Summary for example (198.51.100.1)\n\
             2 packets transmitted, 1 packets received, 50.0% packet loss\n\
             rtt min/avg/max = 20ms/20ms/20ms",
            format!("{s}")
        );
    }

    #[test]
    fn fmt_summary_with_undefined_loss() {
        let s = summary(0, 0, vec![]);
        assert_eq!(
            "Summary for example (198.51.100.1)\n0 packets transmitted, 0 packets received, undefined packet loss",
            format!("{s}")
        );
    }
}
