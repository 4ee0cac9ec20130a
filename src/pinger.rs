use crate::icmp::socket::{Socket, TSocket};
use crate::packet_processor::{PacketProcessor, TtlEscalation};
use crate::ping_output::{ping_event_channel, PingEventSender};
use crate::ping_receiver::PingReceiver;
use crate::ping_sender::PingSender;
use crate::records::{engine_event_channel, EngineEvent, EngineEventReceiver, EngineEventSender, InFlightPacket};
use crate::statistics::PingStatistics;
use crate::{
    resolve, PingError, PingEvent, PingEventReceiver, PingResult, PingSummary, StopHandle, StopReason, Target, Ttl,
};
use rand::Rng;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketType {
    /// Unprivileged ICMP datagram socket.
    DGRAM,
    RAW,
}

#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug)]
pub struct PingerConfig {
    pub interval: Duration,
    pub socket_type: SocketType,
    /// Hop limit of the first probe.
    pub ttl: Ttl,
    /// Escalation never goes beyond this hop limit.
    pub max_ttl: Ttl,
    /// Keep raising the hop limit on time exceeded notices after the target has replied.
    pub escalate_after_reply: bool,
    /// Capacity of the queue between the receiver thread and the engine.
    pub channel_size: usize,
    /// Upper bound for a single socket read, and so for how long the receiver takes to notice a stop.
    pub read_timeout: Duration,
}

impl Default for PingerConfig {
    fn default() -> Self {
        PingerConfig {
            interval: Duration::from_secs(1),
            socket_type: SocketType::RAW,
            ttl: Ttl(60),
            max_ttl: Ttl::max_value(),
            escalate_after_reply: false,
            channel_size: 5,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Pings one target until stopped.
pub struct Pinger {
    target: Target,
    config: PingerConfig,
    identifier: u16,
    stop_handle: StopHandle,
    event_tx: EngineEventSender,
    event_rx: EngineEventReceiver,
    ping_event_tx: Option<PingEventSender>,
}

impl Pinger {
    /// Resolves `host`. No socket is opened before [`Pinger::run`].
    pub fn create(host: &str, config: PingerConfig) -> PingResult<Pinger> {
        let target = resolve(host)?;
        Ok(Self::with_target(target, config))
    }

    pub fn with_target(target: Target, config: PingerConfig) -> Pinger {
        let identifier = rand::thread_rng().gen_range(1..=u16::MAX);
        let (event_tx, event_rx) = engine_event_channel(config.channel_size);
        Pinger {
            target,
            config,
            identifier,
            stop_handle: StopHandle::new(event_tx.clone()),
            event_tx,
            event_rx,
            ping_event_tx: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Echo identifier that marks this pinger's probes.
    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    /// Stream of per-packet observations. Only the receiver from the last call gets events.
    pub fn subscribe(&mut self) -> PingEventReceiver {
        let (tx, rx) = ping_event_channel();
        self.ping_event_tx = Some(tx);
        rx
    }

    /// Opens the socket and pings until the stop handle fires or the socket faults.
    pub fn run(self) -> PingResult<PingSummary> {
        let socket = Socket::new(self.config.socket_type, self.target.family, self.config.read_timeout, self.identifier)
            .map_err(PingError::SocketOpen)?;
        let ttl = apply_initial_ttl(&socket, self.config.ttl)?;
        tracing::debug!("{} socket open with ttl {}", self.target.family, ttl);
        Ok(self.run_with_socket(socket))
    }

    fn run_with_socket<S>(self, socket: S) -> PingSummary
    where
        S: TSocket + 'static,
    {
        let Pinger { target, config, identifier, stop_handle, event_tx, event_rx, ping_event_tx } = self;
        let socket = Arc::new(socket);

        let receiver_thread = PingReceiver::new(socket.clone(), event_tx, stop_handle.clone()).start();
        let escalation = TtlEscalation { max_ttl: config.max_ttl, after_reply: config.escalate_after_reply };
        let mut engine = Engine {
            sender: PingSender::new(socket.clone(), &target, identifier),
            processor: PacketProcessor::new(socket, target.family, identifier, config.ttl, escalation),
            statistics: PingStatistics::default(),
            stop_handle: stop_handle.clone(),
            ping_event_tx,
        };

        tracing::info!("pinging {} ({}) with identifier {}", target.host, target.ip_addr, identifier);
        let stop_reason = engine.run(&event_rx, config.interval);

        // Closing the queue unblocks a receiver waiting for room in it.
        drop(event_rx);
        stop_handle.stop();
        if receiver_thread.join().is_err() {
            tracing::error!("PingReceiver thread panicked");
        }

        let Engine { statistics, .. } = engine;
        statistics.into_summary(target.host, target.ip_addr, stop_reason)
    }
}

// A rejected hop limit is a configuration error, not a failure to open the socket.
fn apply_initial_ttl<S: TSocket>(socket: &S, ttl: Ttl) -> PingResult<Ttl> {
    socket.set_ttl(ttl)?;
    Ok(socket.ttl()?)
}

/// The single owner of all probe state. Everything that mutates it runs on `Engine::run`.
struct Engine<S> {
    sender: PingSender<S>,
    processor: PacketProcessor<S>,
    statistics: PingStatistics,
    stop_handle: StopHandle,
    ping_event_tx: Option<PingEventSender>,
}

impl<S> Engine<S>
where
    S: TSocket + 'static,
{
    fn run(&mut self, event_rx: &EngineEventReceiver, interval: Duration) -> StopReason {
        let mut next_tick = Instant::now() + interval;
        loop {
            if self.stop_handle.is_stopped() {
                return self.drain_faults(event_rx);
            }
            match event_rx.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
                Err(RecvTimeoutError::Timeout) => {
                    self.on_tick();
                    next_tick += interval;
                    // Skip ticks we were too busy to serve.
                    let now = Instant::now();
                    if next_tick < now {
                        next_tick = now + interval;
                    }
                }
                Ok(EngineEvent::Packet(packet)) => self.on_packet(&packet),
                Ok(EngineEvent::ReadFault(e)) => {
                    self.emit(PingEvent::ReadFault(PingError::ReadFault(e)));
                    return StopReason::ReadFault;
                }
                Ok(EngineEvent::Stop) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }
    }

    // A fault raised together with the stop flag may still sit in the queue.
    fn drain_faults(&mut self, event_rx: &EngineEventReceiver) -> StopReason {
        while let Ok(event) = event_rx.try_recv() {
            if let EngineEvent::ReadFault(e) = event {
                self.emit(PingEvent::ReadFault(PingError::ReadFault(e)));
                return StopReason::ReadFault;
            }
        }
        StopReason::Requested
    }

    fn on_tick(&mut self) {
        match self.sender.send_next() {
            Ok(record) => {
                tracing::trace!(
                    "icmp_seq={} sent at {:?} with {} byte payload",
                    record.sequence_number,
                    record.send_time,
                    record.payload_size
                );
                self.statistics.record_sent();
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.emit(PingEvent::SendFailed(e));
            }
        }
    }

    fn on_packet(&mut self, packet: &InFlightPacket) {
        match self.processor.process(packet, &mut self.statistics) {
            Ok(events) => {
                for event in events {
                    match &event {
                        PingEvent::Reply(output) => tracing::info!("{}", output),
                        PingEvent::HopExpired { ttl, hop } => {
                            let now = self.processor.current_ttl();
                            tracing::info!("time limit exceeded: {} hop: {}, ttl now {}", ttl, hop, now);
                        }
                        PingEvent::TtlNotRaised { ttl, error } => tracing::error!("ttl stays at {}: {}", ttl, error),
                        _ => {}
                    }
                    self.emit(event);
                }
            }
            Err(e) => {
                tracing::warn!("discarding datagram from {}: {}", packet.source, e);
                self.emit(PingEvent::Discarded(e));
            }
        }
    }

    fn emit(&self, event: PingEvent) {
        if let Some(tx) = &self.ping_event_tx {
            // Nobody listening any more is fine.
            let _ = tx.send(event);
        }
    }
}
