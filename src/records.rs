use crate::{SequenceNumber, Ttl};
use std::io;
use std::net::IpAddr;
use std::sync::mpsc;
use std::time::SystemTime;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PingSendRecord {
    pub payload_size: usize,
    pub sequence_number: SequenceNumber,
    pub send_time: SystemTime,
}

/// A datagram as read from the socket, handed from the receiver thread to the engine untouched.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct InFlightPacket {
    pub bytes: Vec<u8>,
    pub n_bytes: usize,
    pub ttl: Option<Ttl>,
    pub source: IpAddr,
    pub received_at: SystemTime,
}

#[derive(Debug)]
pub(crate) enum EngineEvent {
    Packet(InFlightPacket),
    ReadFault(io::Error),
    /// Wakes the engine so it observes the stop flag.
    Stop,
}

pub(crate) type EngineEventSender = mpsc::SyncSender<EngineEvent>;
pub(crate) type EngineEventReceiver = mpsc::Receiver<EngineEvent>;

pub(crate) fn engine_event_channel(channel_size: usize) -> (EngineEventSender, EngineEventReceiver) {
    mpsc::sync_channel::<EngineEvent>(channel_size)
}
