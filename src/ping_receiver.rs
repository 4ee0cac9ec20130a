use crate::icmp::socket::TSocket;
use crate::records::{EngineEvent, EngineEventSender, InFlightPacket};
use crate::StopHandle;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;

const RECV_BUFFER_SIZE: usize = 512;

/// Reads datagrams on its own thread and queues them for the engine without looking inside.
pub(crate) struct PingReceiver<S> {
    socket: Arc<S>,
    event_tx: EngineEventSender,
    stop_handle: StopHandle,
}

impl<S> PingReceiver<S>
where
    S: TSocket + 'static,
{
    pub(crate) fn new(socket: Arc<S>, event_tx: EngineEventSender, stop_handle: StopHandle) -> Self {
        PingReceiver { socket, event_tx, stop_handle }
    }

    pub(crate) fn start(self) -> JoinHandle<()> {
        std::thread::spawn(move || {
            tracing::trace!("PingReceiver thread start");
            self.receive_until_stopped();
            tracing::trace!("PingReceiver thread end");
        })
    }

    fn receive_until_stopped(&self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        while !self.stop_handle.is_stopped() {
            match self.socket.recv_from(&mut buf) {
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!("error receiving icmp: {}", e);
                    // Blocks while the queue is full; fails only once the engine is gone.
                    let _ = self.event_tx.send(EngineEvent::ReadFault(e));
                    self.stop_handle.stop();
                    return;
                }
                Ok((n_bytes, source, ttl)) => {
                    let packet = InFlightPacket {
                        bytes: buf[..n_bytes].to_vec(),
                        n_bytes,
                        ttl,
                        source,
                        received_at: SystemTime::now(),
                    };
                    if self.event_tx.send(EngineEvent::Packet(packet)).is_err() {
                        tracing::trace!("engine gone, dropping datagram");
                        return;
                    }
                }
            }
        }
    }
}
