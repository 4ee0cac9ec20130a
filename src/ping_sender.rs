use crate::icmp::message::{self, TIMESTAMP_SIZE};
use crate::icmp::socket::TSocket;
use crate::records::PingSendRecord;
use crate::{AddressFamily, PingError, PingResult, SequenceNumber, Target};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

pub(crate) struct PingSender<S> {
    socket: Arc<S>,
    family: AddressFamily,
    destination: socket2::SockAddr,
    identifier: u16,
    sequence_number: SequenceNumber,
}

impl<S> PingSender<S>
where
    S: TSocket + 'static,
{
    pub(crate) fn new(socket: Arc<S>, target: &Target, identifier: u16) -> Self {
        PingSender {
            socket,
            family: target.family,
            destination: SocketAddr::new(target.ip_addr, 0).into(),
            identifier,
            sequence_number: SequenceNumber::start_value(),
        }
    }

    /// Sends the next echo request. The sequence number advances whether or not it went out.
    pub(crate) fn send_next(&mut self) -> PingResult<PingSendRecord> {
        let sequence_number = self.sequence_number;
        self.sequence_number = sequence_number.next();

        let send_time = SystemTime::now();
        let package = message::new_echo_request(self.family, self.identifier, sequence_number, send_time).ok_or(
            PingError::Send {
                sequence_number: sequence_number.into(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "could not create ICMP package"),
            },
        )?;

        self.send_with_retry(&package)
            .map_err(|source| PingError::Send { sequence_number: sequence_number.into(), source })?;
        tracing::trace!("echo request {} sent", sequence_number);

        Ok(PingSendRecord { payload_size: TIMESTAMP_SIZE, sequence_number, send_time })
    }

    // ENOBUFS only means the kernel send buffer is full right now.
    fn send_with_retry(&self, package: &[u8]) -> io::Result<usize> {
        loop {
            match self.socket.send_to(package, &self.destination) {
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    tracing::trace!("send buffer full, retrying");
                }
                result => return result,
            }
        }
    }
}
