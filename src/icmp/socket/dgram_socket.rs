use super::{control_message, TSocket};
use crate::{AddressFamily, Ttl};
use socket2::Type;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::{io, time::Duration};

/// Unprivileged `SOCK_DGRAM` ICMP socket (Linux `ping_group_range`, macOS).
///
/// The kernel owns the echo identifier of such a socket: it is the local "port". Binding to the
/// correlation identifier keeps outbound probes and their replies stamped with it.
pub(crate) struct DgramSocket {
    socket: socket2::Socket,
    family: AddressFamily,
}

impl DgramSocket {
    pub(crate) fn new(family: AddressFamily, timeout: Duration, identifier: u16) -> Result<Self, io::Error> {
        tracing::trace!("creating {} DgramSocket bound to identifier {}", family, identifier);
        let socket = super::open(family, Type::DGRAM, timeout)?;
        let unspecified = match family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        socket.bind(&SocketAddr::new(unspecified, identifier).into())?;
        Ok(DgramSocket { socket, family })
    }
}

impl TSocket for DgramSocket {
    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr, Option<Ttl>)> {
        control_message::recv_with_ttl(&self.socket, buf, self.family)
    }

    fn set_ttl(&self, ttl: Ttl) -> io::Result<()> {
        super::set_ttl(&self.socket, self.family, ttl)
    }

    fn ttl(&self) -> io::Result<Ttl> {
        super::ttl(&self.socket, self.family)
    }
}
