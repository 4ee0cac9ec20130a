use super::{control_message, TSocket};
use crate::{AddressFamily, Ttl};
use pnet_packet::ipv4::Ipv4Packet;
use socket2::Type;
use std::{io, net::IpAddr, time::Duration};

const IP_PACKET_BUFFER_SIZE: usize = 1024;

/// `SOCK_RAW` ICMP socket. Needs root or `CAP_NET_RAW`.
pub(crate) struct RawSocket {
    socket: socket2::Socket,
    family: AddressFamily,
}

impl RawSocket {
    pub(crate) fn new(family: AddressFamily, timeout: Duration) -> Result<Self, io::Error> {
        tracing::trace!("creating {} RawSocket", family);
        let socket = super::open(family, Type::RAW, timeout)?;
        Ok(RawSocket { socket, family })
    }
}

impl TSocket for RawSocket {
    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr, Option<Ttl>)> {
        match self.family {
            // Raw ICMPv6 sockets never see the IPv6 header.
            AddressFamily::V6 => control_message::recv_with_ttl(&self.socket, buf, self.family),
            // On a raw IPv4 socket we get the whole IP packet.
            AddressFamily::V4 => {
                let mut recv_buf = [0u8; IP_PACKET_BUFFER_SIZE];
                let (n_bytes, ip_addr, control_ttl) =
                    control_message::recv_with_ttl(&self.socket, &mut recv_buf, self.family)?;
                let ipv4_packet = Ipv4Packet::new(&recv_buf[..n_bytes])
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "datagram shorter than an IPv4 header"))?;
                let header_size = usize::from(ipv4_packet.get_header_length()) * 4;
                // Return only the ICMP content.
                let ip_payload = recv_buf.get(header_size..n_bytes).unwrap_or_default();
                let n_copied = ip_payload.len().min(buf.len());
                buf[..n_copied].copy_from_slice(&ip_payload[..n_copied]);
                Ok((n_copied, ip_addr, control_ttl.or(Some(Ttl(ipv4_packet.get_ttl())))))
            }
        }
    }

    fn set_ttl(&self, ttl: Ttl) -> io::Result<()> {
        super::set_ttl(&self.socket, self.family, ttl)
    }

    fn ttl(&self) -> io::Result<Ttl> {
        super::ttl(&self.socket, self.family)
    }
}
