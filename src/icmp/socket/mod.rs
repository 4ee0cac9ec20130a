use crate::{AddressFamily, SocketType, Ttl};
use socket2::{Domain, Protocol, Type};
use std::net::IpAddr;
use std::{io, time::Duration};

pub(crate) use dgram_socket::DgramSocket;
pub(crate) use raw_socket::RawSocket;

mod control_message;
pub(crate) mod dgram_socket;
pub(crate) mod raw_socket;

/// ICMP socket shared by the sender (writes) and the receiver thread (reads).
pub(crate) trait TSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize>;
    /// Reads one datagram starting at its ICMP header. Returns `WouldBlock` once the read
    /// timeout expires.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr, Option<Ttl>)>;
    fn set_ttl(&self, ttl: Ttl) -> io::Result<()>;
    fn ttl(&self) -> io::Result<Ttl>;
}

pub(crate) enum Socket {
    Raw(RawSocket),
    Dgram(DgramSocket),
}

impl Socket {
    pub(crate) fn new(
        socket_type: SocketType,
        family: AddressFamily,
        timeout: Duration,
        identifier: u16,
    ) -> Result<Self, io::Error> {
        match socket_type {
            SocketType::DGRAM => Ok(Socket::Dgram(DgramSocket::new(family, timeout, identifier)?)),
            SocketType::RAW => Ok(Socket::Raw(RawSocket::new(family, timeout)?)),
        }
    }
}

impl TSocket for Socket {
    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize> {
        match self {
            Socket::Dgram(socket) => socket.send_to(buf, addr),
            Socket::Raw(socket) => socket.send_to(buf, addr),
        }
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr, Option<Ttl>)> {
        match self {
            Socket::Dgram(socket) => socket.recv_from(buf),
            Socket::Raw(socket) => socket.recv_from(buf),
        }
    }

    fn set_ttl(&self, ttl: Ttl) -> io::Result<()> {
        match self {
            Socket::Dgram(socket) => socket.set_ttl(ttl),
            Socket::Raw(socket) => socket.set_ttl(ttl),
        }
    }

    fn ttl(&self) -> io::Result<Ttl> {
        match self {
            Socket::Dgram(socket) => socket.ttl(),
            Socket::Raw(socket) => socket.ttl(),
        }
    }
}

fn open(family: AddressFamily, socket_type: Type, timeout: Duration) -> io::Result<socket2::Socket> {
    let (domain, protocol) = match family {
        AddressFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
        AddressFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
    };
    let socket = socket2::Socket::new(domain, socket_type, Some(protocol))?;
    socket.set_read_timeout(Some(timeout))?;
    control_message::enable_recv_ttl(&socket, family)?;
    Ok(socket)
}

fn set_ttl(socket: &socket2::Socket, family: AddressFamily, ttl: Ttl) -> io::Result<()> {
    match family {
        AddressFamily::V4 => socket.set_ttl(u32::from(ttl.0)),
        AddressFamily::V6 => socket.set_unicast_hops_v6(u32::from(ttl.0)),
    }
}

fn ttl(socket: &socket2::Socket, family: AddressFamily) -> io::Result<Ttl> {
    let value = match family {
        AddressFamily::V4 => socket.ttl()?,
        AddressFamily::V6 => socket.unicast_hops_v6()?,
    };
    u8::try_from(value)
        .map(Ttl)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("hop limit {value} out of range")))
}
