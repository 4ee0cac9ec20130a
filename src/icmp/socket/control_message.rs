use crate::{AddressFamily, Ttl};
use socket2::SockAddr;
use std::io;
use std::net::IpAddr;
use std::os::unix::io::AsRawFd;

const CONTROL_BUFFER_SIZE: usize = 64;

/// Asks the kernel to attach the TTL (IPv4) or hop limit (IPv6) of every received datagram as
/// ancillary data.
pub(crate) fn enable_recv_ttl(socket: &socket2::Socket, family: AddressFamily) -> io::Result<()> {
    let (level, optname) = match family {
        AddressFamily::V4 => (libc::IPPROTO_IP, libc::IP_RECVTTL),
        AddressFamily::V6 => (libc::IPPROTO_IPV6, libc::IPV6_RECVHOPLIMIT),
    };
    let enable: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            optname,
            std::ptr::addr_of!(enable).cast(),
            std::mem::size_of_val(&enable) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `recvmsg` that also returns the source address and the hop limit from the control data.
pub(crate) fn recv_with_ttl(
    socket: &socket2::Socket,
    buf: &mut [u8],
    family: AddressFamily,
) -> io::Result<(usize, IpAddr, Option<Ttl>)> {
    let raw_fd = socket.as_raw_fd();
    let mut control_buf = [0u8; CONTROL_BUFFER_SIZE];

    // SockAddr::init hands us zeroed storage for the source address and takes over the length
    // the kernel wrote back.
    let ((n_bytes, ttl), sock_addr) = unsafe {
        SockAddr::init(|storage, len| {
            let mut iov = libc::iovec { iov_base: buf.as_mut_ptr().cast(), iov_len: buf.len() };
            let mut msg: libc::msghdr = std::mem::zeroed();
            msg.msg_name = storage.cast();
            msg.msg_namelen = *len;
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            msg.msg_control = control_buf.as_mut_ptr().cast();
            msg.msg_controllen = control_buf.len() as _;

            let n_bytes = libc::recvmsg(raw_fd, &mut msg, 0);
            if n_bytes < 0 {
                return Err(io::Error::last_os_error());
            }
            *len = msg.msg_namelen;
            Ok((n_bytes.unsigned_abs(), ttl_from_control_data(&msg, family)))
        })?
    };

    let source = sock_addr
        .as_socket()
        .map(|socket_addr| socket_addr.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "datagram without IP source address"))?;
    Ok((n_bytes, source, ttl))
}

unsafe fn ttl_from_control_data(msg: &libc::msghdr, family: AddressFamily) -> Option<Ttl> {
    let (level, cmsg_types): (libc::c_int, &[libc::c_int]) = match family {
        // Some BSDs deliver IP_RECVTTL instead of IP_TTL.
        AddressFamily::V4 => (libc::IPPROTO_IP, &[libc::IP_TTL, libc::IP_RECVTTL][..]),
        AddressFamily::V6 => (libc::IPPROTO_IPV6, &[libc::IPV6_HOPLIMIT][..]),
    };

    let mut cmsg = libc::CMSG_FIRSTHDR(msg);
    while !cmsg.is_null() {
        let header = &*cmsg;
        if header.cmsg_level == level && cmsg_types.contains(&header.cmsg_type) {
            let data = libc::CMSG_DATA(cmsg);
            let value = if header.cmsg_len as usize >= libc::CMSG_LEN(4) as usize {
                std::ptr::read_unaligned(data.cast::<libc::c_int>())
            } else {
                libc::c_int::from(*data)
            };
            return u8::try_from(value).ok().map(Ttl);
        }
        cmsg = libc::CMSG_NXTHDR(msg, cmsg);
    }
    None
}
