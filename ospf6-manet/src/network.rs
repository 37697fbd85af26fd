//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use derive_new::new;
use ospf6_manet_utils::socket::{AsyncFd, Socket};
use serde::Serialize;
use smallvec::SmallVec;

// OSPF IP protocol number.
pub const OSPF_IP_PROTO: i32 = 89;

// OSPFv3 multicast addresses.
static ALL_SPF_RTRS: Lazy<Ipv6Addr> =
    Lazy::new(|| Ipv6Addr::from_str("FF02::5").unwrap());
static ALL_DR_RTRS: Lazy<Ipv6Addr> =
    Lazy::new(|| Ipv6Addr::from_str("FF02::6").unwrap());

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum MulticastAddr {
    AllSpfRtrs,
    AllDrRtrs,
}

// Destination of an outgoing packet: one or more addresses reached
// through the given interface.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, new)]
pub struct SendDestination {
    pub ifindex: u32,
    pub addrs: SmallVec<[Ipv6Addr; 4]>,
}

// ===== global functions =====

// Returns the IP address of the specified OSPF multicast group.
pub(crate) fn multicast_addr(addr: MulticastAddr) -> &'static Ipv6Addr {
    match addr {
        MulticastAddr::AllSpfRtrs => &ALL_SPF_RTRS,
        MulticastAddr::AllDrRtrs => &ALL_DR_RTRS,
    }
}

// Creates a raw OSPFv3 socket bound to the given interface.
pub(crate) fn socket(ifname: &str) -> Result<Socket, std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        use ospf6_manet_utils::socket::SocketExt;
        use socket2::{Domain, Protocol, Type};

        use crate::packet::PacketHdr;

        let socket = Socket::new(
            Domain::IPV6,
            Type::RAW,
            Some(Protocol::from(OSPF_IP_PROTO)),
        )?;

        socket.set_nonblocking(true)?;
        socket.bind_device(Some(ifname.as_bytes()))?;
        socket.set_multicast_loop_v6(false)?;
        // NOTE: IPV6_MULTICAST_HOPS is 1 by default.
        socket.set_ipv6_pktinfo(true)?;
        socket.set_ipv6_tclass(libc::IPTOS_PREC_INTERNETCONTROL)?;
        // Let the kernel compute and verify the OSPF checksum.
        socket.set_ipv6_checksum(PacketHdr::CHECKSUM_OFFSET)?;

        Ok(socket)
    }
    #[cfg(feature = "testing")]
    {
        let _ = ifname;
        Ok(Socket::default())
    }
}

// Joins the specified OSPF multicast group.
#[cfg(not(feature = "testing"))]
pub(crate) fn join_multicast(
    socket: &Socket,
    addr: MulticastAddr,
    ifindex: u32,
) -> Result<(), std::io::Error> {
    let addr = multicast_addr(addr);
    let socket = socket2::SockRef::from(socket);
    socket.join_multicast_v6(addr, ifindex)
}

// Leaves the specified OSPF multicast group.
#[cfg(not(feature = "testing"))]
pub(crate) fn leave_multicast(
    socket: &Socket,
    addr: MulticastAddr,
    ifindex: u32,
) -> Result<(), std::io::Error> {
    let addr = multicast_addr(addr);
    let socket = socket2::SockRef::from(socket);
    socket.leave_multicast_v6(addr, ifindex)
}

#[cfg(not(feature = "testing"))]
pub(crate) use io::{read_loop, write_loop};

#[cfg(not(feature = "testing"))]
mod io {
    use std::io::{IoSlice, IoSliceMut};
    use std::ops::Deref;
    use std::os::fd::AsRawFd;
    use std::sync::Arc;

    use bytes::Bytes;
    use nix::sys::socket::{self, SockaddrIn6};
    use ospf6_manet_utils::Sender;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::error::SendError;

    use super::*;
    use crate::collections::{AreaId, InterfaceId};
    use crate::debug::Debug;
    use crate::error::IoError;
    use crate::packet::Packet;
    use crate::tasks::messages::input::NetRxPacketMsg;
    use crate::tasks::messages::output::NetTxPacketMsg;

    fn new_pktinfo(src: Option<Ipv6Addr>, ifindex: u32) -> libc::in6_pktinfo {
        libc::in6_pktinfo {
            ipi6_addr: libc::in6_addr {
                s6_addr: src.unwrap_or(Ipv6Addr::UNSPECIFIED).octets(),
            },
            ipi6_ifindex: ifindex,
        }
    }

    async fn send_packet(
        socket: &AsyncFd<Socket>,
        ifname: &str,
        ifindex: u32,
        src: Option<Ipv6Addr>,
        dst: Ipv6Addr,
        packet: &Packet,
    ) -> Result<usize, IoError> {
        Debug::PacketTx(ifname, &dst, packet).log();

        // Encode packet.
        let buf = packet.encode();

        // Send packet.
        let iov = [IoSlice::new(&buf)];
        let sockaddr: SockaddrIn6 =
            std::net::SocketAddrV6::new(dst, 0, 0, ifindex).into();
        let pktinfo = new_pktinfo(src, ifindex);
        let cmsg = [socket::ControlMessage::Ipv6PacketInfo(&pktinfo)];
        socket
            .async_io(tokio::io::Interest::WRITABLE, |socket| {
                socket::sendmsg(
                    socket.as_raw_fd(),
                    &iov,
                    &cmsg,
                    socket::MsgFlags::empty(),
                    Some(&sockaddr),
                )
                .map_err(|errno| errno.into())
            })
            .await
            .map_err(IoError::SendError)
    }

    pub(crate) async fn write_loop(
        socket: Arc<AsyncFd<Socket>>,
        ifname: String,
        src: Option<Ipv6Addr>,
        mut net_tx_packetc: UnboundedReceiver<NetTxPacketMsg>,
    ) {
        while let Some(NetTxPacketMsg { packet, dst }) =
            net_tx_packetc.recv().await
        {
            // Send packet to all requested destinations. A failed send is
            // logged and retried on the next scheduled transmission.
            for addr in dst.addrs {
                if let Err(error) = send_packet(
                    &socket,
                    &ifname,
                    dst.ifindex,
                    src,
                    addr,
                    &packet,
                )
                .await
                {
                    error.log();
                }
            }
        }
    }

    pub(crate) async fn read_loop(
        socket: Arc<AsyncFd<Socket>>,
        area_id: AreaId,
        iface_id: InterfaceId,
        net_packet_rxp: Sender<NetRxPacketMsg>,
    ) -> Result<(), SendError<NetRxPacketMsg>> {
        // The receive buffer is sized for the largest enabled MTU.
        let mut buf = [0; 16384];
        let mut iov = [IoSliceMut::new(&mut buf)];
        let mut cmsgspace = nix::cmsg_space!(libc::in6_pktinfo);

        loop {
            // Receive data packet.
            match socket
                .async_io(tokio::io::Interest::READABLE, |socket| {
                    match socket::recvmsg::<SockaddrIn6>(
                        socket.as_raw_fd(),
                        &mut iov,
                        Some(&mut cmsgspace),
                        socket::MsgFlags::empty(),
                    ) {
                        Ok(msg) => {
                            // Retrieve source and destination addresses.
                            let src =
                                msg.address.as_ref().map(|addr| addr.ip());
                            let dst =
                                msg.cmsgs().unwrap().find_map(|cmsg| {
                                    if let socket::ControlMessageOwned::Ipv6PacketInfo(pktinfo) = cmsg {
                                        Some(Ipv6Addr::from(
                                            pktinfo.ipi6_addr.s6_addr,
                                        ))
                                    } else {
                                        None
                                    }
                                });
                            Ok((src, dst, msg.bytes))
                        }
                        Err(errno) => Err(errno.into()),
                    }
                })
                .await
            {
                Ok((src, dst, bytes)) => {
                    let src = match src {
                        Some(addr) => addr,
                        None => {
                            IoError::RecvMissingSourceAddr.log();
                            return Ok(());
                        }
                    };
                    let dst = match dst {
                        Some(addr) => addr,
                        None => {
                            IoError::RecvMissingAncillaryData.log();
                            return Ok(());
                        }
                    };

                    // Decode packet.
                    //
                    // NOTE: the IPv6 raw socket API does not include the
                    // IPv6 header in received packets.
                    let mut buf =
                        Bytes::copy_from_slice(&iov[0].deref()[0..bytes]);
                    let packet = Packet::decode(&mut buf);
                    let msg = NetRxPacketMsg {
                        area_key: area_id.into(),
                        iface_key: iface_id.into(),
                        src,
                        dst,
                        packet,
                    };
                    net_packet_rxp.send(msg).await?;
                }
                Err(error)
                    if error.kind() == std::io::ErrorKind::Interrupted =>
                {
                    // Retry if the syscall was interrupted (EINTR).
                    continue;
                }
                Err(error) => {
                    IoError::RecvError(error).log();
                }
            }
        }
    }
}
