//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::os::raw::c_int;
use std::os::unix::io::AsRawFd;

// Normal build: re-export standard socket types.
#[cfg(not(feature = "testing"))]
pub use {socket2::Socket, tokio::io::unix::AsyncFd};

// Test build: export mock sockets.
#[cfg(feature = "testing")]
pub use crate::socket::mock::{AsyncFd, Socket};

// Useful type definition.
type Result<T> = std::io::Result<T>;

// Extension methods for raw IPv6 sockets.
pub trait SocketExt: Sized + AsRawFd {
    // Sets the value of the IPV6_TCLASS option for this socket.
    fn set_ipv6_tclass(&self, dscp: u8) -> Result<()> {
        let optval = dscp as c_int;

        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_TCLASS,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    }

    // Sets the value of the IPV6_MULTICAST_HOPS option for this socket.
    fn set_ipv6_multicast_hops(&self, hops: u8) -> Result<()> {
        let optval = hops as c_int;

        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_MULTICAST_HOPS,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    }

    // Sets the value of the IPV6_CHECKSUM option for this socket.
    //
    // A non-negative offset tells the kernel to compute and verify the
    // transport checksum at that offset; -1 disables offloading.
    fn set_ipv6_checksum(&self, offset: i32) -> Result<()> {
        let optval = offset as c_int;

        setsockopt(
            self,
            libc::IPPROTO_RAW,
            libc::IPV6_CHECKSUM,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    }

    // Sets the value of the IPV6_RECVPKTINFO option for this socket.
    fn set_ipv6_pktinfo(&self, value: bool) -> Result<()> {
        let optval = value as c_int;

        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVPKTINFO,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    }
}

#[cfg(not(feature = "testing"))]
impl SocketExt for Socket {}

// ===== helper functions =====

fn setsockopt<S: AsRawFd>(
    sock: &S,
    level: c_int,
    optname: c_int,
    optval: *const libc::c_void,
    optlen: libc::socklen_t,
) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(sock.as_raw_fd(), level, optname, optval, optlen)
    };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

// ===== mock sockets (testing) =====

#[cfg(feature = "testing")]
pub mod mock {
    use std::os::unix::io::{AsRawFd, RawFd};

    #[derive(Debug, Default)]
    pub struct Socket {}

    #[derive(Debug, Default)]
    pub struct AsyncFd<T> {
        inner: T,
    }

    impl AsRawFd for Socket {
        fn as_raw_fd(&self) -> RawFd {
            -1
        }
    }

    impl super::SocketExt for Socket {}

    impl<T> AsyncFd<T> {
        pub fn new(inner: T) -> std::io::Result<AsyncFd<T>> {
            Ok(AsyncFd { inner })
        }

        pub fn get_ref(&self) -> &T {
            &self.inner
        }
    }
}
