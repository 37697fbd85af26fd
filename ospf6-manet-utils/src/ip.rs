//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    /// Returns whether the address is usable as a Router ID or packet
    /// source.
    fn is_usable(&self) -> bool;
}

// Extension methods for Ipv6Addr.
pub trait Ipv6AddrExt {
    /// Returns whether the address is usable as a packet source.
    fn is_usable(&self) -> bool;

    /// Returns whether the address is a unicast link-local address
    /// (fe80::/10).
    fn is_unicast_link_local(&self) -> bool;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    fn is_usable(&self) -> bool {
        !self.is_unspecified() && !self.is_loopback() && !self.is_multicast()
    }
}

// ===== impl Ipv6Addr =====

impl Ipv6AddrExt for Ipv6Addr {
    fn is_usable(&self) -> bool {
        !self.is_unspecified() && !self.is_loopback() && !self.is_multicast()
    }

    fn is_unicast_link_local(&self) -> bool {
        self.segments()[0] & 0xffc0 == 0xfe80
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv6_link_local() {
        let addr: Ipv6Addr = "fe80::1".parse().unwrap();
        assert!(addr.is_unicast_link_local());
        assert!(addr.is_usable());

        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert!(!addr.is_unicast_link_local());

        let addr: Ipv6Addr = "ff02::5".parse().unwrap();
        assert!(!addr.is_usable());
    }
}
