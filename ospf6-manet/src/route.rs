//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv6Network;

use crate::collections::InterfaceIndex;
use crate::packet::Options;
use crate::packet::lsa::{LsaRouterFlags, PrefixOptions};

// Routing table entry for an IPv6 destination.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteNet {
    pub path_type: PathType,
    pub prefix_options: PrefixOptions,
    pub metric: u32,
    pub type2_metric: Option<u32>,
    pub tag: Option<u32>,
    // The area the route was learned from, if any.
    pub area_id: Option<Ipv4Addr>,
    pub origin: Option<Ipv4Addr>,
    pub nexthops: Nexthops,
    pub flags: RouteNetFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RouteNetFlags: u8 {
        const CONNECTED = 0x01;
        const INSTALLED = 0x02;
        const SUMMARIZED = 0x04;
    }
}

// Routing table entry for a reachable ABR or ASBR.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct RouteRtr {
    pub path_type: PathType,
    pub options: Options,
    pub flags: LsaRouterFlags,
    pub metric: u32,
    pub nexthops: Nexthops,
}

// Route path types, in decreasing order of preference.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PathType {
    IntraArea,
    InterArea,
    Type1External,
    Type2External,
}

// Route nexthop, keyed by its address.
pub type Nexthops = BTreeMap<Ipv6Addr, Nexthop>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
pub struct Nexthop {
    // Outgoing interface.
    pub iface_idx: InterfaceIndex,
    // Nexthop link-local address (None for directly attached
    // destinations).
    pub addr: Option<Ipv6Addr>,
}

// Summary route advertised into an area through an Inter-Area-Prefix-LSA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SummaryNet {
    pub prefix_options: PrefixOptions,
    pub metric: u32,
    pub flags: SummaryNetFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SummaryNetFlags: u8 {
        const CONNECTED = 0x01;
    }
}

// Summary route advertised into an area through an Inter-Area-Router-LSA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SummaryRtr {
    pub options: Options,
    pub metric: u32,
}

// Collaborator interface towards the RIB: route installation is outside
// the core's responsibility.
pub trait RouteInstaller: Send {
    fn install(&mut self, prefix: Ipv6Network, route: &RouteNet);
    fn uninstall(&mut self, prefix: Ipv6Network);
}

// Installer that discards all routes; useful for tests and for running the
// protocol core without a RIB.
#[derive(Debug, Default)]
pub struct NullInstaller();

impl RouteInstaller for NullInstaller {
    fn install(&mut self, _prefix: Ipv6Network, _route: &RouteNet) {}

    fn uninstall(&mut self, _prefix: Ipv6Network) {}
}
