//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod area;
pub mod collections;
pub mod debug;
pub mod error;
pub mod events;
pub mod flood;
pub mod instance;
pub mod interface;
pub mod lsdb;
pub mod mdr;
pub mod mpr;
pub mod neighbor;
pub mod network;
pub mod nssa;
pub mod output;
pub mod packet;
pub mod pushback;
pub mod route;
pub mod spf;
pub mod tasks;
pub mod vlink;
