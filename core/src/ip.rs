//! Conversions between dotted IPv4 text and the router's numeric form.
//!
//! Several modules (`TC_RULE`, `ARP_BIND_ENTRY`) store addresses as the
//! big-endian integer value of the address, e.g. `192.168.1.100` is
//! `3232235876`.

use std::net::Ipv4Addr;

use crate::error::{ApiError, Result};

pub fn ipv4_to_int(address: &str) -> Result<u32> {
    address
        .trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| ApiError::MalformedCommand(format!("invalid IPv4 address {address:?}")))
}

pub fn int_to_ipv4(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}
