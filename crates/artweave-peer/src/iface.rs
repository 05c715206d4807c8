//! Network-interface bootstrap
//!
//! The engine needs three facts about the host before it can speak: the
//! unicast IPv4 address to report in replies, the subnet broadcast address
//! for polls and replies, and the MAC. Given an interface name we look
//! that interface up; unnamed, we rank every broadcast-capable IPv4
//! interface:
//!
//! 1. netmask 255.0.0.0 with an address in `2.x.x.x` — the historical
//!    Art-Net class-A convention, strongly preferred;
//! 2. names matching `enp.*` then `wlp.*`;
//! 3. whatever remains, by name.

use crate::{Error, Result};
use regex_lite::Regex;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Interfaces with an IP are preferred in this order.
const PREFERRED_INTERFACES_ORDER: [&str; 2] = ["enp.*", "wlp.*"];

/// What the engine needs to know about the chosen interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub unicast_ip: Ipv4Addr,
    pub broadcast_ip: Ipv4Addr,
    pub mac: [u8; 6],
}

/// Resolve the interface to bind Art-Net to.
pub fn resolve(name: Option<&str>) -> Result<InterfaceInfo> {
    let mut candidates: Vec<(i32, String, Ipv4Addr, Ipv4Addr)> = Vec::new();
    for iface in
        if_addrs::get_if_addrs().map_err(|e| Error::InterfaceUnavailable(e.to_string()))?
    {
        let if_addrs::IfAddr::V4(ref v4) = iface.addr else {
            continue;
        };
        let Some(broadcast) = v4.broadcast else {
            continue;
        };
        debug!(
            "interface name={} {} {} {}",
            iface.name, v4.ip, v4.netmask, broadcast
        );
        match name {
            Some(wanted) if iface.name == wanted => {
                candidates.push((0, iface.name.clone(), v4.ip, broadcast));
            }
            Some(_) => {}
            None => {
                candidates.push((
                    rank(&iface.name, v4.ip, v4.netmask),
                    iface.name.clone(),
                    v4.ip,
                    broadcast,
                ));
            }
        }
    }

    candidates.sort();
    let Some((_, chosen, unicast_ip, broadcast_ip)) = candidates.into_iter().next() else {
        return Err(Error::InterfaceUnavailable(match name {
            Some(wanted) => format!("no IPv4 broadcast address on {:?}", wanted),
            None => "no IPv4 interface with a broadcast address".to_string(),
        }));
    };

    let mac = match mac_address::mac_address_by_name(&chosen) {
        Ok(Some(mac)) => mac.bytes(),
        _ => {
            warn!("no MAC for interface {}, reporting zeros", chosen);
            [0; 6]
        }
    };

    info!(
        "using interface {} with ip {} broadcast ip {}",
        chosen, unicast_ip, broadcast_ip
    );
    Ok(InterfaceInfo {
        name: chosen,
        unicast_ip,
        broadcast_ip,
        mac,
    })
}

/// Preference rank; lower sorts first.
fn rank(name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> i32 {
    // explicit class-A primary interface for Art-Net
    if netmask == Ipv4Addr::new(255, 0, 0, 0) && ip.octets()[0] == 2 {
        return -1;
    }
    for (i, pattern) in PREFERRED_INTERFACES_ORDER.iter().enumerate() {
        if let Ok(re) = Regex::new(&format!("^{}", pattern)) {
            if re.is_match(name) {
                return i as i32;
            }
        }
    }
    10
}
