//! Port-address parsing and splitting
//!
//! An Art-Net port-address packs net:sub-net:universe into 15 bits:
//! ```text
//! bits  14..8   7..4      3..0
//! name  net     sub_net   universe
//! ```
//! The string form is `"N:S:U"`, e.g. `"3:1:5"` for 0x315.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 15-bit Art-Net port-address.
///
/// Values above [`PortAddress::MAX`] are unrepresentable; the constructor
/// rejects them rather than masking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct PortAddress(u16);

impl PortAddress {
    /// Highest representable port-address (net 127, sub-net 15, universe 15).
    pub const MAX: u16 = 0x7FFF;

    /// Construct from the packed 15-bit value.
    pub fn new(raw: u16) -> Result<Self> {
        if raw > Self::MAX {
            return Err(Error::InvalidPortAddress(format!(
                "0x{:04x} exceeds 0x7fff (only 128 nets)",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// Construct from separate net / sub-net / universe components.
    pub fn from_parts(net: u8, sub_net: u8, universe: u8) -> Result<Self> {
        if net > 0x7F {
            return Err(Error::InvalidPortAddress(format!("net {} > 127", net)));
        }
        if sub_net > 0x0F {
            return Err(Error::InvalidPortAddress(format!(
                "sub-net {} > 15",
                sub_net
            )));
        }
        if universe > 0x0F {
            return Err(Error::InvalidPortAddress(format!(
                "universe {} > 15",
                universe
            )));
        }
        Ok(Self(
            ((net as u16) << 8) | ((sub_net as u16) << 4) | universe as u16,
        ))
    }

    /// The packed 15-bit value.
    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Split into (net, sub_net, universe).
    pub fn split(&self) -> (u8, u8, u8) {
        (
            (self.0 >> 8) as u8,
            ((self.0 >> 4) & 0x0F) as u8,
            (self.0 & 0x0F) as u8,
        )
    }

    /// Net component (7 bits).
    pub fn net(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Sub-net component (4 bits).
    pub fn sub_net(&self) -> u8 {
        ((self.0 >> 4) & 0x0F) as u8
    }

    /// Universe component (4 bits).
    pub fn universe(&self) -> u8 {
        (self.0 & 0x0F) as u8
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (net, sub_net, universe) = self.split();
        write!(f, "{}:{}:{}", net, sub_net, universe)
    }
}

impl TryFrom<u16> for PortAddress {
    type Error = Error;

    fn try_from(raw: u16) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<PortAddress> for u16 {
    fn from(addr: PortAddress) -> u16 {
        addr.0
    }
}

impl FromStr for PortAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let (Some(net), Some(sub_net), Some(universe), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidPortAddress(format!(
                "expected net:sub-net:universe, got {:?}",
                s
            )));
        };
        let parse = |component: &str| {
            component.parse::<u8>().map_err(|_| {
                Error::InvalidPortAddress(format!("bad component {:?} in {:?}", component, s))
            })
        };
        Self::from_parts(parse(net)?, parse(sub_net)?, parse(universe)?)
    }
}
