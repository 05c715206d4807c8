//! Port model
//!
//! A port couples a node (or the local peer) to one universe in one
//! direction. The wire protocol's naming is reversed from intuition and is
//! preserved here: an *input* port feeds DMX into the network (the owner
//! publishes the universe), an *output* port drives fixtures from it (the
//! owner subscribes).

use artweave_core::PortAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Who a port belongs to: the local peer or a discovered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortOwner {
    Local,
    Remote(Ipv4Addr),
}

/// Port direction in wire-protocol terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The owner publishes DMX onto the universe.
    Input,
    /// The owner receives DMX from the universe.
    Output,
}

/// Media kind carried in the low five bits of a reply's portTypes slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Media {
    Dmx,
    Midi,
    Avab,
    ColortranCmx,
    Adb62_5,
    ArtNet,
    Dali,
}

impl Media {
    /// Decode a portTypes media code; codes past the published table fall
    /// back to DMX.
    pub fn from_code(code: u8) -> Self {
        match code & 0x1F {
            1 => Media::Midi,
            2 => Media::Avab,
            3 => Media::ColortranCmx,
            4 => Media::Adb62_5,
            5 => Media::ArtNet,
            6 => Media::Dali,
            _ => Media::Dmx,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Media::Dmx => 0,
            Media::Midi => 1,
            Media::Avab => 2,
            Media::ColortranCmx => 3,
            Media::Adb62_5 => 4,
            Media::ArtNet => 5,
            Media::Dali => 6,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Media::Dmx => "DMX",
            Media::Midi => "MIDI",
            Media::Avab => "Avab",
            Media::ColortranCmx => "Colortran CMX",
            Media::Adb62_5 => "ADB 62.5",
            Media::ArtNet => "Art-Net",
            Media::Dali => "DALI",
        }
    }
}

/// One bound port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Port {
    pub owner: PortOwner,
    pub direction: Direction,
    pub media: Media,
    pub address: PortAddress,
}

impl Port {
    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }
}

// Reconciliation compares ports by what they do, not who holds them: a
// reply page replaces the previous page of the same node, so the owner
// never differs within a comparison.
impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.media == other.media
            && self.address == other.address
    }
}

impl Eq for Port {}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Input => "Input",
            Direction::Output => "Output",
        };
        write!(f, "Port<{},{},{}>", direction, self.media.name(), self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_owner() {
        let local = Port {
            owner: PortOwner::Local,
            direction: Direction::Input,
            media: Media::Dmx,
            address: PortAddress::new(0x107).unwrap(),
        };
        let remote = Port {
            owner: PortOwner::Remote(Ipv4Addr::new(10, 10, 10, 10)),
            ..local
        };
        assert_eq!(local, remote);
    }

    #[test]
    fn test_display() {
        let port = Port {
            owner: PortOwner::Local,
            direction: Direction::Input,
            media: Media::Dmx,
            address: "1:0:7".parse().unwrap(),
        };
        assert_eq!(port.to_string(), "Port<Input,DMX,1:0:7>");
    }

    #[test]
    fn test_media_codes() {
        for code in 0..=6 {
            assert_eq!(Media::from_code(code).code(), code);
        }
        // direction bits above the media field are masked off
        assert_eq!(Media::from_code(0x80 | 1), Media::Midi);
        // unpublished codes collapse to DMX
        assert_eq!(Media::from_code(7), Media::Dmx);
    }
}
