/* Device model: protocol versions, capability flags, the bound
 * per-device profile, and the decoded-packet field record shared by
 * every protocol family. */

use std::fmt;

pub const MAX_TOUCHES: usize = 4;

/* The eight incompatible ALPS packet format generations. The numeric
 * rank mirrors the hardware documentation (V3 Rushmore sits between V3
 * and V4) and is what "below V5" style framing rules compare against. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
    V3Rushmore,
    V4,
    V5,
    V6,
    V7,
    V8,
}

impl ProtocolVersion {
    pub fn rank(self) -> u16 {
        match self {
            ProtocolVersion::V1 => 0x100,
            ProtocolVersion::V2 => 0x200,
            ProtocolVersion::V3 => 0x300,
            ProtocolVersion::V3Rushmore => 0x310,
            ProtocolVersion::V4 => 0x400,
            ProtocolVersion::V5 => 0x500,
            ProtocolVersion::V6 => 0x600,
            ProtocolVersion::V7 => 0x700,
            ProtocolVersion::V8 => 0x800,
        }
    }

    /* V4 reports 8-byte packets, everything else 6. */
    pub fn packet_len(self) -> usize {
        match self {
            ProtocolVersion::V4 => 8,
            _ => 6,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolVersion::V1 => "V1",
            ProtocolVersion::V2 => "V2",
            ProtocolVersion::V3 => "V3 Pinnacle",
            ProtocolVersion::V3Rushmore => "V3 Rushmore",
            ProtocolVersion::V4 => "V4",
            ProtocolVersion::V5 => "V5 Dolphin",
            ProtocolVersion::V6 => "V6",
            ProtocolVersion::V7 => "V7",
            ProtocolVersion::V8 => "V8 SS4",
        };
        f.write_str(name)
    }
}

/* Capability flags, autodetected at identification time. The trackstick
 * probe may clear `dualpoint` afterwards; nothing else changes at
 * runtime. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    /* touchpad has a trackstick */
    pub dualpoint: bool,
    /* device has a pass-through port */
    pub passthrough: bool,
    /* hardware wheel present */
    pub wheel: bool,
    /* front & back buttons, first variant */
    pub fw_bk_1: bool,
    /* front & back buttons, second variant */
    pub fw_bk_2: bool,
    /* 4-direction button present */
    pub four_buttons: bool,
    /* 3-byte PS/2 packets interleaved with 6-byte ALPS packets */
    pub ps2_interleaved: bool,
    /* separate stick button bits in byte 0 */
    pub stick_bits: bool,
    /* device is a clickpad */
    pub buttonpad: bool,
    /* trackstick reports pressure */
    pub dualpoint_with_pressure: bool,
}

impl DeviceCaps {
    pub const fn dualpoint() -> Self {
        let mut caps = Self::none();
        caps.dualpoint = true;
        caps
    }

    pub const fn none() -> Self {
        Self {
            dualpoint: false,
            passthrough: false,
            wheel: false,
            fw_bk_1: false,
            fw_bk_2: false,
            four_buttons: false,
            ps2_interleaved: false,
            stick_bits: false,
            buttonpad: false,
            dualpoint_with_pressure: false,
        }
    }
}

/* Which nibble-command encoding the register protocol uses. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NibbleSet {
    V3,
    V4,
    V6,
}

/* The per-device protocol profile, bound once at identification and
 * read-only afterwards except for the trackstick-presence narrowing. */
#[derive(Debug, Clone)]
pub struct Profile {
    pub version: ProtocolVersion,
    /* first report byte, masked with `mask0`, must equal `byte0` */
    pub byte0: u8,
    pub mask0: u8,
    /* cached EC report (firmware version) */
    pub fw_ver: [u8; 3],
    pub caps: DeviceCaps,
    pub x_max: i32,
    pub y_max: i32,
    /* sensor line counts for the bitmap formats */
    pub x_bits: i32,
    pub y_bits: i32,
    /* units per mm, filled in by the resolution query where supported */
    pub x_res: u32,
    pub y_res: u32,
    pub nibble_set: NibbleSet,
    /* PS/2 command announcing a register address follows */
    pub addr_command: u8,
}

impl Profile {
    pub fn packet_len(&self) -> usize {
        self.version.packet_len()
    }
}

/* One touch position. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchPos {
    pub x: i32,
    pub y: i32,
}

/* Decoded view of one report packet, rebuilt from zero on every decode
 * call. A record with `is_mp` set carries only bitmap data and never
 * leaves the decoder as a touch event. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFields {
    /* bitmap of active X sensor lines (semi-mt formats) */
    pub x_map: u32,
    /* bitmap of active Y sensor lines */
    pub y_map: u32,
    pub fingers: u32,
    pub pressure: i32,
    /* single-touch position */
    pub st: TouchPos,
    /* multi-touch positions */
    pub mt: [TouchPos; MAX_TOUCHES],
    /* packet is the first of a multi-packet report */
    pub first_mp: bool,
    /* packet is the second half of a multi-packet report */
    pub is_mp: bool,
    pub left: bool,
    pub right: bool,
    pub middle: bool,
    pub ts_left: bool,
    pub ts_right: bool,
    pub ts_middle: bool,
}

impl PacketFields {
    pub fn button_mask(&self) -> u32 {
        let mut buttons = 0;
        if self.left {
            buttons |= crate::events::BUTTON_LEFT;
        }
        if self.right {
            buttons |= crate::events::BUTTON_RIGHT;
        }
        if self.middle {
            buttons |= crate::events::BUTTON_MIDDLE;
        }
        buttons
    }

    pub fn ts_button_mask(&self) -> u32 {
        let mut buttons = 0;
        if self.ts_left {
            buttons |= crate::events::BUTTON_LEFT;
        }
        if self.ts_right {
            buttons |= crate::events::BUTTON_RIGHT;
        }
        if self.ts_middle {
            buttons |= crate::events::BUTTON_MIDDLE;
        }
        buttons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_len_per_version() {
        assert_eq!(ProtocolVersion::V4.packet_len(), 8);
        assert_eq!(ProtocolVersion::V2.packet_len(), 6);
        assert_eq!(ProtocolVersion::V8.packet_len(), 6);
    }

    #[test]
    fn rank_ordering_matches_framer_rules() {
        /* everything below V5 gets the high-bit check */
        for v in [
            ProtocolVersion::V1,
            ProtocolVersion::V2,
            ProtocolVersion::V3,
            ProtocolVersion::V3Rushmore,
            ProtocolVersion::V4,
        ] {
            assert!(v.rank() < ProtocolVersion::V5.rank());
        }
        assert!(ProtocolVersion::V7.rank() > ProtocolVersion::V5.rank());
    }

    #[test]
    fn button_mask_bits() {
        let f = PacketFields {
            left: true,
            middle: true,
            ..Default::default()
        };
        assert_eq!(f.button_mask(), 0x05);
        assert_eq!(f.ts_button_mask(), 0x00);
    }
}
