/* Per-version packet decoders.
 *
 * Each protocol family turns a framed packet into zero or more decode
 * events. The original driver selected decode callbacks through
 * function pointers at identification time; here the bound profile's
 * version tag drives a single dispatch, one module per family. */

pub mod bitmap;
pub mod v1v2;
pub mod v3v5;
pub mod v4;
pub mod v6;
pub mod v7;
pub mod v8;

use crate::device::{PacketFields, Profile, ProtocolVersion};

/* An absolute touchpad sample headed for the gesture engine. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchSample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub fingers: u32,
    pub buttons: u32,
    /* hardware tap-and-drag edge (V1/V2 only): the gesture engine
     * enters drag mode directly */
    pub tap_drag_edge: bool,
}

/* What one packet decodes into. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    Touch(TouchSample),
    /* relative motion from a trackstick */
    Pointer { dx: i32, dy: i32, buttons: u32 },
    /* immediate scroll (hardware wheel, stick middle-button drag) */
    Scroll { vertical: i32, horizontal: i32 },
}

/* Session-lifetime decoder state.
 *
 * Exactly one multi-packet carry may be outstanding at a time; V4
 * reuses the same counter as a 0..=2 position index into its 3-packet
 * bitmap reports. `second_touch` is the bitmap resolver's corner cache,
 * cleared whenever the touch count drops below two. */
pub struct Decoder {
    profile: Profile,
    multi_packet: i32,
    multi_data: [u8; 6],
    second_touch: Option<usize>,
    prev_fin: i32,
    /* latched once a button bit is seen inside a trackstick packet */
    trackstick_buttons_quirk: bool,
    last_buttons: u32,
}

impl Decoder {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            multi_packet: 0,
            multi_data: [0; 6],
            second_touch: None,
            prev_fin: 0,
            trackstick_buttons_quirk: false,
            last_buttons: 0,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /* Drop any half-assembled bitmap report, e.g. on disable/re-enable. */
    pub fn reset(&mut self) {
        self.multi_packet = 0;
        self.second_touch = None;
        self.prev_fin = 0;
    }

    /* Decode one complete packet into events. */
    pub fn process(&mut self, packet: &[u8]) -> Vec<DecodeEvent> {
        let mut out = Vec::new();
        match self.profile.version {
            ProtocolVersion::V1 | ProtocolVersion::V2 => v1v2::process(self, packet, &mut out),
            ProtocolVersion::V3 | ProtocolVersion::V3Rushmore | ProtocolVersion::V5 => {
                v3v5::process(self, packet, &mut out)
            }
            ProtocolVersion::V4 => v4::process(self, packet, &mut out),
            ProtocolVersion::V6 => v6::process(self, packet, &mut out),
            ProtocolVersion::V7 => v7::process(self, packet, &mut out),
            ProtocolVersion::V8 => v8::process(self, packet, &mut out),
        }
        out
    }

    fn emit_touch(&mut self, out: &mut Vec<DecodeEvent>, sample: TouchSample) {
        self.last_buttons = sample.buttons;
        out.push(DecodeEvent::Touch(sample));
    }
}

/* Decode the raw x/y occupancy maps of a merged multi-packet report
 * into touch points; shared by the V3/V4/V5 processors. */
fn resolve_bitmap(decoder: &mut Decoder, fields: &mut PacketFields) -> u32 {
    bitmap::process_bitmap(&decoder.profile, &mut decoder.second_touch, fields)
}

#[cfg(test)]
pub(crate) fn test_profile(version: ProtocolVersion) -> Profile {
    use crate::device::{DeviceCaps, NibbleSet};

    let mut profile = Profile {
        version,
        byte0: 0x8f,
        mask0: 0x8f,
        fw_ver: [0; 3],
        caps: DeviceCaps::dualpoint(),
        x_max: 2000,
        y_max: 1400,
        x_bits: 15,
        y_bits: 11,
        x_res: 0,
        y_res: 0,
        nibble_set: NibbleSet::V3,
        addr_command: 0xec,
    };
    match version {
        ProtocolVersion::V1 | ProtocolVersion::V2 => {
            profile.x_max = 1023;
            profile.y_max = 767;
        }
        ProtocolVersion::V3Rushmore => {
            profile.x_bits = 16;
            profile.y_bits = 12;
        }
        ProtocolVersion::V5 => {
            profile.byte0 = 0xc8;
            profile.mask0 = 0xc8;
            profile.caps = DeviceCaps::none();
            profile.x_bits = 23;
            profile.y_bits = 12;
        }
        ProtocolVersion::V6 => {
            profile.byte0 = 0xc8;
            profile.mask0 = 0xc8;
            profile.x_max = 2047;
            profile.y_max = 1535;
        }
        ProtocolVersion::V7 => {
            profile.byte0 = 0x48;
            profile.mask0 = 0x48;
            profile.x_max = 0xfff;
            profile.y_max = 0x7ff;
        }
        ProtocolVersion::V8 => {
            profile.byte0 = 0x18;
            profile.mask0 = 0x18;
            profile.x_max = 8160;
            profile.y_max = 4080;
        }
        _ => {}
    }
    profile
}
