/* V3/V5 family: Pinnacle, Rushmore and Dolphin.
 *
 * Three structurally different 6-byte layouts sharing one two-packet
 * bitmap scheme: a position packet flagged `first_mp` is buffered, the
 * following bitmap packet (`is_mp`) supplies the occupancy maps, and
 * the pair is merged using the *first* packet's coordinate data.
 * Trackstick reports ride the same stream on V3, tagged by 0x3f in the
 * last byte. */

use tracing::debug;

use super::{DecodeEvent, Decoder, TouchSample, resolve_bitmap};
use crate::device::{PacketFields, Profile, ProtocolVersion};
use crate::events::{BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT};

fn decode_buttons(f: &mut PacketFields, p: &[u8]) {
    f.left = p[3] & 0x01 != 0;
    f.right = p[3] & 0x02 != 0;
    f.middle = p[3] & 0x04 != 0;

    f.ts_left = p[3] & 0x10 != 0;
    f.ts_right = p[3] & 0x20 != 0;
    f.ts_middle = p[3] & 0x40 != 0;
}

pub fn decode_pinnacle(_profile: &Profile, f: &mut PacketFields, p: &[u8]) {
    f.first_mp = p[4] & 0x40 != 0;
    f.is_mp = p[0] & 0x40 != 0;

    if f.is_mp {
        f.fingers = u32::from(p[5] & 0x03) + 1;
        f.x_map = (u32::from(p[4] & 0x7e) << 8)
            | (u32::from(p[1] & 0x7f) << 2)
            | (u32::from(p[0] & 0x30) >> 4);
        f.y_map = (u32::from(p[3] & 0x70) << 4)
            | (u32::from(p[2] & 0x7f) << 1)
            | u32::from(p[4] & 0x01);
    } else {
        f.st.x = (i32::from(p[1] & 0x7f) << 4)
            | (i32::from(p[4] & 0x30) >> 2)
            | (i32::from(p[0] & 0x30) >> 4);
        f.st.y = (i32::from(p[2] & 0x7f) << 4) | i32::from(p[4] & 0x0f);
        f.pressure = i32::from(p[5] & 0x7f);
        decode_buttons(f, p);
    }
}

pub fn decode_rushmore(_profile: &Profile, f: &mut PacketFields, p: &[u8]) {
    f.first_mp = p[4] & 0x40 != 0;
    f.is_mp = p[5] & 0x40 != 0;

    if f.is_mp {
        f.fingers = u32::from((p[5] & 0x03).max((p[5] >> 2) & 0x03)) + 1;
        f.x_map = (u32::from(p[5] & 0x10) << 11)
            | (u32::from(p[4] & 0x7e) << 8)
            | (u32::from(p[1] & 0x7f) << 2)
            | (u32::from(p[0] & 0x30) >> 4);
        f.y_map = (u32::from(p[5] & 0x20) << 6)
            | (u32::from(p[3] & 0x70) << 4)
            | (u32::from(p[2] & 0x7f) << 1)
            | u32::from(p[4] & 0x01);
    } else {
        f.st.x = (i32::from(p[1] & 0x7f) << 4)
            | (i32::from(p[4] & 0x30) >> 2)
            | (i32::from(p[0] & 0x30) >> 4);
        f.st.y = (i32::from(p[2] & 0x7f) << 4) | i32::from(p[4] & 0x0f);
        f.pressure = i32::from(p[5] & 0x7f);
        decode_buttons(f, p);
    }
}

pub fn decode_dolphin(profile: &Profile, f: &mut PacketFields, p: &[u8]) {
    f.first_mp = p[0] & 0x02 != 0;
    f.is_mp = p[0] & 0x20 != 0;

    if !f.is_mp {
        f.st.x = i32::from(p[1] & 0x7f) | (i32::from(p[4] & 0x0f) << 7);
        f.st.y = i32::from(p[2] & 0x7f) | (i32::from(p[4] & 0xf0) << 3);
        f.pressure = if p[0] & 0x04 != 0 {
            0
        } else {
            i32::from(p[5] & 0x7f)
        };
        decode_buttons(f, p);
    } else {
        f.fingers = u32::from((p[0] & 0x06) >> 1 | (p[0] & 0x10) >> 2);

        /* 35-bit palm profile packed over five bytes */
        let palm_data: u64 = u64::from(p[1] & 0x7f)
            | (u64::from(p[2] & 0x7f) << 7)
            | (u64::from(p[4] & 0x7f) << 14)
            | (u64::from(p[5] & 0x7f) << 21)
            | (u64::from(p[3] & 0x07) << 28)
            | (u64::from(p[3] & 0x70) << 27)
            | (u64::from(p[0] & 0x01) << 34);

        /* y-profile lives in bits 0..y_bits, x-profile right above it */
        f.y_map = (palm_data & ((1u64 << profile.y_bits) - 1)) as u32;
        f.x_map = ((palm_data >> profile.y_bits) & ((1u64 << profile.x_bits) - 1)) as u32;
    }
}

fn decode_fields(decoder: &Decoder, f: &mut PacketFields, packet: &[u8]) {
    match decoder.profile.version {
        ProtocolVersion::V3 => decode_pinnacle(&decoder.profile, f, packet),
        ProtocolVersion::V3Rushmore => decode_rushmore(&decoder.profile, f, packet),
        _ => decode_dolphin(&decoder.profile, f, packet),
    }
}

/* Touchpad position/bitmap packets for V3, Rushmore and Dolphin. */
pub(super) fn process_touchpad(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    let mut f = PacketFields::default();
    let mut fingers: i32 = 0;

    decode_fields(decoder, &mut f, packet);

    /* A bitmap packet should always follow a position packet with its
     * first_mp bit set; there is no single feature distinguishing the
     * two otherwise. */
    if decoder.multi_packet != 0 {
        if f.is_mp {
            fingers = f.fingers as i32;
            /* Bitmap resolution uses the position packet's coordinate
             * data, so decode the carried packet on top; the occupancy
             * maps decoded above survive. */
            let carried = decoder.multi_data;
            decode_fields(decoder, &mut f, &carried);
            if resolve_bitmap(decoder, &mut f) == 0 {
                fingers = 0; /* use st data */
            }
        } else {
            /* position packet after a lone first_mp: drop the carry */
            decoder.multi_packet = 0;
        }
    }

    /* Still flagged is_mp here means the bitmap half arrived without
     * its first half; drop the frame. */
    if f.is_mp {
        return;
    }

    if decoder.multi_packet == 0 && f.first_mp {
        decoder.multi_packet = 1;
        decoder.multi_data.copy_from_slice(&packet[..6]);
        return;
    }

    decoder.multi_packet = 0;

    /* The hardware occasionally sends a lone z == 0 sample mid-stream
     * while x/y are still valid; these pass through as genuine
     * zero-pressure samples. */

    /* Use st data when there is no mt data */
    if fingers < 2 {
        f.mt[0] = f.st;
        fingers = if f.pressure > 0 { 1 } else { 0 };
        decoder.second_touch = None;
    }

    let mut buttons = f.button_mask();
    if decoder.profile.caps.dualpoint && !decoder.trackstick_buttons_quirk {
        buttons |= f.ts_button_mask();
    }

    /* Reverse y to put 0 at the bottom for the gesture engine */
    f.mt[0].y = decoder.profile.y_max - f.mt[0].y;
    f.mt[1].y = decoder.profile.y_max - f.mt[1].y;

    decoder.emit_touch(
        out,
        TouchSample {
            x: f.mt[0].x,
            y: f.mt[0].y,
            z: f.pressure,
            fingers: fingers as u32,
            buttons,
            tap_drag_edge: false,
        },
    );
}

/* V3 trackstick packets.
 *
 * Most models report the stick buttons in the touchpad packets; a few
 * report them here. There is no way to tell upfront, so stick-packet
 * button parsing is latched on the first button bit actually observed
 * in one. */
pub(super) fn process_trackstick(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    if !decoder.profile.caps.dualpoint {
        return;
    }

    if packet[0] & 0x40 == 0 {
        debug!("bad trackstick packet, disregarding");
        return;
    }

    /* End-of-stream marker packets carry 0x7f in bytes 1-3. */
    if packet[1] == 0x7f && packet[2] == 0x7f && packet[3] == 0x7f {
        return;
    }

    let mut x = i32::from((((packet[0] & 0x20) << 2) | (packet[1] & 0x7f)) as i8);
    let mut y = i32::from((((packet[0] & 0x10) << 3) | (packet[2] & 0x7f)) as i8);
    let z = i32::from((packet[4] & 0x7c) >> 2);

    /* Prevent a pointer jump on finger lift */
    if x.abs() >= 0x7f && y.abs() >= 0x7f {
        x = 0;
        y = 0;
    }

    /* The raw deltas are too hot to use directly */
    x /= 3;
    y /= 3;
    y = -y;

    let left = packet[3] & 0x01 != 0;
    let right = packet[3] & 0x02 != 0;
    let middle = packet[3] & 0x04 != 0;

    if !decoder.trackstick_buttons_quirk && (left || right || middle) {
        decoder.trackstick_buttons_quirk = true;
    }

    let mut raw_buttons = 0;
    if decoder.trackstick_buttons_quirk {
        if left {
            raw_buttons |= BUTTON_LEFT;
        }
        if right {
            raw_buttons |= BUTTON_RIGHT;
        }
        if middle {
            raw_buttons |= BUTTON_MIDDLE;
        }
    }

    /* Button state may live in the touchpad packets instead; never drop
     * a button that is still held there. */
    let buttons = if raw_buttons == 0 {
        decoder.last_buttons
    } else {
        decoder.last_buttons = raw_buttons;
        raw_buttons
    };

    debug!("trackstick: dx={x} dy={y} z={z} buttons={buttons:#x}");

    /* Middle button held redirects stick motion into scrolling. */
    if buttons & BUTTON_MIDDLE == 0 {
        out.push(DecodeEvent::Pointer {
            dx: x,
            dy: y,
            buttons,
        });
    } else {
        out.push(DecodeEvent::Scroll {
            vertical: -y,
            horizontal: -x,
        });
    }
}

pub(super) fn process(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    /* V3 trackstick packets always carry 0x3f in the last byte, a
     * value never observed in the touchpad layouts. Dolphin (V5) has
     * no stick path. */
    if decoder.profile.version != ProtocolVersion::V5 && packet[5] == 0x3f {
        process_trackstick(decoder, packet, out);
        return;
    }

    process_touchpad(decoder, packet, out);
}

#[cfg(test)]
mod tests {
    use super::super::{DecodeEvent, Decoder, test_profile};
    use super::*;
    use crate::device::ProtocolVersion;

    /* Build a Pinnacle position packet for the given coordinates. */
    fn pinnacle_position(x: i32, y: i32, z: u8, first_mp: bool) -> [u8; 6] {
        let mut p = [0u8; 6];
        p[0] = 0x8f | (((x as u8) & 0x03) << 4);
        p[1] = ((x >> 4) & 0x7f) as u8;
        p[2] = ((y >> 4) & 0x7f) as u8;
        p[3] = 0x00;
        p[4] = (((x << 2) & 0x30) | (y & 0x0f)) as u8;
        if first_mp {
            p[4] |= 0x40;
        }
        p[5] = z & 0x7f;
        p
    }

    #[test]
    fn pinnacle_position_roundtrip() {
        let profile = test_profile(ProtocolVersion::V3);
        let mut f = PacketFields::default();
        let p = pinnacle_position(0x512, 0x3a7, 60, false);
        decode_pinnacle(&profile, &mut f, &p);
        assert!(!f.is_mp);
        assert!(!f.first_mp);
        assert_eq!(f.st.x, 0x512);
        assert_eq!(f.st.y, 0x3a7);
        assert_eq!(f.pressure, 60);
    }

    #[test]
    fn pinnacle_bitmap_fields() {
        let profile = test_profile(ProtocolVersion::V3);
        let mut f = PacketFields::default();
        /* is_mp flagged in byte 0 bit 6 */
        let p = [0x8f | 0x40 | 0x30, 0x7f, 0x55, 0x70, 0x01, 0x02];
        decode_pinnacle(&profile, &mut f, &p);
        assert!(f.is_mp);
        assert_eq!(f.fingers, 3);
        assert_eq!(f.x_map, (0x7f << 2) | 0x03);
        assert_eq!(f.y_map, (0x70 << 4) | (0x55 << 1) | 0x01);
    }

    #[test]
    fn rushmore_bitmap_carries_extra_bits() {
        let profile = test_profile(ProtocolVersion::V3Rushmore);
        let mut f = PacketFields::default();
        /* is_mp via byte 5 bit 6; map extension bits 4/5 of byte 5 */
        let p = [0x8f, 0x00, 0x00, 0x00, 0x00, 0x40 | 0x30 | 0x01];
        decode_rushmore(&profile, &mut f, &p);
        assert!(f.is_mp);
        /* fingers = max(1, 0) + 1 from the two 2-bit fields */
        assert_eq!(f.fingers, 2);
        assert_eq!(f.x_map & (1 << 15), 1 << 15);
        assert_eq!(f.y_map & (1 << 11), 1 << 11);
    }

    #[test]
    fn dolphin_palm_split() {
        let mut profile = test_profile(ProtocolVersion::V5);
        profile.x_bits = 23;
        profile.y_bits = 12;
        let mut f = PacketFields::default();
        /* is_mp via byte 0 bit 5; set the low 7 palm bits and bit 34 */
        let p = [0x20 | 0x01, 0x7f, 0x00, 0x00, 0x00, 0x00];
        decode_dolphin(&profile, &mut f, &p);
        assert!(f.is_mp);
        /* low 12 bits are the y-profile */
        assert_eq!(f.y_map, 0x7f);
        /* bit 34 lands at x-profile bit 22 */
        assert_eq!(f.x_map, 1 << 22);
    }

    #[test]
    fn dolphin_zero_pressure_flag() {
        let profile = test_profile(ProtocolVersion::V5);
        let mut f = PacketFields::default();
        let p = [0x04, 0x10, 0x20, 0x00, 0x00, 0x50];
        decode_dolphin(&profile, &mut f, &p);
        assert_eq!(f.pressure, 0);
    }

    #[test]
    fn bitmap_pair_merges_into_two_finger_touch() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        /* position packet announcing a bitmap follows */
        let first = pinnacle_position(0x200, 0x180, 50, true);
        assert!(d.process(&first).is_empty());

        /* bitmap packet: two x runs, two y runs */
        let mut bitmap = [0u8; 6];
        bitmap[0] = 0x8f | 0x40;
        bitmap[1] = 0b0000_1100; /* x bits 4-5 */
        bitmap[2] = 0b0001_1000; /* y bits 4-5 */
        bitmap[4] = 0x02; /* x bit 9 */
        bitmap[5] = 0x01; /* fingers field */
        let events = d.process(&bitmap);
        assert_eq!(events.len(), 1);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.fingers, 2);
                assert_eq!(t.x, 0x200);
                /* y was reversed for the gesture engine */
                assert_eq!(t.y, d.profile().y_max - 0x180);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn lone_bitmap_packet_is_dropped() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        let mut bitmap = [0u8; 6];
        bitmap[0] = 0x8f | 0x40;
        bitmap[1] = 0x0c;
        bitmap[2] = 0x18;
        assert!(d.process(&bitmap).is_empty());
    }

    #[test]
    fn position_packet_after_carry_discards_carry() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        let first = pinnacle_position(0x200, 0x180, 50, true);
        assert!(d.process(&first).is_empty());
        /* plain position packet instead of the bitmap half */
        let plain = pinnacle_position(0x210, 0x188, 52, false);
        let events = d.process(&plain);
        assert_eq!(events.len(), 1);
        match events[0] {
            DecodeEvent::Touch(t) => assert_eq!(t.fingers, 1),
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn trackstick_packet_decodes_and_scales() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        /* byte0 bit 6 set, x = 30, y = 9, no buttons */
        let packet = [0x40, 30, 9, 0x00, 0x20, 0x3f];
        let events = d.process(&packet);
        match events[0] {
            DecodeEvent::Pointer { dx, dy, buttons } => {
                assert_eq!(dx, 10);
                assert_eq!(dy, -3);
                assert_eq!(buttons, 0);
            }
            other => panic!("expected pointer, got {other:?}"),
        }
    }

    #[test]
    fn trackstick_button_quirk_latches() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        /* stick packet with the left button bit: latches the quirk */
        let packet = [0x40, 12, 3, 0x01, 0x20, 0x3f];
        match d.process(&packet)[0] {
            DecodeEvent::Pointer { buttons, .. } => assert_eq!(buttons, 0x01),
            ref other => panic!("expected pointer, got {other:?}"),
        }

        /* once latched, a buttonless stick packet falls back to the
         * last button state rather than reporting release */
        let packet = [0x40, 12, 3, 0x00, 0x20, 0x3f];
        match d.process(&packet)[0] {
            DecodeEvent::Pointer { buttons, .. } => assert_eq!(buttons, 0x01),
            ref other => panic!("expected pointer, got {other:?}"),
        }
    }

    #[test]
    fn trackstick_middle_button_scrolls() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        let packet = [0x40, 30, 9, 0x04, 0x20, 0x3f];
        match d.process(&packet)[0] {
            DecodeEvent::Scroll {
                vertical,
                horizontal,
            } => {
                assert_eq!(vertical, 3);
                assert_eq!(horizontal, -10);
            }
            ref other => panic!("expected scroll, got {other:?}"),
        }
    }

    #[test]
    fn trackstick_end_of_stream_filtered() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V3));
        let packet = [0x40, 0x7f, 0x7f, 0x7f, 0x20, 0x3f];
        assert!(d.process(&packet).is_empty());
    }
}
