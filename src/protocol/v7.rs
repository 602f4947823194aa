/* V7 decoder.
 *
 * The packet kind is derived from bit patterns in bytes 0 and 4,
 * checked in a fixed priority order: the two-finger bit wins over the
 * multi bit, which wins over the discontinuity marker, which wins over
 * the idle pattern. */

use tracing::debug;

use super::{DecodeEvent, Decoder, TouchSample};
use crate::device::{PacketFields, TouchPos};
use crate::events::{BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V7PacketId {
    /* no finger and no button activity */
    Idle,
    /* one or two non-resting fingers, or button activity */
    Two,
    /* at least three non-resting fingers */
    Multi,
    /* finger position not continuous with the previous packet */
    New,
    Unknown,
}

pub fn packet_id(p: &[u8]) -> V7PacketId {
    if p[4] & 0x40 != 0 {
        V7PacketId::Two
    } else if p[4] & 0x01 != 0 {
        V7PacketId::Multi
    } else if (p[0] & 0x10) != 0 && (p[4] & 0x43) == 0 {
        V7PacketId::New
    } else if p[1] == 0x00 && p[4] == 0x00 {
        V7PacketId::Idle
    } else {
        V7PacketId::Unknown
    }
}

fn finger_coordinates(mt: &mut [TouchPos], p: &[u8], id: V7PacketId) {
    mt[0].x = (i32::from(p[2] & 0x80) << 4)
        | (i32::from(p[2] & 0x3f) << 5)
        | (i32::from(p[3] & 0x30) >> 1)
        | i32::from(p[3] & 0x07);
    mt[0].y = (i32::from(p[1]) << 3) | i32::from(p[0] & 0x07);

    mt[1].x = (i32::from(p[3] & 0x80) << 4)
        | (i32::from(p[4] & 0x80) << 3)
        | (i32::from(p[4] & 0x3f) << 4);
    mt[1].y = (i32::from(p[5] & 0x80) << 3) | (i32::from(p[5] & 0x3f) << 4);

    match id {
        V7PacketId::Two => {
            mt[1].x &= !0x000f;
            mt[1].y |= 0x000f;
            /* false positive where both axes peg at max */
            if mt[1].y == 0x7ff && mt[1].x == 0xff0 {
                mt[1].x = 0;
                /* y gets normalized below */
            }
        }
        V7PacketId::Multi => {
            mt[1].x &= !0x003f;
            mt[1].y &= !0x0020;
            mt[1].y |= i32::from(p[4] & 0x02) << 4;
            mt[1].y |= 0x001f;
        }
        V7PacketId::New => {
            mt[1].x &= !0x003f;
            mt[1].x |= i32::from(p[0] & 0x20);
            mt[1].y |= 0x000f;
        }
        _ => {}
    }

    mt[0].y = 0x7ff - mt[0].y;
    mt[1].y = 0x7ff - mt[1].y;
}

fn mt_count(mt: &[TouchPos]) -> u32 {
    mt.iter().filter(|p| p.x != 0 || p.y != 0).count() as u32
}

/* Outcome of a V7 field decode. */
enum V7Decode {
    Report,
    /* NEW packets lack reliable button, finger-count and second-slot x
     * data; they are deliberately ignored. Idle state is still a
     * report (it drives lift detection). */
    Ignore,
    Invalid,
}

fn decode_fields(decoder: &mut Decoder, f: &mut PacketFields, p: &[u8]) -> V7Decode {
    let id = packet_id(p);
    match id {
        V7PacketId::Idle => return V7Decode::Report,
        V7PacketId::Unknown => return V7Decode::Invalid,
        V7PacketId::New => return V7Decode::Ignore,
        _ => {}
    }

    finger_coordinates(&mut f.mt, p, id);

    if id == V7PacketId::Two {
        f.fingers = mt_count(&f.mt);
    } else {
        /* multi: 3 + 2-bit extension */
        f.fingers = 3 + u32::from(p[5] & 0x03);
    }

    f.left = p[0] & 0x80 != 0;
    if decoder.profile.caps.buttonpad {
        /* clickpads fold the button bit positions into extra fingers */
        if p[0] & 0x20 != 0 {
            f.fingers += 1;
        }
        if p[0] & 0x10 != 0 {
            f.fingers += 1;
        }
    } else {
        f.right = p[0] & 0x20 != 0;
        f.middle = p[0] & 0x10 != 0;
    }

    /* Sometimes a single touch lands in slot 1 rather than slot 0 */
    if f.fingers == 1 && f.mt[0].x == 0 && f.mt[0].y == 0 {
        f.mt[0] = f.mt[1];
        f.mt[1] = TouchPos::default();
    }

    V7Decode::Report
}

fn process_trackstick(decoder: &mut Decoder, packet: &[u8]) {
    if !decoder.profile.caps.dualpoint {
        debug!("rejected trackstick packet from non-DualPoint device");
        return;
    }

    let x = i32::from(packet[2] & 0xbf) | (i32::from(packet[3] & 0x10) << 2);
    let y = i32::from(packet[3] & 0x07)
        | i32::from(packet[4] & 0xb8)
        | (i32::from(packet[3] & 0x20) << 1);
    let z = i32::from(packet[5] & 0x3f) | (i32::from(packet[3] & 0x80) >> 1);

    let mut buttons = 0;
    if packet[1] & 0x01 != 0 {
        buttons |= BUTTON_LEFT;
    }
    if packet[1] & 0x02 != 0 {
        buttons |= BUTTON_RIGHT;
    }
    if packet[1] & 0x04 != 0 {
        buttons |= BUTTON_MIDDLE;
    }

    /* TODO: validate the V7 stick coordinate layout on real hardware
     * before dispatching motion from it. */
    debug!("v7 trackstick: x={x} y={y} z={z} buttons={buttons:#x}");
}

fn process_touchpad(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    let mut f = PacketFields::default();

    match decode_fields(decoder, &mut f, packet) {
        V7Decode::Report => {}
        V7Decode::Ignore | V7Decode::Invalid => return,
    }

    let mut buttons = f.button_mask();
    if decoder.profile.caps.dualpoint && !decoder.trackstick_buttons_quirk {
        buttons |= f.ts_button_mask();
    }

    let fingers = f.fingers;

    /* Reverse y to put 0 at the bottom for the gesture engine */
    f.mt[0].y = decoder.profile.y_max - f.mt[0].y;
    f.mt[1].y = decoder.profile.y_max - f.mt[1].y;

    /* V7 reports no pressure; synthesize one from the finger count */
    let pressure = if fingers > 0 { 40 } else { 0 };

    decoder.emit_touch(
        out,
        TouchSample {
            x: f.mt[0].x,
            y: f.mt[0].y,
            z: pressure,
            fingers,
            buttons,
            tap_drag_edge: false,
        },
    );
}

pub(super) fn process(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    if packet[0] == 0x48 && (packet[4] & 0x47) == 0x06 {
        process_trackstick(decoder, packet);
    } else {
        process_touchpad(decoder, packet, out);
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DecodeEvent, Decoder, test_profile};
    use super::*;
    use crate::device::ProtocolVersion;

    #[test]
    fn two_finger_bit_wins_regardless_of_other_bits() {
        /* byte4 bit 6 set must classify as TWO even with the multi and
         * new patterns also present */
        let p = [0x58, 0x00, 0x40, 0x48, 0x40 | 0x01, 0x00];
        assert_eq!(packet_id(&p), V7PacketId::Two);
    }

    #[test]
    fn priority_order() {
        assert_eq!(packet_id(&[0x48, 0x00, 0x40, 0x48, 0x01, 0x00]), V7PacketId::Multi);
        assert_eq!(packet_id(&[0x58, 0x00, 0x40, 0x48, 0x00, 0x00]), V7PacketId::New);
        assert_eq!(packet_id(&[0x48, 0x00, 0x40, 0x48, 0x00, 0x00]), V7PacketId::Idle);
        assert_eq!(packet_id(&[0x48, 0x10, 0x40, 0x48, 0x00, 0x00]), V7PacketId::Unknown);
    }

    #[test]
    fn idle_packet_reports_zero_fingers() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V7));
        let events = d.process(&[0x48, 0x00, 0x40, 0x48, 0x00, 0x00]);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.fingers, 0);
                assert_eq!(t.z, 0);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn new_packet_is_ignored() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V7));
        assert!(d.process(&[0x58, 0x00, 0x40, 0x48, 0x00, 0x00]).is_empty());
    }

    #[test]
    fn unknown_packet_is_ignored() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V7));
        assert!(d.process(&[0x48, 0x10, 0x40, 0x48, 0x00, 0x00]).is_empty());
    }

    #[test]
    fn single_touch_in_slot_one_is_swapped() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V7));
        /* TWO packet with slot 0 empty and slot 1 populated */
        let mut p = [0x48u8, 0x00, 0x00, 0x48, 0x40, 0x00];
        /* slot0 y bits: byte1 = 0, byte0 low bits 0 -> y raw 0 -> 0x7ff
         * after inversion; force slot 0 to origin instead */
        p[1] = 0xff;
        p[0] |= 0x07;
        /* slot1 x via byte4 bits */
        p[4] |= 0x22;
        let events = d.process(&p);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.fingers, 1);
                assert_ne!((t.x, t.y), (0, 0));
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn buttonpad_folds_buttons_into_fingers() {
        let mut profile = test_profile(ProtocolVersion::V7);
        profile.caps.buttonpad = true;
        let mut d = Decoder::new(profile);
        /* multi packet with both fold bits set */
        let p = [0x48 | 0x30, 0x10, 0x40, 0x48, 0x01, 0x00];
        match d.process(&p)[0] {
            DecodeEvent::Touch(t) => {
                /* 3 + 0 extension + 2 folded */
                assert_eq!(t.fingers, 5);
                assert_eq!(t.buttons & 0x06, 0);
            }
            ref other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn non_buttonpad_reads_right_middle() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V7));
        let p = [0x48 | 0x80 | 0x20, 0x10, 0x40, 0x48, 0x01, 0x00];
        match d.process(&p)[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.buttons & 0x01, 0x01);
                assert_eq!(t.buttons & 0x02, 0x02);
            }
            ref other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn two_finger_false_positive_cleared() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V7));
        /* craft slot 1 pegged at x=0xff0 and raw y=0x7ff */
        let p = [0x48, 0x00, 0x00, 0x80 | 0x48, 0x40 | 0x80 | 0x3f, 0xbf];
        let events = d.process(&p);
        match events[0] {
            DecodeEvent::Touch(t) => {
                /* slot 1 was zeroed; slot 0 alone would make this a
                 * single (or zero) finger report */
                assert!(t.fingers <= 1);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }
}
