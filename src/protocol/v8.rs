/* V8 (SS4) decoder.
 *
 * A 2-bit field in byte 3 selects the packet kind, except that idle
 * additionally requires an exact match against the idle byte pattern,
 * since sparse one-finger packets share the 2-bit field. Two-finger
 * packets may flag a continuation, in which case they are buffered and
 * merged with the following multi packet for up to five fingers. */

use tracing::debug;

use super::{DecodeEvent, Decoder, TouchSample};
use crate::device::{PacketFields, TouchPos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ss4PacketId {
    Idle,
    One,
    Two,
    Multi,
    Stick,
}

/* no-data sentinel coordinates on touch slot 3 */
const MFPACKET_NO_AX: i32 = 8160;
const MFPACKET_NO_AY: i32 = 4080;
const MFPACKET_NO_AX_BL: i32 = 8176;
const MFPACKET_NO_AY_BL: i32 = 4088;

pub fn packet_id(b: &[u8]) -> Ss4PacketId {
    match b[3] & 0x30 {
        0x00 => {
            if b[0] == 0x18
                && b[1] == 0x10
                && b[2] == 0x00
                && (b[3] & 0x88) == 0x08
                && b[4] == 0x10
                && b[5] == 0x00
            {
                Ss4PacketId::Idle
            } else {
                Ss4PacketId::One
            }
        }
        0x10 => Ss4PacketId::Two,
        0x20 => Ss4PacketId::Stick,
        _ => Ss4PacketId::Multi,
    }
}

fn one_finger_x(b: &[u8]) -> i32 {
    i32::from(b[0] & 0x07)
        | ((i32::from(b[1]) << 3) & 0x0078)
        | ((i32::from(b[1]) << 2) & 0x0380)
        | ((i32::from(b[2]) << 5) & 0x1c00)
}

fn one_finger_y(b: &[u8]) -> i32 {
    i32::from(b[2] & 0x0f)
        | ((i32::from(b[3]) >> 2) & 0x0030)
        | ((i32::from(b[4]) << 6) & 0x03c0)
        | ((i32::from(b[4]) << 5) & 0x0c00)
}

fn one_finger_z(b: &[u8]) -> i32 {
    i32::from(b[5] & 0x0f) | ((i32::from(b[5]) >> 1) & 0x70) | i32::from(b[4] & 0x80)
}

/* standard (non-buttonpad) multi-finger slot layout */
fn std_mf_x(b: &[u8], i: usize) -> i32 {
    ((i32::from(b[i * 3]) << 5) & 0x00e0) | ((i32::from(b[1 + i * 3]) << 5) & 0x1f00)
}

fn std_mf_y(b: &[u8], i: usize) -> i32 {
    ((i32::from(b[1 + i * 3]) << 3) & 0x0010)
        | ((i32::from(b[2 + i * 3]) << 5) & 0x01e0)
        | ((i32::from(b[2 + i * 3]) << 4) & 0x0e00)
}

/* buttonpad layout carries one extra bit per axis */
fn btl_mf_x(b: &[u8], i: usize) -> i32 {
    std_mf_x(b, i) | ((i32::from(b[i * 3]) >> 3) & 0x0010)
}

fn btl_mf_y(b: &[u8], i: usize) -> i32 {
    std_mf_y(b, i) | ((i32::from(b[i * 3]) >> 3) & 0x0008)
}

fn mf_z(b: &[u8], i: usize) -> i32 {
    i32::from(b[1 + i * 3] & 0x01) | ((i32::from(b[1 + i * 3]) >> 1) & 0x02)
}

fn is_mf_continue(b: &[u8]) -> bool {
    b[2] & 0x10 == 0x10
}

fn is_5f_detected(b: &[u8]) -> bool {
    b[2] & 0x10 == 0x10
}

fn buttons(b: &[u8]) -> u8 {
    (b[0] >> 5) & 0x07
}

pub fn decode_fields(decoder: &Decoder, f: &mut PacketFields, p: &[u8]) {
    let buttonpad = decoder.profile.caps.buttonpad;
    let pkt_id = packet_id(p);

    match pkt_id {
        Ss4PacketId::One => {
            f.mt[0].x = one_finger_x(p);
            f.mt[0].y = one_finger_y(p);
            f.pressure = (one_finger_z(p) * 2) & 0x7f;
            /* A held button produces events with x, y and pressure all
             * zero; claim zero contacts so release doesn't jump. */
            f.fingers = if f.pressure > 0 { 1 } else { 0 };
            f.first_mp = false;
            f.is_mp = false;
        }
        Ss4PacketId::Two => {
            if buttonpad {
                f.mt[0].x = btl_mf_x(p, 0);
                f.mt[0].y = btl_mf_y(p, 0);
                f.mt[1].x = btl_mf_x(p, 1);
                f.mt[1].y = btl_mf_y(p, 1);
            } else {
                f.mt[0].x = std_mf_x(p, 0);
                f.mt[0].y = std_mf_y(p, 0);
                f.mt[1].x = std_mf_x(p, 1);
                f.mt[1].y = std_mf_y(p, 1);
            }
            f.pressure = if mf_z(p, 0) != 0 { 0x30 } else { 0 };

            if is_mf_continue(p) {
                f.first_mp = true;
            } else {
                f.fingers = 2;
                f.first_mp = false;
            }
            f.is_mp = false;
        }
        Ss4PacketId::Multi => {
            let (no_data_x, no_data_y);
            if buttonpad {
                f.mt[2].x = btl_mf_x(p, 0);
                f.mt[2].y = btl_mf_y(p, 0);
                f.mt[3].x = btl_mf_x(p, 1);
                f.mt[3].y = btl_mf_y(p, 1);
                no_data_x = MFPACKET_NO_AX_BL;
                no_data_y = MFPACKET_NO_AY_BL;
            } else {
                f.mt[2].x = std_mf_x(p, 0);
                f.mt[2].y = std_mf_y(p, 0);
                f.mt[3].x = std_mf_x(p, 1);
                f.mt[3].y = std_mf_y(p, 1);
                no_data_x = MFPACKET_NO_AX;
                no_data_y = MFPACKET_NO_AY;
            }

            f.first_mp = false;
            f.is_mp = true;

            if is_5f_detected(p) {
                f.fingers = 5;
            } else if f.mt[3].x == no_data_x && f.mt[3].y == no_data_y {
                f.mt[3] = TouchPos::default();
                f.fingers = 3;
            } else {
                f.fingers = 4;
            }
        }
        Ss4PacketId::Stick => {
            /* x, y and pressure are decoded in the stick path */
            f.first_mp = false;
            f.is_mp = false;
        }
        Ss4PacketId::Idle => {
            *f = PacketFields::default();
        }
    }

    /* Stick packets carry their buttons out of band from the touchpad
     * ones; buttonpads only ever report the left bit. */
    if pkt_id == Ss4PacketId::Stick {
        f.ts_left = buttons(p) & 0x01 != 0;
        if !buttonpad {
            f.ts_right = buttons(p) & 0x02 != 0;
            f.ts_middle = buttons(p) & 0x04 != 0;
        }
    } else {
        f.left = buttons(p) & 0x01 != 0;
        if !buttonpad {
            f.right = buttons(p) & 0x02 != 0;
            f.middle = buttons(p) & 0x04 != 0;
        }
    }
}

pub(super) fn process(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    let mut f = PacketFields::default();
    decode_fields(decoder, &mut f, packet);

    if decoder.multi_packet != 0 {
        /* Sometimes the first packet announces a continuation but the
         * multi half never comes; fall back to processing the position
         * packet as usual. */
        if f.is_mp {
            /* Merge: re-decode the carried two-finger packet on top.
             * It only touches slots 0/1, pressure and buttons, so the
             * multi packet's finger count and slots 2/3 survive. */
            let carried = decoder.multi_data;
            decode_fields(decoder, &mut f, &carried);
        } else {
            decoder.multi_packet = 0;
        }
    }

    /* is_mp still set means the multi half arrived without its first
     * half; drop the frame. */
    if f.is_mp {
        return;
    }

    if decoder.multi_packet == 0 && f.first_mp {
        decoder.multi_packet = 1;
        decoder.multi_data.copy_from_slice(&packet[..6]);
        return;
    }

    decoder.multi_packet = 0;

    /* Report trackstick */
    if packet_id(packet) == Ss4PacketId::Stick {
        if !decoder.profile.caps.dualpoint {
            debug!("rejected trackstick packet from non-DualPoint device");
            return;
        }

        let x = (i32::from(packet[0] & 0x01) << 7) | i32::from(packet[1] & 0x7f);
        let y = (i32::from(packet[3] & 0x01) << 7) | i32::from(packet[2] & 0x7f);
        let pressure = i32::from(packet[4] & 0x7f);

        if x.abs() >= 0x7f || y.abs() >= 0x7f {
            return;
        }

        /* TODO: validate the SS4 stick coordinate layout on real
         * hardware before dispatching motion from it. */
        debug!(
            "ss4 trackstick: x={x} y={y} z={pressure} buttons={:#x}",
            f.ts_button_mask()
        );
        return;
    }

    /* Report touchpad */
    let buttons = f.button_mask();

    /* Reverse y to put 0 at the bottom for the gesture engine */
    f.mt[0].y = decoder.profile.y_max - f.mt[0].y;
    f.mt[1].y = decoder.profile.y_max - f.mt[1].y;

    decoder.emit_touch(
        out,
        TouchSample {
            x: f.mt[0].x,
            y: f.mt[0].y,
            z: f.pressure,
            fingers: f.fingers,
            buttons,
            tap_drag_edge: false,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::super::{DecodeEvent, Decoder, test_profile};
    use super::*;
    use crate::device::ProtocolVersion;

    const IDLE: [u8; 6] = [0x18, 0x10, 0x00, 0x08, 0x10, 0x00];

    #[test]
    fn idle_requires_exact_pattern() {
        assert_eq!(packet_id(&IDLE), Ss4PacketId::Idle);

        /* same 2-bit field, any other byte pattern: one-finger */
        let mut p = IDLE;
        p[1] = 0x11;
        assert_eq!(packet_id(&p), Ss4PacketId::One);
    }

    #[test]
    fn two_bit_field_selects_kind() {
        let mut p = IDLE;
        p[3] = 0x18;
        assert_eq!(packet_id(&p), Ss4PacketId::Two);
        p[3] = 0x28;
        assert_eq!(packet_id(&p), Ss4PacketId::Stick);
        p[3] = 0x38;
        assert_eq!(packet_id(&p), Ss4PacketId::Multi);
    }

    #[test]
    fn one_finger_coordinates() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        /* x bits in bytes 0-2, y bits in bytes 2-4, z in bytes 4-5 */
        let p = [0x18 | 0x05, 0x2a, 0x43, 0x08, 0x24, 0x29];
        let events = d.process(&p);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.x, one_finger_x(&p));
                assert_eq!(t.y, d.profile().y_max - one_finger_y(&p));
                assert_eq!(t.z, (one_finger_z(&p) * 2) & 0x7f);
                assert_eq!(t.fingers, 1);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn two_finger_standalone() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        /* TWO without the continuation bit */
        let p = [0x18, 0x21, 0x04, 0x18, 0x22, 0x04];
        let events = d.process(&p);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.fingers, 2);
                /* two-finger pressure is binary: 0x30 when slot 0 has z */
                assert_eq!(t.z, 0x30);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn continuation_merges_into_multi() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        /* TWO with byte2 bit 4: first half of a multi report */
        let first = [0x18, 0x21, 0x14, 0x18, 0x22, 0x04];
        assert!(d.process(&first).is_empty());

        /* MULTI without the 5-finger bit, slot 3 carrying data */
        let multi = [0x18, 0x21, 0x04, 0x38, 0x22, 0x04];
        let events = d.process(&multi);
        assert_eq!(events.len(), 1);
        match events[0] {
            DecodeEvent::Touch(t) => assert_eq!(t.fingers, 4),
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn five_finger_flag() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        let first = [0x18, 0x21, 0x14, 0x18, 0x22, 0x04];
        assert!(d.process(&first).is_empty());
        /* MULTI with byte2 bit 4 set: five fingers */
        let multi = [0x18, 0x21, 0x14, 0x38, 0x22, 0x04];
        match d.process(&multi)[0] {
            DecodeEvent::Touch(t) => assert_eq!(t.fingers, 5),
            ref other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn slot3_no_data_sentinel_means_three_fingers() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        let first = [0x18, 0x21, 0x14, 0x18, 0x22, 0x04];
        assert!(d.process(&first).is_empty());

        /* slot 3 at the non-buttonpad sentinel (8160, 4080); slot 1 of
         * a multi packet lives in bytes 3..=5 */
        let mut multi = [0u8; 6];
        multi[3] = 0x3f;
        multi[4] = 0xff;
        multi[5] = 0xff;
        let sentinel_x = std_mf_x(&multi, 1);
        let sentinel_y = std_mf_y(&multi, 1);
        assert_eq!(sentinel_x, MFPACKET_NO_AX);
        assert_eq!(sentinel_y, MFPACKET_NO_AY);

        match d.process(&multi)[0] {
            DecodeEvent::Touch(t) => assert_eq!(t.fingers, 3),
            ref other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn lone_multi_packet_is_dropped() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        let multi = [0x18, 0x21, 0x04, 0x38, 0x22, 0x04];
        assert!(d.process(&multi).is_empty());
    }

    #[test]
    fn stick_out_of_range_rejected() {
        let mut d = Decoder::new(test_profile(ProtocolVersion::V8));
        /* stick packet with x pegged at 0x7f */
        let p = [0x18, 0x7f, 0x00, 0x28, 0x10, 0x00];
        assert!(d.process(&p).is_empty());
    }

    #[test]
    fn buttonpad_masks_right_middle() {
        let mut profile = test_profile(ProtocolVersion::V8);
        profile.caps.buttonpad = true;
        let mut d = Decoder::new(profile);
        /* one-finger packet with all three button bits set */
        let p = [0x18 | 0xe0, 0x2a, 0x43, 0x08, 0x24, 0x29];
        match d.process(&p)[0] {
            DecodeEvent::Touch(t) => assert_eq!(t.buttons, 0x01),
            ref other => panic!("expected touch, got {other:?}"),
        }
    }
}
