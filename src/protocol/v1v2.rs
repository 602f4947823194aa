/* V1/V2 decoder: the oldest 6-byte absolute format.
 *
 * The two layouts differ in button bit positions and coordinate
 * packing. Dualpoint models fold relative trackstick reports into the
 * same stream, flagged by the sentinel pressure value 127 with
 * wrap-around coordinate encoding. */

use tracing::debug;

use super::{DecodeEvent, Decoder, TouchSample};
use crate::device::ProtocolVersion;
use crate::events::{BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT};

fn button_mask(left: bool, right: bool, middle: bool) -> u32 {
    let mut buttons = 0;
    if left {
        buttons |= BUTTON_LEFT;
    }
    if right {
        buttons |= BUTTON_RIGHT;
    }
    if middle {
        buttons |= BUTTON_MIDDLE;
    }
    buttons
}

pub(super) fn process(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    let caps = decoder.profile.caps;
    let (mut left, mut right, mut middle);
    let (x, y, mut z): (i32, i32, i32);

    if decoder.profile.version == ProtocolVersion::V1 {
        left = packet[2] & 0x10 != 0;
        right = packet[2] & 0x08 != 0;
        middle = false;
        x = i32::from(packet[1]) | (i32::from(packet[0] & 0x07) << 7);
        y = i32::from(packet[4]) | (i32::from(packet[3] & 0x07) << 7);
        z = i32::from(packet[5]);
    } else {
        left = packet[3] & 0x01 != 0;
        right = packet[3] & 0x02 != 0;
        middle = packet[3] & 0x04 != 0;
        x = i32::from(packet[1]) | (i32::from(packet[2] & 0x78) << (7 - 3));
        y = i32::from(packet[4]) | (i32::from(packet[3] & 0x70) << (7 - 4));
        z = i32::from(packet[5]);
    }

    if caps.fw_bk_1 {
        let back = packet[0] & 0x10 != 0;
        let forward = packet[2] & 0x04 != 0;
        if back || forward {
            debug!("front/back buttons: back={back} forward={forward}");
        }
    }

    if caps.fw_bk_2 {
        let back = packet[3] & 0x04 != 0;
        let forward = packet[2] & 0x04 != 0;
        /* both held at once reads as a middle click */
        if back && forward {
            middle = true;
        } else if back || forward {
            debug!("front/back buttons: back={back} forward={forward}");
        }
    }

    let ges = packet[2] & 0x01 != 0;
    let fin = packet[2] & 0x02 != 0;

    /* Relative trackstick packet: pressure pegged at the sentinel. */
    if caps.dualpoint && z == 127 {
        let buttons = button_mask(left, right, middle);
        let dx = if x > 383 { x - 768 } else { x };
        let dy = -(if y > 255 { y - 512 } else { y });
        out.push(DecodeEvent::Pointer { dx, dy, buttons });
        return;
    }

    /* Some models report stick buttons in byte 0 of touchpad packets. */
    if caps.stick_bits {
        left |= packet[0] & 0x01 != 0;
        right |= packet[0] & 0x02 != 0;
        middle |= packet[0] & 0x04 != 0;
    }
    let buttons = button_mask(left, right, middle);

    /* Convert a hardware tap into a reasonable pressure value. */
    if ges && !fin {
        z = 40;
    }

    /* A "tap and drag" is reported as a transition from (ges && !fin)
     * to (ges && fin); the gesture engine enters drag mode on that
     * rising edge. */
    let tap_drag_edge = ges && fin && decoder.prev_fin == 0;
    decoder.prev_fin = i32::from(fin);

    let mut fingers = 0;
    if z > 30 {
        fingers = 1;
    }
    if z < 25 {
        fingers = 0;
    }

    decoder.emit_touch(
        out,
        TouchSample {
            x,
            y,
            z,
            fingers,
            buttons,
            tap_drag_edge,
        },
    );

    if caps.wheel {
        let scroll = ((i32::from(packet[2]) << 1) & 0x08) - ((i32::from(packet[0]) >> 4) & 0x07);
        if scroll != 0 {
            out.push(DecodeEvent::Scroll {
                vertical: scroll,
                horizontal: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DecodeEvent, Decoder, test_profile};
    use crate::device::ProtocolVersion;

    fn decoder(version: ProtocolVersion) -> Decoder {
        Decoder::new(test_profile(version))
    }

    #[test]
    fn v1_coordinate_packing() {
        let mut d = decoder(ProtocolVersion::V1);
        /* x = 0x155, y = 0x0a4, z = 60, left pressed */
        let packet = [0x02, 0x55, 0x10, 0x00, 0xa4, 60];
        let events = d.process(&packet);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.x, 0x155);
                assert_eq!(t.y, 0x0a4);
                assert_eq!(t.z, 60);
                assert_eq!(t.fingers, 1);
                assert_eq!(t.buttons, 0x01);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn v2_coordinate_packing() {
        let mut d = decoder(ProtocolVersion::V2);
        /* byte2[6:3] extend x, byte3[6:4] extend y */
        let packet = [0xf8, 0x34, 0x28, 0x21, 0x66, 40];
        let events = d.process(&packet);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.x, 0x34 | ((0x28 & 0x78) << 4));
                assert_eq!(t.y, 0x66 | ((0x21 & 0x70) << 3));
                assert_eq!(t.buttons, 0x01);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn trackstick_sentinel_wraps_negative() {
        let mut d = decoder(ProtocolVersion::V2);
        /* z == 127 marks a relative stick report; x=700 folds to -68 */
        let x = 700;
        let packet = [
            0xf8,
            (x & 0x7f) as u8,
            ((x >> 4) & 0x78) as u8, /* byte2[6:3] = x[10:7] */
            0x00,
            0x10,
            127,
        ];
        let events = d.process(&packet);
        match events[0] {
            DecodeEvent::Pointer { dx, dy, .. } => {
                assert_eq!(dx, x - 768);
                assert_eq!(dy, -0x10);
            }
            other => panic!("expected pointer, got {other:?}"),
        }
    }

    #[test]
    fn hardware_tap_synthesizes_pressure() {
        let mut d = decoder(ProtocolVersion::V2);
        /* ges without fin, zero hardware pressure */
        let packet = [0xf8, 0x10, 0x01, 0x00, 0x10, 0];
        let events = d.process(&packet);
        match events[0] {
            DecodeEvent::Touch(t) => {
                assert_eq!(t.z, 40);
                assert_eq!(t.fingers, 1);
                assert!(!t.tap_drag_edge);
            }
            other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn tap_drag_edge_fires_once() {
        let mut d = decoder(ProtocolVersion::V2);
        /* ges+fin after fin was absent */
        let packet = [0xf8, 0x10, 0x03, 0x00, 0x10, 50];
        match d.process(&packet)[0] {
            DecodeEvent::Touch(t) => assert!(t.tap_drag_edge),
            ref other => panic!("expected touch, got {other:?}"),
        }
        /* second packet with fin still down: no new edge */
        match d.process(&packet)[0] {
            DecodeEvent::Touch(t) => assert!(!t.tap_drag_edge),
            ref other => panic!("expected touch, got {other:?}"),
        }
    }

    #[test]
    fn wheel_scroll_emitted() {
        let mut profile = test_profile(ProtocolVersion::V2);
        profile.caps.wheel = true;
        let mut d = Decoder::new(profile);
        /* byte2 bit 2 set and byte0 high nibble 3: 8 - 3 = 5 */
        let packet = [0x38, 0x10, 0x04, 0x00, 0x10, 50];
        let events = d.process(&packet);
        assert!(events.iter().any(|e| matches!(
            e,
            DecodeEvent::Scroll {
                vertical: 5,
                horizontal: 0
            }
        )));
    }

    #[test]
    fn fingers_zero_below_release_threshold() {
        let mut d = decoder(ProtocolVersion::V2);
        let packet = [0xf8, 0x10, 0x02, 0x00, 0x10, 20];
        match d.process(&packet)[0] {
            DecodeEvent::Touch(t) => assert_eq!(t.fingers, 0),
            ref other => panic!("expected touch, got {other:?}"),
        }
    }
}
