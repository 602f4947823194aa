/* V6 decoder.
 *
 * Byte 5 disambiguates the source: 0x00-0x7e is the touchpad, 0x7f the
 * trackpoint. Trackpoint deltas are divided by 4 to tame the raw
 * sensitivity, and an all-0x7f triple is a lift sentinel. */

use tracing::trace;

use super::{DecodeEvent, Decoder, TouchSample};
use crate::events::{BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT};

pub(super) fn process(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    if packet[5] == 0x7f {
        /* Only a DualPoint should ever source a trackpoint packet */
        if !decoder.profile.caps.dualpoint {
            return;
        }

        let mut x = i32::from(packet[1]) | (i32::from(packet[3] & 0x20) << 2);
        let mut y = i32::from(packet[2]) | (i32::from(packet[3] & 0x40) << 1);
        let mut z = i32::from(packet[4]);

        let mut buttons = 0;
        if packet[3] & 0x01 != 0 {
            buttons |= BUTTON_LEFT;
        }
        if packet[3] & 0x02 != 0 {
            buttons |= BUTTON_RIGHT;
        }
        if packet[3] & 0x04 != 0 {
            buttons |= BUTTON_MIDDLE;
        }

        /* Lift sentinel, zeroed to keep the cursor from jumping */
        if x == 0x7f && y == 0x7f && z == 0x7f {
            x = 0;
            y = 0;
            z = 0;
        }
        trace!("trackpoint: x={x} y={y} z={z} buttons={buttons:#x}");

        out.push(DecodeEvent::Pointer {
            dx: x / 4,
            dy: y / 4,
            buttons,
        });
        return;
    }

    /* Touchpad packet */
    let x = i32::from(packet[1]) | (i32::from(packet[3] & 0x78) << 4);
    let y = i32::from(packet[2]) | (i32::from(packet[4] & 0x78) << 4);
    let z = i32::from(packet[5]);

    let mut buttons = 0;
    if packet[3] & 0x01 != 0 {
        buttons |= BUTTON_LEFT;
    }
    if packet[3] & 0x02 != 0 {
        buttons |= BUTTON_RIGHT;
    }

    let fingers = if z > 0 { 1 } else { 0 };

    decoder.emit_touch(
        out,
        TouchSample {
            x,
            y,
            z,
            fingers,
            buttons,
            tap_drag_edge: false,
        },
    );
}
