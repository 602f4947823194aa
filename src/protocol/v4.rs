/* V4 decoder: 8-byte packets with the bitmap payload spread across
 * three of them.
 *
 * Every packet carries a normal position report in bytes 0-5; bytes 6
 * and 7 hold two bytes of a 6-byte bitmap encoding. A sync bit in byte
 * 6 marks the first slice, so the decoder tracks a 0..=2 position index
 * and runs the combined bitmap once the third slice lands. */

use super::{DecodeEvent, Decoder, TouchSample, resolve_bitmap};
use crate::device::PacketFields;

pub(super) fn process(decoder: &mut Decoder, packet: &[u8], out: &mut Vec<DecodeEvent>) {
    let mut f = PacketFields::default();
    let mut fingers: u32 = 0;

    if packet[6] & 0x40 != 0 {
        /* sync, reset position */
        decoder.multi_packet = 0;
    }

    if decoder.multi_packet > 2 {
        return;
    }

    let offset = (2 * decoder.multi_packet) as usize;
    decoder.multi_data[offset] = packet[6];
    decoder.multi_data[offset + 1] = packet[7];

    f.left = packet[4] & 0x01 != 0;
    f.right = packet[4] & 0x02 != 0;

    f.st.x = (i32::from(packet[1] & 0x7f) << 4)
        | (i32::from(packet[3] & 0x30) >> 2)
        | (i32::from(packet[0] & 0x30) >> 4);
    f.st.y = (i32::from(packet[2] & 0x7f) << 4) | i32::from(packet[3] & 0x0f);
    f.pressure = i32::from(packet[5] & 0x7f);

    decoder.multi_packet += 1;
    if decoder.multi_packet > 2 {
        decoder.multi_packet = 0;

        let m = &decoder.multi_data;
        f.x_map = (u32::from(m[2] & 0x1f) << 10)
            | (u32::from(m[3] & 0x60) << 3)
            | (u32::from(m[0] & 0x3f) << 2)
            | (u32::from(m[1] & 0x60) >> 5);
        f.y_map =
            (u32::from(m[5] & 0x01) << 10) | (u32::from(m[3] & 0x1f) << 5) | u32::from(m[1] & 0x1f);

        fingers = resolve_bitmap(decoder, &mut f);
    }

    if fingers < 2 {
        decoder.second_touch = None;
    }

    let buttons = f.button_mask();

    decoder.emit_touch(
        out,
        TouchSample {
            x: f.st.x,
            y: f.st.y,
            z: f.pressure,
            fingers,
            buttons,
            tap_drag_edge: false,
        },
    );
}
