/* Byte-stream framer.
 *
 * Runs in the interrupt path: one raw byte in, at most one complete
 * packet out. The validation rules per incoming byte, in order:
 *
 *  1. outside V8, a first byte matching the bare PS/2 heuristic means a
 *     foreign 3-byte mouse packet is on the wire; swallow exactly three
 *     bytes and drop them,
 *  2. on PS/2-interleaved models, the interleave marker at byte 3 from
 *     byte index 4 onward aborts the packet,
 *  3. the first byte, masked, must match the profile byte0/mask0 pair,
 *  4. below V5 every byte past the first must have the high bit clear,
 *  5. V7 and V8 carry fixed bit patterns at specific offsets.
 *
 * Any violation discards the whole packet-length slot and the framer
 * resynchronizes from the next byte. Nothing partial is ever emitted. */

use tracing::debug;

use crate::device::{Profile, ProtocolVersion};
use crate::error::DriverError;

pub const MAX_PACKET_LEN: usize = 8;

/* Bare PS/2 packets keep bit 3 set and bits 6/7 clear in their first
 * byte. */
const BARE_PS2_MASK: u8 = 0xc8;
const BARE_PS2_VALUE: u8 = 0x08;

/* Decode a classic 3-byte PS/2 mouse packet:
 *
 *   7  6  5  4  3  2  1  0
 *  YO XO YS XS  1  M  R  L
 *  X7 ............ X1 X0    (x delta)
 *  Y7 ............ Y1 Y0    (y delta)
 *
 * These come from a device behind the external port and are only
 * decoded for diagnostics; the slot is dropped either way. */
pub fn decode_bare_ps2(packet: &[u8]) -> (i32, i32, u32) {
    let mut buttons = 0;
    if packet[0] & 0x01 != 0 {
        buttons |= 0x01;
    }
    if packet[0] & 0x02 != 0 {
        buttons |= 0x02;
    }
    if packet[0] & 0x04 != 0 {
        buttons |= 0x04;
    }

    let mut dx = i32::from(packet[1]);
    if dx != 0 {
        dx = i32::from(packet[1]) - ((i32::from(packet[0]) << 4) & 0x100);
    }

    let mut dy = i32::from(packet[2]);
    if dy != 0 {
        dy = ((i32::from(packet[0]) << 3) & 0x100) - i32::from(packet[2]);
    }

    (dx, dy, buttons)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /* foreign 3-byte PS/2 packet on the wire */
    BarePs2,
    /* PS/2 packet stuffed in the middle of an ALPS packet */
    Interleaved,
    /* first byte failed the byte0/mask0 check */
    BadFirstByte,
    /* high bit set where the protocol forbids it */
    HighBitSet,
    /* V7/V8 structural bit pattern violated */
    BadStructure,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::BarePs2 => "bare PS/2 packet",
            DropReason::Interleaved => "interleaved PS/2 packet",
            DropReason::BadFirstByte => "first byte failed mask check",
            DropReason::HighBitSet => "high bit set in data byte",
            DropReason::BadStructure => "structural bit pattern violated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /* byte accepted, packet incomplete */
    Buffering,
    /* a full packet is ready */
    Ready([u8; MAX_PACKET_LEN]),
    /* packet slot discarded, framer back at idle */
    Dropped(DropReason),
}

/* Framer state: a partial packet plus the bare-PS/2 swallow flag. */
#[derive(Debug)]
pub struct Framer {
    buf: [u8; MAX_PACKET_LEN],
    count: usize,
    swallowing_bare: bool,
    dropped: u64,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_PACKET_LEN],
            count: 0,
            swallowing_bare: false,
            dropped: 0,
        }
    }

    /* Number of discarded packet slots since the session started. */
    pub fn dropped_packets(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.swallowing_bare = false;
    }

    fn drop_slot(&mut self, index: usize, reason: DropReason) -> FrameEvent {
        let err = DriverError::FrameSync {
            index,
            reason: reason.as_str(),
        };
        debug!("{err} (total dropped: {})", self.dropped + 1);
        self.dropped += 1;
        self.reset();
        FrameEvent::Dropped(reason)
    }

    /* Feed one byte from the wire. Never blocks, never errors: bad data
     * turns into `Dropped` and the stream resynchronizes. */
    pub fn push(&mut self, profile: &Profile, byte: u8) -> FrameEvent {
        let index = self.count;
        let pktsize = profile.packet_len();

        /* Bare PS/2 data from a device behind the external port. The
         * bare protocol has too few constant bits to self-synchronize,
         * and V8's first byte is indistinguishable from it, so only
         * non-V8 streams get this treatment. */
        if self.swallowing_bare
            || (index == 0
                && profile.version != ProtocolVersion::V8
                && (byte & BARE_PS2_MASK) == BARE_PS2_VALUE)
        {
            self.swallowing_bare = true;
            self.buf[self.count] = byte;
            self.count += 1;
            if self.count == 3 {
                let (dx, dy, buttons) = decode_bare_ps2(&self.buf[..3]);
                debug!("foreign PS/2 packet: dx={dx} dy={dy} buttons={buttons:#x}");
                return self.drop_slot(2, DropReason::BarePs2);
            }
            return FrameEvent::Buffering;
        }

        /* PS/2 packet stuffed into the middle of an ALPS packet. */
        if profile.caps.ps2_interleaved && index >= 4 && (self.buf[3] & 0x0f) == 0x0f {
            return self.drop_slot(index, DropReason::Interleaved);
        }

        if index == 0 && (byte & profile.mask0) != profile.byte0 {
            return self.drop_slot(0, DropReason::BadFirstByte);
        }

        /* Bytes past the first must have 0 in the highest bit. */
        if profile.version.rank() < ProtocolVersion::V5.rank()
            && index >= 1
            && index < pktsize
            && (byte & 0x80) != 0
        {
            return self.drop_slot(index, DropReason::HighBitSet);
        }

        if profile.version == ProtocolVersion::V7
            && ((index == 2 && (byte & 0x40) != 0x40)
                || (index == 3 && (byte & 0x48) != 0x48)
                || (index == 5 && (byte & 0x40) != 0x00))
        {
            return self.drop_slot(index, DropReason::BadStructure);
        }

        if profile.version == ProtocolVersion::V8
            && ((index == 3 && (byte & 0x08) != 0x08)
                || (index == 5 && (byte & 0x10) != 0x00))
        {
            return self.drop_slot(index, DropReason::BadStructure);
        }

        self.buf[self.count] = byte;
        self.count += 1;
        if self.count == pktsize {
            let packet = self.buf;
            self.reset();
            return FrameEvent::Ready(packet);
        }
        FrameEvent::Buffering
    }
}
