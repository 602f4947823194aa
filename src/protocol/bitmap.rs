/* Bitmap-to-points resolver for the semi-multitouch formats.
 *
 * V3/V4/V5 report two per-axis occupancy bitfields instead of finger
 * coordinates. The bitmaps cannot track individual fingers, so this
 * only reconstructs a bounding box: the single-touch position becomes
 * the primary point and one box corner becomes the second. */

use tracing::trace;

use crate::device::{PacketFields, Profile, ProtocolVersion, TouchPos};
use crate::error::DriverError;

/* A maximal run of consecutive set bits on one axis. */
#[derive(Debug, Clone, Copy, Default)]
struct BitmapPoint {
    start_bit: i32,
    num_bits: i32,
}

/* Scan a bitmap from bit 0 upward, collecting up to two runs and
 * counting one finger per run start. */
fn get_bitmap_points(mut map: u32, low: &mut BitmapPoint, high: &mut BitmapPoint) -> i32 {
    let mut fingers = 0;
    let mut prev_bit = false;
    let mut on_high = false;

    let mut i = 0;
    while map != 0 {
        let bit = map & 1 != 0;
        if bit {
            let point = if on_high { &mut *high } else { &mut *low };
            if !prev_bit {
                point.start_bit = i;
                point.num_bits = 0;
                fingers += 1;
            }
            point.num_bits += 1;
        } else if prev_bit {
            on_high = true;
        }
        prev_bit = bit;
        i += 1;
        map >>= 1;
    }

    fingers
}

/* Project a run onto physical coordinates. */
fn coordinate(max: i32, point: BitmapPoint, num_bits: i32) -> i32 {
    (max * (2 * point.start_bit + point.num_bits - 1)) / (2 * (num_bits - 1))
}

/* Process bitmap data from a semi-mt report. Returns the number of
 * fingers detected; 0 means at least one bitmap was empty and the
 * caller should fall back to single-touch data.
 *
 * `second_touch` caches the chosen box corner for the whole 2-finger
 * touch sequence so the second point does not jump between corners
 * while the first finger moves. The caller clears it on touch lift. */
pub fn process_bitmap(
    profile: &Profile,
    second_touch: &mut Option<usize>,
    fields: &mut PacketFields,
) -> u32 {
    if fields.x_map == 0 || fields.y_map == 0 {
        /* recovered by falling back to single-touch data upstream */
        trace!("{}", DriverError::BitmapUnderflow);
        return 0;
    }

    let mut x_low = BitmapPoint::default();
    let mut x_high = BitmapPoint::default();
    let mut y_low = BitmapPoint::default();
    let mut y_high = BitmapPoint::default();

    let fingers_x = get_bitmap_points(fields.x_map, &mut x_low, &mut x_high);
    let fingers_y = get_bitmap_points(fields.y_map, &mut y_low, &mut y_high);

    /* Fingers can overlap, so the finger count is the maximum of the
     * per-axis counts. */
    let fingers = fingers_x.max(fingers_y);

    /* An axis reporting a single contact means overlapping or adjacent
     * fingers; split the one run between the two points. */
    if fingers_x == 1 {
        let i = x_low.num_bits / 2;
        x_low.num_bits -= i;
        x_high.start_bit = x_low.start_bit + i;
        x_high.num_bits = i.max(1);
    }
    if fingers_y == 1 {
        let i = y_low.num_bits / 2;
        y_low.num_bits -= i;
        y_high.start_bit = y_low.start_bit + i;
        y_high.num_bits = i.max(1);
    }

    /* The four corners of the bounding box, clockwise from top-left. */
    let mut corner = [
        TouchPos {
            x: coordinate(profile.x_max, x_low, profile.x_bits),
            y: coordinate(profile.y_max, y_low, profile.y_bits),
        },
        TouchPos {
            x: coordinate(profile.x_max, x_high, profile.x_bits),
            y: coordinate(profile.y_max, y_low, profile.y_bits),
        },
        TouchPos {
            x: coordinate(profile.x_max, x_high, profile.x_bits),
            y: coordinate(profile.y_max, y_high, profile.y_bits),
        },
        TouchPos {
            x: coordinate(profile.x_max, x_low, profile.x_bits),
            y: coordinate(profile.y_max, y_high, profile.y_bits),
        },
    ];

    /* Sensor wiring differs by generation: x order is reversed on V5,
     * y order on V3 Pinnacle and V4. */
    if profile.version == ProtocolVersion::V5 {
        for c in &mut corner {
            c.x = profile.x_max - c.x;
        }
    }
    if profile.version == ProtocolVersion::V3 || profile.version == ProtocolVersion::V4 {
        for c in &mut corner {
            c.y = profile.y_max - c.y;
        }
    }

    /* Select a corner for the second touch only once per 2-finger
     * sequence: the one diagonally opposite the corner nearest the
     * single-touch coordinates. */
    let chosen = match *second_touch {
        Some(index) => index,
        None => {
            let mut closest = i64::MAX;
            let mut nearest = 0;
            for (i, c) in corner.iter().enumerate() {
                let dx = (fields.st.x - c.x) as i64;
                let dy = (fields.st.y - c.y) as i64;
                let distance = dx * dx + dy * dy;
                if distance < closest {
                    nearest = i;
                    closest = distance;
                }
            }
            let opposite = (nearest + 2) % 4;
            *second_touch = Some(opposite);
            opposite
        }
    };

    fields.mt[0] = fields.st;
    fields.mt[1] = corner[chosen];

    trace!(
        "bitmap: fingers={fingers} corner={chosen} mt0=({},{}) mt1=({},{})",
        fields.mt[0].x, fields.mt[0].y, fields.mt[1].x, fields.mt[1].y
    );

    fingers as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCaps, NibbleSet};

    fn profile(version: ProtocolVersion) -> Profile {
        Profile {
            version,
            byte0: 0x8f,
            mask0: 0x8f,
            fw_ver: [0; 3],
            caps: DeviceCaps::none(),
            x_max: 2000,
            y_max: 1400,
            x_bits: 15,
            y_bits: 11,
            x_res: 0,
            y_res: 0,
            nibble_set: NibbleSet::V3,
            addr_command: 0xec,
        }
    }

    #[test]
    fn empty_bitmap_returns_zero_fingers() {
        let p = profile(ProtocolVersion::V3Rushmore);
        let mut cache = None;
        let mut f = PacketFields {
            x_map: 0b0110,
            y_map: 0,
            ..Default::default()
        };
        let before = f;
        assert_eq!(process_bitmap(&p, &mut cache, &mut f), 0);
        assert_eq!(f, before);
        assert_eq!(cache, None);
    }

    #[test]
    fn run_extraction_counts_fingers_per_axis() {
        let mut low = BitmapPoint::default();
        let mut high = BitmapPoint::default();
        /* two runs: bits 1-2 and bits 5-7 */
        assert_eq!(get_bitmap_points(0b1110_0110, &mut low, &mut high), 2);
        assert_eq!((low.start_bit, low.num_bits), (1, 2));
        assert_eq!((high.start_bit, high.num_bits), (5, 3));
    }

    #[test]
    fn two_runs_yield_two_fingers() {
        let p = profile(ProtocolVersion::V3Rushmore);
        let mut cache = None;
        let mut f = PacketFields {
            x_map: 0b0000_0011_0000_0110,
            y_map: 0b0011_0000_0110,
            ..Default::default()
        };
        f.st = TouchPos { x: 200, y: 200 };
        assert_eq!(process_bitmap(&p, &mut cache, &mut f), 2);
        assert_eq!(f.mt[0], f.st);
        /* primary is near the low/low corner; second touch lands on
         * the opposite (high/high) corner */
        assert!(f.mt[1].x > f.mt[0].x);
        assert!(f.mt[1].y > f.mt[0].y);
    }

    #[test]
    fn single_run_axis_is_split() {
        let p = profile(ProtocolVersion::V3Rushmore);
        let mut cache = None;
        /* one wide run on x, two runs on y: still two fingers */
        let mut f = PacketFields {
            x_map: 0b0001_1110,
            y_map: 0b0110_0110,
            ..Default::default()
        };
        f.st = TouchPos { x: 100, y: 100 };
        assert_eq!(process_bitmap(&p, &mut cache, &mut f), 2);
    }

    #[test]
    fn corner_choice_is_cached_across_calls() {
        let p = profile(ProtocolVersion::V3Rushmore);
        let mut cache = None;
        let mut f = PacketFields {
            x_map: 0b0000_0011_0000_0110,
            y_map: 0b0011_0000_0110,
            st: TouchPos { x: 200, y: 200 },
            ..Default::default()
        };
        process_bitmap(&p, &mut cache, &mut f);
        let first = cache.expect("corner chosen");
        let second_point = f.mt[1];

        /* moving the primary touch must not re-pick the corner */
        f.st = TouchPos { x: 1800, y: 1200 };
        process_bitmap(&p, &mut cache, &mut f);
        assert_eq!(cache, Some(first));
        assert_eq!(f.mt[1], second_point);
    }

    #[test]
    fn v5_reverses_x_corners() {
        let mut p = profile(ProtocolVersion::V5);
        p.x_bits = 23;
        p.y_bits = 12;
        let mut cache = None;
        let mut f = PacketFields {
            x_map: 0b0110,
            y_map: 0b0110,
            /* primary sits far right so the chosen opposite corner is
             * deterministic */
            st: TouchPos { x: 1900, y: 1300 },
            ..Default::default()
        };
        assert_eq!(process_bitmap(&p, &mut cache, &mut f), 1);
        /* low bits map to small raw x; reversal flips them high */
        assert!(f.mt[1].x > 1800, "reversed x, got {}", f.mt[1].x);
    }
}
