/* Gesture tuning surface.
 *
 * All thresholds, divisors, zone boundaries and timing constants the
 * event state machine consumes, loadable from an INI file:
 *
 * ```ini
 * [trackpad]
 * FingerZ = 45
 * MaxTapTime = 130000000
 * ```
 *
 * Key names match the original driver's property list. Time values are
 * nanoseconds. */

use std::path::Path;

use anyhow::{Context, Result};
use configparser::ini::Ini;
use tracing::{debug, warn};

const SECTION: &str = "trackpad";

#[derive(Debug, Clone)]
pub struct GestureConfig {
    /* pressure above which a finger is present */
    pub z_finger: i32,
    /* pressure above which a contact is treated as a palm */
    pub z_limit: i32,
    pub divisor_x: i32,
    pub divisor_y: i32,

    /* units-per-mm per axis, for squaring up motion */
    pub x_units_per_mm: i32,
    pub y_units_per_mm: i32,

    pub clicking: bool,
    pub dragging: bool,
    pub drag_lock: bool,
    /* multi-finger tap as right/middle click */
    pub rtap: bool,
    pub swap_double_triple: bool,
    pub immediate_click: bool,

    pub max_tap_time: u64,
    pub max_drag_time: u64,
    pub max_dbl_tap_time: u64,
    pub drag_exit_delay: u64,

    /* tap-cancel movement thresholds */
    pub tap_thresh_x: i32,
    pub tap_thresh_y: i32,
    pub dbl_thresh_x: i32,
    pub dbl_thresh_y: i32,

    /* spurious-jump suppression */
    pub bogus_dx_thresh: i32,
    pub bogus_dy_thresh: i32,
    /* samples to ignore after a finger-count change */
    pub ignore_deltas_start: i32,

    /* two-finger scrolling */
    pub scroll_div_vert: i32,
    pub scroll_div_horiz: i32,
    pub hscroll: bool,
    pub sticky_multi_finger: bool,
    pub scroll_dx_thresh: i32,
    pub scroll_dy_thresh: i32,
    pub scroll_exit_delay: u64,

    /* momentum scroll */
    pub momentum_scroll: bool,
    pub momentum_scroll_timer: u64,
    pub momentum_scroll_samples_min: usize,
    pub momentum_scroll_multiplier: i64,
    pub momentum_scroll_divisor: i64,
    pub momentum_scroll_thresh_y: i64,

    /* 3/4-finger swipes */
    pub swipe_dx: i32,
    pub swipe_dy: i32,
    pub three_finger_horiz_swipe: bool,
    pub three_finger_vert_swipe: bool,

    /* typing-proximity suppression */
    pub outzone_while_typing: bool,
    pub palm: bool,
    pub palm_while_typing: bool,
    pub max_after_typing: u64,
    pub zone_left: i32,
    pub zone_right: i32,
    pub zone_top: i32,
    pub zone_bottom: i32,

    /* input smoothing */
    pub smooth_input: bool,
    pub unsmooth_input: bool,

    /* middle button simulation */
    pub fake_middle_button: bool,
    pub button_count: u32,
    pub max_middle_click_time: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            z_finger: 45,
            z_limit: 255,
            divisor_x: 1,
            divisor_y: 1,
            x_units_per_mm: 1,
            y_units_per_mm: 1,
            clicking: true,
            dragging: true,
            drag_lock: false,
            rtap: true,
            swap_double_triple: false,
            immediate_click: true,
            max_tap_time: 130_000_000,
            max_drag_time: 230_000_000,
            max_dbl_tap_time: 230_000_000,
            drag_exit_delay: 500_000_000,
            tap_thresh_x: 120,
            tap_thresh_y: 120,
            dbl_thresh_x: 250,
            dbl_thresh_y: 250,
            bogus_dx_thresh: 6000,
            bogus_dy_thresh: 6000,
            ignore_deltas_start: 16,
            scroll_div_vert: 30,
            scroll_div_horiz: 30,
            hscroll: true,
            sticky_multi_finger: false,
            scroll_dx_thresh: 10,
            scroll_dy_thresh: 10,
            scroll_exit_delay: 100_000_000,
            momentum_scroll: true,
            momentum_scroll_timer: 10_000_000,
            momentum_scroll_samples_min: 3,
            momentum_scroll_multiplier: 98,
            momentum_scroll_divisor: 100,
            momentum_scroll_thresh_y: 7,
            swipe_dx: 800,
            swipe_dy: 800,
            three_finger_horiz_swipe: true,
            three_finger_vert_swipe: true,
            outzone_while_typing: false,
            palm: true,
            palm_while_typing: true,
            max_after_typing: 500_000_000,
            zone_left: 1700,
            zone_right: 5200,
            zone_top: 99_999,
            zone_bottom: 0,
            smooth_input: true,
            unsmooth_input: true,
            fake_middle_button: true,
            button_count: 2,
            max_middle_click_time: 100_000_000,
        }
    }
}

impl GestureConfig {
    /* Load overrides from an INI file on top of the defaults. */
    pub fn load(path: &Path) -> Result<Self> {
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| anyhow::anyhow!("INI parse error: {e}"))
            .with_context(|| format!("Failed to load config {}", path.display()))?;

        let mut cfg = Self::default();
        cfg.apply(&ini);
        cfg.clamp();
        debug!("gesture config loaded from {}", path.display());
        Ok(cfg)
    }

    fn apply(&mut self, ini: &Ini) {
        fn int(ini: &Ini, key: &str, var: &mut i32) {
            if let Some(v) = ini.get(SECTION, key) {
                match v.parse() {
                    Ok(parsed) => *var = parsed,
                    Err(_) => warn!("ignoring non-numeric config value {key}={v}"),
                }
            }
        }
        fn int64(ini: &Ini, key: &str, var: &mut i64) {
            if let Some(v) = ini.get(SECTION, key) {
                match v.parse() {
                    Ok(parsed) => *var = parsed,
                    Err(_) => warn!("ignoring non-numeric config value {key}={v}"),
                }
            }
        }
        fn uint64(ini: &Ini, key: &str, var: &mut u64) {
            if let Some(v) = ini.get(SECTION, key) {
                match v.parse() {
                    Ok(parsed) => *var = parsed,
                    Err(_) => warn!("ignoring non-numeric config value {key}={v}"),
                }
            }
        }
        fn boolean(ini: &Ini, key: &str, var: &mut bool) {
            if let Ok(Some(v)) = ini.getboolcoerce(SECTION, key) {
                *var = v;
            }
        }

        int(ini, "FingerZ", &mut self.z_finger);
        int(ini, "ZLimit", &mut self.z_limit);
        int(ini, "DivisorX", &mut self.divisor_x);
        int(ini, "DivisorY", &mut self.divisor_y);
        int(ini, "UnitsPerMMX", &mut self.x_units_per_mm);
        int(ini, "UnitsPerMMY", &mut self.y_units_per_mm);
        boolean(ini, "Clicking", &mut self.clicking);
        boolean(ini, "Dragging", &mut self.dragging);
        boolean(ini, "DragLock", &mut self.drag_lock);
        boolean(ini, "TrackpadRightClick", &mut self.rtap);
        boolean(ini, "SwapDoubleTriple", &mut self.swap_double_triple);
        boolean(ini, "ImmediateClick", &mut self.immediate_click);
        uint64(ini, "MaxTapTime", &mut self.max_tap_time);
        uint64(ini, "MaxDragTime", &mut self.max_drag_time);
        uint64(ini, "HIDClickTime", &mut self.max_dbl_tap_time);
        uint64(ini, "DragExitDelayTime", &mut self.drag_exit_delay);
        int(ini, "TapThresholdX", &mut self.tap_thresh_x);
        int(ini, "TapThresholdY", &mut self.tap_thresh_y);
        int(ini, "DoubleTapThresholdX", &mut self.dbl_thresh_x);
        int(ini, "DoubleTapThresholdY", &mut self.dbl_thresh_y);
        int(ini, "BogusDeltaThreshX", &mut self.bogus_dx_thresh);
        int(ini, "BogusDeltaThreshY", &mut self.bogus_dy_thresh);
        int(ini, "FingerChangeIgnoreDeltas", &mut self.ignore_deltas_start);
        int(ini, "MultiFingerVerticalDivisor", &mut self.scroll_div_vert);
        int(ini, "MultiFingerHorizontalDivisor", &mut self.scroll_div_horiz);
        boolean(ini, "HorizontalScroll", &mut self.hscroll);
        boolean(ini, "StickyMultiFingerScrolling", &mut self.sticky_multi_finger);
        int(ini, "ScrollDeltaThreshX", &mut self.scroll_dx_thresh);
        int(ini, "ScrollDeltaThreshY", &mut self.scroll_dy_thresh);
        uint64(ini, "ScrollExitDelayTime", &mut self.scroll_exit_delay);
        boolean(ini, "TrackpadMomentumScroll", &mut self.momentum_scroll);
        uint64(ini, "MomentumScrollTimer", &mut self.momentum_scroll_timer);
        if let Some(v) = ini.get(SECTION, "MomentumScrollSamplesMin") {
            if let Ok(parsed) = v.parse() {
                self.momentum_scroll_samples_min = parsed;
            }
        }
        int64(ini, "MomentumScrollMultiplier", &mut self.momentum_scroll_multiplier);
        int64(ini, "MomentumScrollDivisor", &mut self.momentum_scroll_divisor);
        int64(ini, "MomentumScrollThreshY", &mut self.momentum_scroll_thresh_y);
        int(ini, "SwipeDeltaX", &mut self.swipe_dx);
        int(ini, "SwipeDeltaY", &mut self.swipe_dy);
        boolean(ini, "ThreeFingerHorizSwipe", &mut self.three_finger_horiz_swipe);
        boolean(ini, "ThreeFingerVertSwipe", &mut self.three_finger_vert_swipe);
        boolean(ini, "OutsidezoneNoActionWhenTyping", &mut self.outzone_while_typing);
        boolean(ini, "PalmNoAction", &mut self.palm);
        boolean(ini, "PalmNoActionWhenTyping", &mut self.palm_while_typing);
        uint64(ini, "QuietTimeAfterTyping", &mut self.max_after_typing);
        int(ini, "ZoneLeft", &mut self.zone_left);
        int(ini, "ZoneRight", &mut self.zone_right);
        int(ini, "ZoneTop", &mut self.zone_top);
        int(ini, "ZoneBottom", &mut self.zone_bottom);
        boolean(ini, "SmoothInput", &mut self.smooth_input);
        boolean(ini, "UnsmoothInput", &mut self.unsmooth_input);
        boolean(ini, "FakeMiddleButton", &mut self.fake_middle_button);
        if let Some(v) = ini.get(SECTION, "ButtonCount") {
            if let Ok(parsed) = v.parse() {
                self.button_count = parsed;
            }
        }
        uint64(ini, "MiddleClickTime", &mut self.max_middle_click_time);
    }

    /* Zero divisors and thresholds would divide by zero or swallow all
     * motion; pin them to working values. */
    fn clamp(&mut self) {
        if self.divisor_x == 0 {
            self.divisor_x = 1;
        }
        if self.divisor_y == 0 {
            self.divisor_y = 1;
        }
        if self.x_units_per_mm <= 0 {
            self.x_units_per_mm = 1;
        }
        if self.y_units_per_mm <= 0 {
            self.y_units_per_mm = 1;
        }
        if self.bogus_dx_thresh == 0 {
            self.bogus_dx_thresh = i32::MAX;
        }
        if self.bogus_dy_thresh == 0 {
            self.bogus_dy_thresh = i32::MAX;
        }
        if self.momentum_scroll_divisor <= 0 {
            self.momentum_scroll_divisor = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = GestureConfig::default();
        assert!(cfg.z_finger > 0);
        assert!(cfg.divisor_x > 0);
        assert!(cfg.max_tap_time < cfg.max_drag_time);
    }

    #[test]
    fn load_overrides_and_clamps() {
        let mut file = tempfile_path("alpsd-config-test.ini");
        writeln!(
            file.1,
            "[trackpad]\nFingerZ = 30\nDivisorX = 0\nClicking = false\nMaxTapTime = 90000000"
        )
        .unwrap();
        drop(file.1);

        let cfg = GestureConfig::load(&file.0).unwrap();
        assert_eq!(cfg.z_finger, 30);
        /* zero divisor clamps back to 1 */
        assert_eq!(cfg.divisor_x, 1);
        assert!(!cfg.clicking);
        assert_eq!(cfg.max_tap_time, 90_000_000);
        /* untouched keys keep their defaults */
        assert_eq!(cfg.z_limit, 255);

        std::fs::remove_file(&file.0).ok();
    }

    fn tempfile_path(name: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(name);
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
