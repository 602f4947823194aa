/* Event/gesture state machine.
 *
 * Consumes normalized touch samples plus a monotonic timestamp and
 * produces pointer motion, clicks, drags, multi-finger scrolling,
 * swipes and momentum scrolling. All timers are single-shot deadlines
 * owned by the engine; the session actor sleeps until the nearest one
 * and calls back into `on_timer`. Malformed input never reaches this
 * layer, and nothing here has a fatal error path. */

pub mod filters;
pub mod middle;

use tracing::{debug, trace};

use crate::config::GestureConfig;
use crate::device::Profile;
use crate::events::{BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT, EventSink, SwipeDirection};
use crate::protocol::TouchSample;
use filters::{SimpleAverage, UndecayAverage};
use middle::{MbFrom, MiddleButton};

/* Move/drag deltas are suppressed for this long after the touch
 * starts, letting the tap detector win on short contacts. */
const MOVE_SETTLE_NS: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchMode {
    NoTouch,
    Move,
    MultiTouch,
    Drag,
    DragLock,
    PreDrag,
    DragNoTouch,
}

#[derive(Debug, Default)]
struct SwipeLatch {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

impl SwipeLatch {
    fn reset(&mut self) {
        *self = SwipeLatch::default();
    }
}

pub struct GestureEngine {
    cfg: GestureConfig,
    /* clickpads skip the two-button middle simulation */
    buttonpad: bool,
    /* normalizes every pad to the same coordinate space */
    scale: i32,

    mode: TouchMode,

    lastx: i32,
    lasty: i32,
    last_fingers: u32,
    lastbuttons: u32,
    xrest: i32,
    yrest: i32,
    ignoredeltas: i32,
    ignoresingle: i32,

    touchx: i32,
    touchy: i32,
    /* 0 means "tap canceled" */
    touchtime: u64,
    untouchtime: u64,
    keytime: u64,
    modifier_down: bool,
    wasdouble: bool,
    wastriple: bool,
    draglocktemp: bool,
    ignoreall: bool,

    /* 3/4-finger swipe accumulators */
    swipe3: SwipeLatch,
    swipe4: SwipeLatch,
    xmoved: i32,
    ymoved: i32,

    /* two-finger scroll state */
    was_scroll: bool,
    scrolldebounce: bool,
    dy_history: SimpleAverage<32>,
    time_history: SimpleAverage<32>,

    x_avg: SimpleAverage<5>,
    y_avg: SimpleAverage<5>,
    x_undo: UndecayAverage,
    y_undo: UndecayAverage,

    /* momentum scroll */
    momentum_current: i64,
    momentum_interval: u64,
    momentum_rest: i64,

    mb: MiddleButton,

    drag_deadline: Option<u64>,
    scroll_debounce_deadline: Option<u64>,
    momentum_deadline: Option<u64>,
}

impl GestureEngine {
    pub fn new(cfg: GestureConfig, profile: &Profile) -> Self {
        let avg_axis = ((profile.x_max + profile.y_max) / 2).max(1);
        let scale = (6000 / avg_axis).max(1);
        let mb_enabled = cfg.fake_middle_button && cfg.button_count >= 3;
        let max_middle_click_time = cfg.max_middle_click_time;

        Self {
            cfg,
            buttonpad: profile.caps.buttonpad,
            scale,
            mode: TouchMode::NoTouch,
            lastx: 0,
            lasty: 0,
            last_fingers: 0,
            lastbuttons: 0,
            xrest: 0,
            yrest: 0,
            ignoredeltas: 0,
            ignoresingle: 0,
            touchx: 0,
            touchy: 0,
            touchtime: 0,
            untouchtime: 0,
            keytime: 0,
            modifier_down: false,
            wasdouble: false,
            wastriple: false,
            draglocktemp: false,
            ignoreall: false,
            swipe3: SwipeLatch::default(),
            swipe4: SwipeLatch::default(),
            xmoved: 0,
            ymoved: 0,
            was_scroll: false,
            scrolldebounce: false,
            dy_history: SimpleAverage::new(),
            time_history: SimpleAverage::new(),
            x_avg: SimpleAverage::new(),
            y_avg: SimpleAverage::new(),
            x_undo: UndecayAverage::new(),
            y_undo: UndecayAverage::new(),
            momentum_current: 0,
            momentum_interval: 0,
            momentum_rest: 0,
            mb: MiddleButton::new(mb_enabled, max_middle_click_time),
            drag_deadline: None,
            scroll_debounce_deadline: None,
            momentum_deadline: None,
        }
    }

    pub fn mode(&self) -> TouchMode {
        self.mode
    }

    /* Disable/re-enable resets all gesture state. */
    pub fn set_enabled(&mut self, enabled: bool) {
        self.ignoreall = !enabled;
        if !enabled {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.mode = TouchMode::NoTouch;
        self.last_fingers = 0;
        self.xrest = 0;
        self.yrest = 0;
        self.ignoredeltas = 0;
        self.ignoresingle = 0;
        self.touchtime = 0;
        self.wasdouble = false;
        self.wastriple = false;
        self.draglocktemp = false;
        self.swipe3.reset();
        self.swipe4.reset();
        self.xmoved = 0;
        self.ymoved = 0;
        self.was_scroll = false;
        self.scrolldebounce = false;
        self.dy_history.reset();
        self.time_history.reset();
        self.reset_filters();
        self.momentum_current = 0;
        self.mb.reset();
        self.drag_deadline = None;
        self.scroll_debounce_deadline = None;
        self.momentum_deadline = None;
    }

    fn reset_filters(&mut self) {
        self.x_undo.reset();
        self.y_undo.reset();
        self.x_avg.reset();
        self.y_avg.reset();
    }

    fn is_touch_mode(&self) -> bool {
        matches!(
            self.mode,
            TouchMode::Move | TouchMode::MultiTouch | TouchMode::Drag | TouchMode::DragLock
        )
    }

    fn is_finger_touch(&self, z: i32) -> bool {
        z > self.cfg.z_finger
    }

    /* Keystroke notification from the host: non-modifier keys stamp the
     * typing time and kill momentum scroll; modifier releases only
     * stamp the time. */
    pub fn key_input(&mut self, now: u64, modifier: bool, down: bool) {
        if modifier {
            self.modifier_down = down;
            if !down {
                self.keytime = now;
            }
        } else if down {
            self.momentum_current = 0;
            self.momentum_deadline = None;
            self.keytime = now;
        }
    }

    /* Relative motion (trackstick) bypasses the touch state machine. */
    pub fn pointer(&mut self, dx: i32, dy: i32, buttons: u32, now: u64, sink: &mut dyn EventSink) {
        if self.ignoreall {
            return;
        }
        self.lastbuttons = buttons;
        sink.pointer_move(dx, dy, buttons, now);
    }

    pub fn scroll(&mut self, vertical: i32, horizontal: i32, now: u64, sink: &mut dyn EventSink) {
        if self.ignoreall {
            return;
        }
        sink.scroll(vertical, horizontal, now);
    }

    fn middle_filter(
        &mut self,
        buttons: u32,
        now: u64,
        from: MbFrom,
        sink: &mut dyn EventSink,
    ) -> u32 {
        if self.ignoreall && from == MbFrom::Trackpad {
            return buttons;
        }
        let out = self.mb.filter(buttons, now, from);
        if let Some(mask) = out.flush {
            sink.pointer_move(0, 0, mask, now);
        }
        out.buttons
    }

    fn synth_click(&mut self, mask: u32, now: u64, sink: &mut dyn EventSink) {
        debug!("tap click: mask={mask:#x}");
        sink.button_click(mask, now);
    }

    fn tap_mask(&self) -> u32 {
        if self.wastriple && self.cfg.rtap {
            if self.cfg.swap_double_triple {
                BUTTON_RIGHT
            } else {
                BUTTON_MIDDLE
            }
        } else if self.wasdouble && self.cfg.rtap {
            if self.cfg.swap_double_triple {
                BUTTON_MIDDLE
            } else {
                BUTTON_RIGHT
            }
        } else {
            BUTTON_LEFT
        }
    }

    /* One normalized sample from the decoder. */
    pub fn process_touch(&mut self, s: TouchSample, now: u64, sink: &mut dyn EventSink) {
        let cfg_xupmm = self.cfg.x_units_per_mm;
        let cfg_yupmm = self.cfg.y_units_per_mm;

        let mut xraw = s.x;
        let mut yraw = s.y;

        /* square up motion to the denser axis, then normalize every
         * model to the same working range so one divisor set fits */
        if cfg_xupmm < cfg_yupmm {
            xraw = xraw * cfg_yupmm / cfg_xupmm;
        } else if cfg_xupmm > cfg_yupmm {
            yraw = yraw * cfg_xupmm / cfg_yupmm;
        }
        xraw *= self.scale;
        yraw *= self.scale;

        let mut x = xraw;
        let mut y = yraw;
        let z = s.z;

        let fingers = if z > self.cfg.z_finger { s.fingers } else { 0 };

        let buttonsraw = s.buttons;
        let mut buttons = buttonsraw;
        self.lastbuttons = buttons;

        /* hardware tap-drag edge from V1/V2 enters drag directly */
        if s.tap_drag_edge {
            self.mode = TouchMode::Drag;
        }

        /* middle-button simulation from the two physical buttons */
        if !self.buttonpad || fingers == 3 {
            let from = if fingers == 3 {
                MbFrom::Passthru
            } else {
                MbFrom::Trackpad
            };
            buttons = self.middle_filter(buttons, now, from, sink);
        }

        /* recalc when a finger is going down */
        if self.last_fingers == 0 && fingers > 0 {
            buttons = self.middle_filter(buttonsraw, now, MbFrom::Cancel, sink);
        }

        if self.last_fingers > 0 && fingers > 0 && self.last_fingers != fingers {
            /* ignore deltas for a while after a finger change */
            self.ignoredeltas = self.cfg.ignore_deltas_start;
        }

        if self.last_fingers != fingers {
            self.reset_filters();
        }

        /* the pad itself applies a decaying average; undo it first */
        if self.cfg.unsmooth_input {
            x = self.x_undo.filter(x as i64) as i32;
            y = self.y_undo.filter(y as i64) as i32;
        }
        if self.cfg.smooth_input {
            x = self.x_avg.filter(x as i64) as i32;
            y = self.y_avg.filter(y as i64) as i32;
        }

        if self.ignoredeltas > 0 {
            self.lastx = x;
            self.lasty = y;
            self.ignoredeltas -= 1;
            if self.ignoredeltas == 0 {
                self.reset_filters();
            }
        }

        /* touches just after typing and outside the allowed zone are
         * palm contacts; drop them entirely */
        if self.cfg.outzone_while_typing
            && z > self.cfg.z_finger
            && now.saturating_sub(self.keytime) < self.cfg.max_after_typing
            && (x < self.cfg.zone_left
                || x > self.cfg.zone_right
                || y < self.cfg.zone_bottom
                || y > self.cfg.zone_top)
        {
            trace!("ignoring touch outside zone shortly after typing");
            return;
        }

        if self.ignoreall {
            return;
        }

        if z < self.cfg.z_finger && self.is_touch_mode() {
            self.on_finger_lift(&mut buttons, now, sink);
        }

        /* cancel pre-drag if the second tap takes too long */
        if self.mode == TouchMode::PreDrag
            && now.saturating_sub(self.untouchtime) >= self.cfg.max_drag_time
        {
            self.mode = TouchMode::NoTouch;
        }

        /* cancel the pending tap if the touch point moved too far */
        if self.is_touch_mode() && self.is_finger_touch(z) && self.last_fingers == fingers {
            let dx = (self.touchx - x).abs();
            let dy = (self.touchy - y).abs();
            if !self.wasdouble
                && !self.wastriple
                && (dx > self.cfg.tap_thresh_x || dy > self.cfg.tap_thresh_y)
            {
                self.touchtime = 0;
            } else if dx > self.cfg.dbl_thresh_x || dy > self.cfg.dbl_thresh_y {
                self.touchtime = 0;
            }
        }

        let mut dx = 0;
        let mut dy = 0;

        match self.mode {
            TouchMode::Drag | TouchMode::DragLock => {
                if self.mode == TouchMode::DragLock
                    || !self.cfg.immediate_click
                    || now.saturating_sub(self.touchtime) > self.cfg.max_dbl_tap_time
                {
                    buttons |= BUTTON_LEFT;
                }
                self.move_deltas(x, y, z, fingers, now, &mut dx, &mut dy);
            }
            TouchMode::Move => {
                self.move_deltas(x, y, z, fingers, now, &mut dx, &mut dy);
            }
            TouchMode::MultiTouch => {
                self.multi_touch(x, y, z, fingers, now, sink);
            }
            TouchMode::DragNoTouch => {
                buttons |= BUTTON_LEFT;
            }
            TouchMode::PreDrag => {
                if !self.cfg.immediate_click
                    && (!self.cfg.palm_while_typing
                        || now.saturating_sub(self.keytime) >= self.cfg.max_after_typing)
                {
                    buttons |= BUTTON_LEFT;
                }
            }
            TouchMode::NoTouch => {}
        }

        /* capture the tap time and watch for multi-finger taps */
        if self.is_finger_touch(z) {
            /* taps don't count too close to typing or during momentum
             * scrolling */
            if (!self.cfg.palm_while_typing
                || now.saturating_sub(self.keytime) >= self.cfg.max_after_typing)
                && self.momentum_current == 0
            {
                if !self.is_touch_mode() {
                    self.touchtime = now;
                }
                if self.last_fingers < fingers {
                    self.touchx = x;
                    self.touchy = y;
                }
                self.wasdouble = fingers == 2 || (self.wasdouble && self.last_fingers != fingers);
                self.wastriple = fingers == 3 || (self.wastriple && self.last_fingers != fingers);
            }

            /* any touch cancels momentum scroll */
            if !self.scrolldebounce && self.momentum_current != 0 {
                self.momentum_current = 0;
                self.momentum_deadline = None;
                self.scroll_debounce_deadline = Some(now + self.cfg.scroll_exit_delay);
                self.scrolldebounce = true;
            }
        }

        /* mode switches driven by this sample */
        if self.mode == TouchMode::PreDrag && self.is_finger_touch(z) {
            self.mode = TouchMode::Drag;
            self.draglocktemp = self.modifier_down;
        }
        if self.mode == TouchMode::DragNoTouch && self.is_finger_touch(z) {
            self.drag_deadline = None;
            self.mode = TouchMode::DragLock;
        }
        if self.mode != TouchMode::MultiTouch && fingers > 1 && self.is_finger_touch(z) {
            self.mode = TouchMode::MultiTouch;
        }
        if self.mode == TouchMode::NoTouch && z > self.cfg.z_finger && !self.scrolldebounce {
            self.mode = TouchMode::Move;
        }

        sink.pointer_move(
            dx / self.cfg.divisor_x,
            dy / self.cfg.divisor_y,
            buttons,
            now,
        );

        self.lastx = x;
        self.lasty = y;
        self.last_fingers = fingers;
    }

    fn on_finger_lift(&mut self, buttons: &mut u32, now: u64, sink: &mut dyn EventSink) {
        self.xrest = 0;
        self.yrest = 0;
        self.swipe3.reset();
        self.swipe4.reset();
        self.xmoved = 0;
        self.ymoved = 0;
        self.untouchtime = now;

        trace!(
            "finger lifted: mode={:?} history={}",
            self.mode,
            self.dy_history.count()
        );

        /* releasing out of multi-touch arms momentum scrolling */
        if self.mode == TouchMode::MultiTouch
            && self.cfg.momentum_scroll
            && self.cfg.momentum_scroll_timer > 0
            && self.dy_history.count() > self.cfg.momentum_scroll_samples_min
        {
            let interval =
                (self.time_history.newest() - self.time_history.oldest()).unsigned_abs();
            if interval > 0 {
                self.momentum_interval = interval;
                self.momentum_current =
                    self.cfg.momentum_scroll_timer as i64 * self.dy_history.sum();
                self.momentum_rest = 0;
                self.momentum_deadline = Some(now + self.cfg.momentum_scroll_timer);
            }
        }
        self.time_history.reset();
        self.dy_history.reset();

        if now.saturating_sub(self.touchtime) < self.cfg.max_tap_time && self.cfg.clicking {
            match self.mode {
                TouchMode::Drag => {
                    if !self.cfg.immediate_click {
                        /* release the held drag button as a click */
                        let held = *buttons & !0x7;
                        sink.pointer_move(0, 0, held | BUTTON_LEFT, now);
                        sink.pointer_move(0, 0, held, now);
                    }
                    let mask = self.tap_mask();
                    self.synth_click(mask, now, sink);
                    self.mode = TouchMode::NoTouch;
                }
                TouchMode::DragLock => {
                    self.mode = TouchMode::NoTouch;
                }
                _ => {
                    let mask = self.tap_mask();
                    self.synth_click(mask, now, sink);
                    self.mode = if mask == BUTTON_LEFT && self.cfg.dragging {
                        TouchMode::PreDrag
                    } else {
                        TouchMode::NoTouch
                    };
                }
            }
        } else if matches!(self.mode, TouchMode::Drag | TouchMode::DragLock)
            && (self.cfg.drag_lock || self.draglocktemp || self.cfg.drag_exit_delay > 0)
        {
            self.mode = TouchMode::DragNoTouch;
            if !self.cfg.drag_lock && !self.draglocktemp {
                self.drag_deadline = Some(now + self.cfg.drag_exit_delay);
            }
        } else {
            self.mode = TouchMode::NoTouch;
            self.draglocktemp = false;
        }

        self.wasdouble = false;
        self.wastriple = false;
    }

    fn move_deltas(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        fingers: u32,
        now: u64,
        dx: &mut i32,
        dy: &mut i32,
    ) {
        if self.last_fingers != fingers || z > self.cfg.z_limit {
            return;
        }
        if now.saturating_sub(self.touchtime) <= MOVE_SETTLE_NS {
            return;
        }

        if self.was_scroll {
            self.was_scroll = false;
            self.ignoredeltas = self.cfg.ignore_deltas_start;
            return;
        }

        *dx = x - self.lastx + self.xrest;
        *dy = self.lasty - y + self.yrest;
        self.xrest = *dx % self.cfg.divisor_x;
        self.yrest = *dy % self.cfg.divisor_y;

        /* spurious jumps */
        if dx.abs() > self.cfg.bogus_dx_thresh || dy.abs() > self.cfg.bogus_dy_thresh {
            *dx = 0;
            *dy = 0;
            self.xrest = 0;
            self.yrest = 0;
        }
    }

    fn multi_touch(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        fingers: u32,
        now: u64,
        sink: &mut dyn EventSink,
    ) {
        match fingers {
            1 => {
                if self.last_fingers != fingers {
                    return;
                }

                /* transition from multitouch to single touch: the user
                 * may be letting go; debounce before moving again */
                if !self.cfg.sticky_multi_finger && !self.scrolldebounce && self.ignoresingle == 0 {
                    self.scroll_debounce_deadline = Some(now + self.cfg.scroll_exit_delay);
                    self.scrolldebounce = true;
                    self.was_scroll = true;
                    self.dy_history.reset();
                    self.time_history.reset();
                    self.mode = TouchMode::Move;
                    return;
                }

                if self.ignoresingle > 0 {
                    self.ignoresingle -= 1;
                }
            }
            2 => {
                if self.last_fingers != fingers {
                    return;
                }
                if self.cfg.palm && z > self.cfg.z_limit {
                    return;
                }
                if self.cfg.palm_while_typing
                    && now.saturating_sub(self.keytime) < self.cfg.max_after_typing
                {
                    return;
                }

                let vdiv = self.cfg.scroll_div_vert;
                let hdiv = self.cfg.scroll_div_horiz;
                let hscroll = self.cfg.hscroll;

                let mut sdy = if vdiv != 0 { y - self.lasty + self.yrest } else { 0 };
                let mut sdx = if hdiv != 0 && hscroll {
                    x - self.lastx + self.xrest
                } else {
                    0
                };
                self.yrest = if vdiv != 0 { sdy % vdiv } else { 0 };
                self.xrest = if hdiv != 0 && hscroll { sdx % hdiv } else { 0 };

                /* stopped or changed direction: clear the history */
                if (sdy < 0) != (self.dy_history.newest() < 0) || sdy == 0 {
                    self.dy_history.reset();
                    self.time_history.reset();
                }
                self.dy_history.filter(i64::from(sdy));
                self.time_history.filter(now as i64);

                /* micro-movements accumulate instead of scrolling */
                if sdx.abs() < self.cfg.scroll_dx_thresh {
                    self.xrest = sdx;
                    sdx = 0;
                }
                if sdy.abs() < self.cfg.scroll_dy_thresh {
                    self.yrest = sdy;
                    sdy = 0;
                }

                if sdx != 0 || sdy != 0 {
                    /* only scroll once movement has ruled out a
                     * two-finger tap */
                    if self.touchtime == 0 {
                        let vertical = if vdiv != 0 { sdy / vdiv } else { 0 };
                        let horizontal = if hdiv != 0 && hscroll { -sdx / hdiv } else { 0 };
                        sink.scroll(vertical, horizontal, now);
                    }
                    self.ignoresingle = 3;
                }
            }
            3 => {
                if self.last_fingers != fingers {
                    return;
                }
                if !self.cfg.three_finger_horiz_swipe && !self.cfg.three_finger_vert_swipe {
                    return;
                }

                self.xmoved += self.lastx - x;
                self.ymoved += y - self.lasty;

                if self.ymoved > self.cfg.swipe_dy
                    && !self.swipe3.up
                    && !self.swipe4.up
                    && self.cfg.three_finger_vert_swipe
                {
                    self.swipe3.up = true;
                    self.swipe3.down = false;
                    self.ymoved = 0;
                    sink.swipe(SwipeDirection::Up, 3, now);
                } else if self.ymoved < -self.cfg.swipe_dy
                    && !self.swipe3.down
                    && !self.swipe4.down
                    && self.cfg.three_finger_vert_swipe
                {
                    self.swipe3.down = true;
                    self.swipe3.up = false;
                    self.ymoved = 0;
                    sink.swipe(SwipeDirection::Down, 3, now);
                } else if self.xmoved < -self.cfg.swipe_dx
                    && !self.swipe3.right
                    && !self.swipe4.right
                    && self.cfg.three_finger_horiz_swipe
                {
                    self.swipe3.right = true;
                    self.swipe3.left = false;
                    self.xmoved = 0;
                    sink.swipe(SwipeDirection::Right, 3, now);
                } else if self.xmoved > self.cfg.swipe_dx
                    && !self.swipe3.left
                    && !self.swipe4.left
                    && self.cfg.three_finger_horiz_swipe
                {
                    self.swipe3.left = true;
                    self.swipe3.right = false;
                    self.xmoved = 0;
                    sink.swipe(SwipeDirection::Left, 3, now);
                }
            }
            4 => {
                if self.last_fingers != fingers {
                    return;
                }

                self.xmoved += self.lastx - x;
                self.ymoved += y - self.lasty;

                if self.ymoved > self.cfg.swipe_dy && !self.swipe4.up {
                    self.swipe4.up = true;
                    self.swipe3.up = false;
                    self.swipe4.down = false;
                    self.ymoved = 0;
                    sink.swipe(SwipeDirection::Up, 4, now);
                } else if self.ymoved < -self.cfg.swipe_dy && !self.swipe4.down {
                    self.swipe4.down = true;
                    self.swipe3.down = false;
                    self.swipe4.up = false;
                    self.ymoved = 0;
                    sink.swipe(SwipeDirection::Down, 4, now);
                } else if self.xmoved < -self.cfg.swipe_dx && !self.swipe4.right {
                    self.swipe4.right = true;
                    self.swipe3.right = false;
                    self.swipe4.left = false;
                    self.xmoved = 0;
                    sink.swipe(SwipeDirection::Right, 4, now);
                } else if self.xmoved > self.cfg.swipe_dx && !self.swipe4.left {
                    self.swipe4.left = true;
                    self.swipe3.left = false;
                    self.swipe4.right = false;
                    self.xmoved = 0;
                    sink.swipe(SwipeDirection::Left, 4, now);
                }
            }
            _ => {}
        }
    }

    /* The nearest armed deadline, for the actor's timer sleep. */
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.drag_deadline,
            self.scroll_debounce_deadline,
            self.momentum_deadline,
            self.mb.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /* Fire whichever deadlines are due. Late or already-resolved timers
     * are no-ops. */
    pub fn on_timer(&mut self, now: u64, sink: &mut dyn EventSink) {
        if self.drag_deadline.is_some_and(|t| t <= now) {
            self.drag_deadline = None;
            if self.mode == TouchMode::DragNoTouch {
                /* drag-exit grace expired: release the held button */
                self.mode = TouchMode::NoTouch;
                sink.pointer_move(0, 0, 0, now);
            }
        }

        if self.scroll_debounce_deadline.is_some_and(|t| t <= now) {
            self.scroll_debounce_deadline = None;
            self.scrolldebounce = false;
        }

        if self.momentum_deadline.is_some_and(|t| t <= now) {
            self.momentum_deadline = None;
            self.momentum_tick(now, sink);
        }

        if self.mb.deadline().is_some_and(|t| t <= now) {
            let buttons = self.lastbuttons;
            let _ = self.middle_filter(buttons, now, MbFrom::Timer, sink);
        }
    }

    /* One momentum-scroll step: replay the decaying average rate. */
    fn momentum_tick(&mut self, now: u64, sink: &mut dyn EventSink) {
        if self.momentum_current == 0 || !self.cfg.momentum_scroll {
            return;
        }

        let interval = self.momentum_interval.max(1) as i64;
        let total = self.momentum_current + self.momentum_rest;
        let delta = total / interval;
        self.momentum_rest = total % interval;

        let vdiv = i64::from(self.cfg.scroll_div_vert.max(1));
        let vertical = (delta / vdiv) as i32;
        if vertical != 0 {
            sink.scroll(vertical, 0, now);
        }

        /* decay */
        self.momentum_current =
            self.momentum_current * self.cfg.momentum_scroll_multiplier
                / self.cfg.momentum_scroll_divisor;

        if delta.abs() < self.cfg.momentum_scroll_thresh_y || self.momentum_current == 0 {
            self.momentum_current = 0;
        } else {
            self.momentum_deadline = Some(now + self.cfg.momentum_scroll_timer);
        }
    }
}
