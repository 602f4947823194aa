use serde::Serialize;
use tokio::sync::mpsc;

/* Button mask bits, shared across the packet decoders and the gesture
 * engine. */
pub const BUTTON_LEFT: u32 = 0x01;
pub const BUTTON_RIGHT: u32 = 0x02;
pub const BUTTON_MIDDLE: u32 = 0x04;

/* Discrete swipe direction fired by the 3/4-finger accumulators. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/* A normalized input event with a monotonic timestamp, serialized as a
 * JSON line by the daemon. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerMove {
        dx: i32,
        dy: i32,
        buttons: u32,
        timestamp_ns: u64,
    },
    Scroll {
        vertical: i32,
        horizontal: i32,
        timestamp_ns: u64,
    },
    Swipe {
        direction: SwipeDirection,
        fingers: u32,
        timestamp_ns: u64,
    },
    ButtonClick {
        buttons: u32,
        timestamp_ns: u64,
    },
}

/* Where decoded events go. The gesture engine only talks to this trait,
 * so tests can collect events in a Vec while the daemon forwards them
 * over a channel. */
pub trait EventSink {
    fn pointer_move(&mut self, dx: i32, dy: i32, buttons: u32, timestamp_ns: u64);
    fn scroll(&mut self, vertical: i32, horizontal: i32, timestamp_ns: u64);
    fn swipe(&mut self, direction: SwipeDirection, fingers: u32, timestamp_ns: u64);
    fn button_click(&mut self, buttons: u32, timestamp_ns: u64);
}

/* Sink backed by an unbounded tokio channel; the receiving side is
 * drained as a stream in main. */
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<InputEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&mut self, event: InputEvent) {
        /* The receiver going away just means nobody is listening anymore. */
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn pointer_move(&mut self, dx: i32, dy: i32, buttons: u32, timestamp_ns: u64) {
        self.push(InputEvent::PointerMove {
            dx,
            dy,
            buttons,
            timestamp_ns,
        });
    }

    fn scroll(&mut self, vertical: i32, horizontal: i32, timestamp_ns: u64) {
        self.push(InputEvent::Scroll {
            vertical,
            horizontal,
            timestamp_ns,
        });
    }

    fn swipe(&mut self, direction: SwipeDirection, fingers: u32, timestamp_ns: u64) {
        self.push(InputEvent::Swipe {
            direction,
            fingers,
            timestamp_ns,
        });
    }

    fn button_click(&mut self, buttons: u32, timestamp_ns: u64) {
        self.push(InputEvent::ButtonClick {
            buttons,
            timestamp_ns,
        });
    }
}

/* Vec-backed sink for unit tests. */
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CollectSink {
    pub events: Vec<InputEvent>,
}

#[cfg(test)]
impl EventSink for CollectSink {
    fn pointer_move(&mut self, dx: i32, dy: i32, buttons: u32, timestamp_ns: u64) {
        self.events.push(InputEvent::PointerMove {
            dx,
            dy,
            buttons,
            timestamp_ns,
        });
    }

    fn scroll(&mut self, vertical: i32, horizontal: i32, timestamp_ns: u64) {
        self.events.push(InputEvent::Scroll {
            vertical,
            horizontal,
            timestamp_ns,
        });
    }

    fn swipe(&mut self, direction: SwipeDirection, fingers: u32, timestamp_ns: u64) {
        self.events.push(InputEvent::Swipe {
            direction,
            fingers,
            timestamp_ns,
        });
    }

    fn button_click(&mut self, buttons: u32, timestamp_ns: u64) {
        self.events.push(InputEvent::ButtonClick {
            buttons,
            timestamp_ns,
        });
    }
}
