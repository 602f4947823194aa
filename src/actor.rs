/* Device session actor.
 *
 * One task per touchpad owns the port, the framer, the decoder and the
 * gesture engine, so identification and bring-up exchanges can never
 * interleave with packet bytes. Host-side callers (keyboard
 * notifications, enable/disable, shutdown) talk to it through an mpsc
 * channel. */

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GestureConfig;
use crate::device::Profile;
use crate::error::DriverError;
use crate::events::EventSink;
use crate::framer::{FrameEvent, Framer};
use crate::gesture::GestureEngine;
use crate::protocol::{DecodeEvent, Decoder};
use crate::transport::{self, Ps2Port};
use crate::{bringup, identify};

/* Commands the host side can send to the session actor. */
#[derive(Debug)]
pub enum ActorMessage {
    /* stop event delivery and reset, or bring the pad back up */
    SetEnabled(bool),
    /* keyboard activity, for typing-proximity suppression */
    KeyPressed { modifier: bool, down: bool },
    /* gracefully shut down the session */
    Shutdown,
}

/* Handle used to send commands to a running session. */
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<ActorMessage>,
}

impl SessionHandle {
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ActorMessage::Shutdown).await;
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(ActorMessage::SetEnabled(enabled)).await;
    }

    pub async fn key_pressed(&self, modifier: bool, down: bool) {
        let _ = self
            .tx
            .send(ActorMessage::KeyPressed { modifier, down })
            .await;
    }
}

struct Session<P, S> {
    io: P,
    profile: Profile,
    framer: Framer,
    decoder: Decoder,
    engine: GestureEngine,
    sink: S,
    rx: mpsc::Receiver<ActorMessage>,
    epoch: Instant,
}

/* Reset, identify and bring up the device on `io`, then spawn the
 * packet-pump task. Fails with `Identification` if this is not an ALPS
 * pad and with `HardwareInit` if the mode switch sequence fails. */
pub async fn spawn_session<P, S>(
    mut io: P,
    cfg: GestureConfig,
    sink: S,
) -> Result<SessionHandle, DriverError>
where
    P: Ps2Port + Send + 'static,
    S: EventSink + Send + 'static,
{
    if let Err(err) = transport::reset(&mut io).await {
        warn!("initial reset failed: {err:#}");
    }

    let identity = identify::identify(&mut io).await?;
    let mut profile = identify::bind_profile(&mut io, &identity)
        .await
        .map_err(|e| DriverError::Identification(format!("{e:#}")))?;

    bringup::initialize(&mut io, &mut profile).await?;

    info!(
        "session started: {} byte0={:#04x} mask0={:#04x} {}x{}",
        profile.version, profile.byte0, profile.mask0, profile.x_max, profile.y_max
    );

    let (tx, rx) = mpsc::channel(16);

    let session = Session {
        framer: Framer::new(),
        decoder: Decoder::new(profile.clone()),
        engine: GestureEngine::new(cfg, &profile),
        io,
        profile,
        sink,
        rx,
        epoch: Instant::now(),
    };

    tokio::spawn(async move {
        session.run().await;
    });

    Ok(SessionHandle { tx })
}

impl<P, S> Session<P, S>
where
    P: Ps2Port + Send,
    S: EventSink + Send,
{
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn deadline_instant(&self) -> Option<Instant> {
        self.engine
            .next_deadline()
            .map(|ns| self.epoch + std::time::Duration::from_nanos(ns))
    }

    /* Main loop: pump stream bytes, fire gesture deadlines, service
     * host messages. Bytes and messages never overlap with command
     * exchanges because both run on this one task. */
    async fn run(mut self) {
        loop {
            let deadline = self.deadline_instant();
            let mut pending: Option<ActorMessage> = None;
            let mut stop = false;

            {
                let io = &mut self.io;
                let rx = &mut self.rx;
                tokio::select! {
                    byte = io.read_byte() => match byte {
                        Ok(b) => {
                            let now = self.epoch.elapsed().as_nanos() as u64;
                            Self::on_byte(
                                &mut self.framer,
                                &mut self.decoder,
                                &mut self.engine,
                                &mut self.sink,
                                b,
                                now,
                            );
                        }
                        Err(err) => {
                            warn!("stream read failed, stopping session: {err:#}");
                            stop = true;
                        }
                    },
                    msg = rx.recv() => match msg {
                        Some(msg) => pending = Some(msg),
                        None => stop = true,
                    },
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() =>
                    {
                        let now = self.epoch.elapsed().as_nanos() as u64;
                        self.engine.on_timer(now, &mut self.sink);
                    }
                }
            }

            if let Some(msg) = pending {
                if self.handle_message(msg).await.is_break() {
                    stop = true;
                }
            }
            if stop {
                break;
            }
        }

        info!(
            "session ended ({} packet slots dropped)",
            self.framer.dropped_packets()
        );
    }

    async fn handle_message(&mut self, msg: ActorMessage) -> std::ops::ControlFlow<()> {
        match msg {
            ActorMessage::Shutdown => {
                info!("session shutting down");
                if let Err(err) = transport::reset(&mut self.io).await {
                    warn!("shutdown reset failed: {err:#}");
                }
                return std::ops::ControlFlow::Break(());
            }
            ActorMessage::SetEnabled(false) => {
                debug!("touchpad disabled (mode was {:?})", self.engine.mode());
                self.engine.set_enabled(false);
                self.decoder.reset();
                self.framer.reset();
                if let Err(err) = transport::reset(&mut self.io).await {
                    warn!("disable reset failed: {err:#}");
                }
            }
            ActorMessage::SetEnabled(true) => {
                debug!("touchpad re-enabled");
                if let Err(err) = bringup::initialize(&mut self.io, &mut self.profile).await {
                    warn!("re-enable failed: {err}");
                } else {
                    self.engine.set_enabled(true);
                }
            }
            ActorMessage::KeyPressed { modifier, down } => {
                let now = self.now_ns();
                self.engine.key_input(now, modifier, down);
            }
        }
        std::ops::ControlFlow::Continue(())
    }

    fn on_byte(
        framer: &mut Framer,
        decoder: &mut Decoder,
        engine: &mut GestureEngine,
        sink: &mut S,
        byte: u8,
        now: u64,
    ) {
        let pktlen = decoder.profile().packet_len();
        match framer.push(decoder.profile(), byte) {
            FrameEvent::Buffering => {}
            FrameEvent::Dropped(reason) => {
                debug!("dropped packet slot: {}", reason.as_str());
            }
            FrameEvent::Ready(packet) => {
                for event in decoder.process(&packet[..pktlen]) {
                    match event {
                        DecodeEvent::Touch(sample) => engine.process_touch(sample, now, sink),
                        DecodeEvent::Pointer { dx, dy, buttons } => {
                            engine.pointer(dx, dy, buttons, now, sink)
                        }
                        DecodeEvent::Scroll {
                            vertical,
                            horizontal,
                        } => engine.scroll(vertical, horizontal, now, sink),
                    }
                }
            }
        }
    }
}
