/* Scripted transport for driving the command layer and the decoder
 * stack without hardware.
 *
 * Unit tests use `ScriptedPort` directly; with the `dev-hooks` feature
 * the daemon can also load a JSON replay spec and run the whole
 * pipeline against it. Never enable dev-hooks in production builds. */

use std::collections::VecDeque;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::transport::{Ps2Port, Step};

/* A port that answers Read steps from a canned reply queue and records
 * every command byte sent. */
#[derive(Debug, Default)]
pub struct ScriptedPort {
    replies: VecDeque<u8>,
    stream: VecDeque<u8>,
    /* every command byte submitted, in order */
    pub sent: Vec<u8>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /* Queue bytes to be returned by subsequent Read steps. */
    pub fn push_replies(&mut self, bytes: &[u8]) {
        self.replies.extend(bytes.iter().copied());
    }

    /* Queue bytes for the streaming (packet) path. */
    pub fn push_stream(&mut self, bytes: &[u8]) {
        self.stream.extend(bytes.iter().copied());
    }

    pub fn replies_exhausted(&self) -> bool {
        self.replies.is_empty()
    }
}

#[async_trait]
impl Ps2Port for ScriptedPort {
    async fn submit(&mut self, steps: &[Step]) -> Result<Vec<u8>> {
        let mut results = Vec::new();
        for step in steps {
            match *step {
                Step::Command(c) => self.sent.push(c),
                Step::Read => match self.replies.pop_front() {
                    Some(b) => results.push(b),
                    None => bail!("scripted port: reply queue exhausted"),
                },
            }
        }
        Ok(results)
    }

    async fn read_byte(&mut self) -> Result<u8> {
        match self.stream.pop_front() {
            Some(b) => Ok(b),
            None => bail!("scripted port: stream exhausted"),
        }
    }
}

/* JSON replay spec for dev-hooks runs.
 *
 * ```json
 * { "replies": [170, 0], "stream": [248, 16, 2, 1, 32, 42] }
 * ```
 *
 * `replies` feed the identification/bring-up reads, `stream` the
 * packet pump. */
#[cfg(feature = "dev-hooks")]
pub mod spec {
    use serde::Deserialize;

    use super::ScriptedPort;
    use anyhow::{Context, Result};

    #[derive(Debug, Default, Deserialize)]
    pub struct ReplaySpec {
        #[serde(default)]
        pub replies: Vec<u8>,
        #[serde(default)]
        pub stream: Vec<u8>,
    }

    impl ReplaySpec {
        pub fn load(path: &std::path::Path) -> Result<Self> {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read replay spec {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse replay spec {}", path.display()))
        }

        pub fn into_port(self) -> ScriptedPort {
            let mut port = ScriptedPort::new();
            port.push_replies(&self.replies);
            port.push_stream(&self.stream);
            port
        }
    }
}
