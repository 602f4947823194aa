/* PS/2 command transport.
 *
 * All hardware I/O goes through the `Ps2Port` trait so the bring-up
 * sequencer and identification never touch raw file handles directly,
 * and so the whole command layer can run against a scripted port in
 * tests. The real implementation drives a `/dev/serio_rawN` node. */

use std::os::fd::FromRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

/* Standard PS/2 pointing-device command bytes. The ALPS magic knock
 * sequences are built entirely out of these. */
pub mod cmd {
    pub const SET_SCALING_1TO1: u8 = 0xe6;
    pub const SET_SCALING_2TO1: u8 = 0xe7;
    pub const SET_RESOLUTION: u8 = 0xe8;
    pub const GET_INFO: u8 = 0xe9;
    pub const SET_STREAM_MODE: u8 = 0xea;
    pub const RESET_WRAP: u8 = 0xec;
    pub const SET_POLL: u8 = 0xf0;
    pub const GET_ID: u8 = 0xf2;
    pub const SET_SAMPLE_RATE: u8 = 0xf3;
    pub const ENABLE: u8 = 0xf4;
    pub const SET_DEFAULTS_AND_DISABLE: u8 = 0xf5;
    pub const SET_DEFAULTS: u8 = 0xf6;
    pub const RESET: u8 = 0xff;

    /* self-test passed / device id, returned after RESET */
    pub const SELFTEST_PASSED: u8 = 0xaa;
    pub const MOUSE_ID: u8 = 0x00;
}

pub const ACK: u8 = 0xfa;
pub const RESEND: u8 = 0xfe;

/* Timeout per individual response byte */
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/* Resend attempts before a command is declared failed */
const MAX_RESENDS: usize = 3;

/* One element of a synchronous command exchange: either a command byte
 * (acknowledged by the device) or a data-port read. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Command(u8),
    Read,
}

/* Byte-oriented transport consumed by identification and bring-up.
 *
 * `submit` is the blocking request/response path and must only be used
 * while the session holds the device exclusively (never from the packet
 * pump). `read_byte` is the streaming path feeding the framer. */
#[async_trait]
pub trait Ps2Port: Send {
    async fn submit(&mut self, steps: &[Step]) -> Result<Vec<u8>>;

    async fn read_byte(&mut self) -> Result<u8>;
}

/* Send a bare command. */
pub async fn command<P: Ps2Port + ?Sized>(io: &mut P, c: u8) -> Result<()> {
    io.submit(&[Step::Command(c)]).await?;
    Ok(())
}

/* Send a command followed by its argument byte. */
pub async fn command_arg<P: Ps2Port + ?Sized>(io: &mut P, c: u8, arg: u8) -> Result<()> {
    io.submit(&[Step::Command(c), Step::Command(arg)]).await?;
    Ok(())
}

/* Issue GET_INFO and read the 3-byte status report. */
pub async fn status_report<P: Ps2Port + ?Sized>(io: &mut P) -> Result<[u8; 3]> {
    let bytes = io
        .submit(&[Step::Command(cmd::GET_INFO), Step::Read, Step::Read, Step::Read])
        .await
        .context("status report read failed")?;
    if bytes.len() != 3 {
        bail!("status report returned {} bytes, expected 3", bytes.len());
    }
    Ok([bytes[0], bytes[1], bytes[2]])
}

/* Reset the device and verify the 0xAA/0x00 self-test response. */
pub async fn reset<P: Ps2Port + ?Sized>(io: &mut P) -> Result<()> {
    let bytes = io
        .submit(&[Step::Command(cmd::RESET), Step::Read, Step::Read])
        .await
        .context("reset command failed")?;
    if bytes.first().copied() != Some(cmd::SELFTEST_PASSED)
        && bytes.get(1).copied() != Some(cmd::MOUSE_ID)
    {
        bail!("reset self-test mismatch: {bytes:02x?}");
    }
    Ok(())
}

/* A serio_raw character device node. */
pub struct SerioPort {
    file: tokio::fs::File,
    path: PathBuf,
}

impl SerioPort {
    /* Open the serio_raw node at `path`. */
    pub fn open(path: &Path) -> Result<Self> {
        let fd = fcntl::open(path, OFlag::O_RDWR | OFlag::O_NOCTTY, Mode::empty())
            .with_context(|| format!("Failed to open serio device {}", path.display()))?;
        /* Safety: `fd` was just returned by open() and is owned here. */
        let std_file = unsafe { std::fs::File::from_raw_fd(fd) };

        Ok(Self {
            file: tokio::fs::File::from_std(std_file),
            path: path.to_path_buf(),
        })
    }

    async fn read_one(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        let n = self
            .file
            .read(&mut buf)
            .await
            .with_context(|| format!("Read failed on {}", self.path.display()))?;
        if n == 0 {
            bail!("serio port {} closed", self.path.display());
        }
        Ok(buf[0])
    }

    async fn read_one_timeout(&mut self) -> Result<u8> {
        match tokio::time::timeout(READ_TIMEOUT, self.read_one()).await {
            Ok(result) => result,
            Err(_elapsed) => bail!("timeout waiting for {}", self.path.display()),
        }
    }

    /* Write one command byte and consume the ACK, honoring resends. */
    async fn send_command(&mut self, c: u8) -> Result<()> {
        for _ in 0..=MAX_RESENDS {
            self.file
                .write_all(&[c])
                .await
                .with_context(|| format!("Write failed on {}", self.path.display()))?;
            trace!("TX {c:02x}");

            let reply = self.read_one_timeout().await?;
            match reply {
                ACK => return Ok(()),
                RESEND => {
                    debug!("device asked for resend of {c:02x}");
                    continue;
                }
                other => bail!("command {c:02x} answered {other:02x}, expected ACK"),
            }
        }
        bail!("command {c:02x} exhausted resend attempts")
    }
}

#[async_trait]
impl Ps2Port for SerioPort {
    async fn submit(&mut self, steps: &[Step]) -> Result<Vec<u8>> {
        let mut results = Vec::new();
        for step in steps {
            match *step {
                Step::Command(c) => self.send_command(c).await?,
                Step::Read => results.push(self.read_one_timeout().await?),
            }
        }
        trace!("RX {results:02x?}");
        Ok(results)
    }

    async fn read_byte(&mut self) -> Result<u8> {
        self.read_one().await
    }
}
