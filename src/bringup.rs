/* Device bring-up sequencer.
 *
 * Each protocol version needs its own magic knock to leave relative
 * PS/2 mode: a vendor command mode entered via reset-wrap, registers
 * addressed and written one nibble at a time through lookup tables of
 * ordinary PS/2 commands, then a final sample-rate/enable dance. The
 * original unwound failures with gotos; here every step short-circuits
 * with `?` and the wrappers guarantee command mode is exited on the
 * failure path so the device is never left wedged. */

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::device::{NibbleSet, Profile, ProtocolVersion};
use crate::error::DriverError;
use crate::transport::{Ps2Port, Step, cmd, command, command_arg, reset, status_report};

/* Register bases for the V3/V4-era command mode protocol */
pub const REG_BASE_PINNACLE: u16 = 0x0000;
pub const REG_BASE_RUSHMORE: u16 = 0xc2c0;
pub const REG_BASE_V7: u16 = 0xc2c0;

/* Encodings for register accesses: one entry per nibble value. The low
 * byte is the PS/2 command; `SEND` marks a trailing argument byte and
 * `RECV` a byte read back after the command. */
#[derive(Debug, Clone, Copy)]
struct NibbleCommand {
    command: u16,
    data: u8,
}

const SEND: u16 = 0x1000;
const RECV: u16 = 0x0100;

const fn nc(command: u16, data: u8) -> NibbleCommand {
    NibbleCommand { command, data }
}

static V3_NIBBLE_COMMANDS: [NibbleCommand; 16] = [
    nc(cmd::SET_POLL as u16, 0x00),                  /* 0 */
    nc(cmd::SET_DEFAULTS as u16, 0x00),              /* 1 */
    nc(cmd::SET_SCALING_2TO1 as u16, 0x00),          /* 2 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x0a),    /* 3 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x14),    /* 4 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x28),    /* 5 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x3c),    /* 6 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x50),    /* 7 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x64),    /* 8 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0xc8),    /* 9 */
    nc(cmd::GET_ID as u16 | RECV, 0x00),             /* a */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x00),     /* b */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x01),     /* c */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x02),     /* d */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x03),     /* e */
    nc(cmd::SET_SCALING_1TO1 as u16, 0x00),          /* f */
];

static V4_NIBBLE_COMMANDS: [NibbleCommand; 16] = [
    nc(cmd::ENABLE as u16, 0x00),                    /* 0 */
    nc(cmd::SET_DEFAULTS as u16, 0x00),              /* 1 */
    nc(cmd::SET_SCALING_2TO1 as u16, 0x00),          /* 2 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x0a),    /* 3 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x14),    /* 4 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x28),    /* 5 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x3c),    /* 6 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x50),    /* 7 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0x64),    /* 8 */
    nc(cmd::SET_SAMPLE_RATE as u16 | SEND, 0xc8),    /* 9 */
    nc(cmd::GET_ID as u16 | RECV, 0x00),             /* a */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x00),     /* b */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x01),     /* c */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x02),     /* d */
    nc(cmd::SET_RESOLUTION as u16 | SEND, 0x03),     /* e */
    nc(cmd::SET_SCALING_1TO1 as u16, 0x00),          /* f */
];

static V6_NIBBLE_COMMANDS: [NibbleCommand; 16] = [
    nc(cmd::ENABLE as u16, 0x00),                    /* 0 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0x0a),           /* 1 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0x14),           /* 2 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0x28),           /* 3 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0x3c),           /* 4 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0x50),           /* 5 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0x64),           /* 6 */
    nc(cmd::SET_SAMPLE_RATE as u16, 0xc8),           /* 7 */
    nc(cmd::GET_ID as u16, 0x00),                    /* 8 */
    nc(cmd::GET_INFO as u16, 0x00),                  /* 9 */
    nc(cmd::SET_RESOLUTION as u16, 0x00),            /* a */
    nc(cmd::SET_RESOLUTION as u16, 0x01),            /* b */
    nc(cmd::SET_RESOLUTION as u16, 0x02),            /* c */
    nc(cmd::SET_RESOLUTION as u16, 0x03),            /* d */
    nc(cmd::SET_SCALING_2TO1 as u16, 0x00),          /* e */
    nc(cmd::SET_SCALING_1TO1 as u16, 0x00),          /* f */
];

fn nibble_table(set: NibbleSet) -> &'static [NibbleCommand; 16] {
    match set {
        NibbleSet::V3 => &V3_NIBBLE_COMMANDS,
        NibbleSet::V4 => &V4_NIBBLE_COMMANDS,
        NibbleSet::V6 => &V6_NIBBLE_COMMANDS,
    }
}

/* Run a command three times and collect the resulting status report;
 * this is the E6/E7/EC probe primitive. `init_arg` prefixes the run
 * with a SET_RESOLUTION and its argument. */
pub async fn rpt_cmd<P: Ps2Port + ?Sized>(
    io: &mut P,
    init_arg: Option<u8>,
    repeated: u8,
) -> Result<[u8; 3]> {
    let mut steps = Vec::new();
    if let Some(arg) = init_arg {
        steps.push(Step::Command(cmd::SET_RESOLUTION));
        steps.push(Step::Command(arg));
    }
    for _ in 0..3 {
        steps.push(Step::Command(repeated));
    }
    steps.push(Step::Command(cmd::GET_INFO));
    steps.extend([Step::Read, Step::Read, Step::Read]);

    let bytes = io
        .submit(&steps)
        .await
        .with_context(|| format!("{repeated:02x} report failed"))?;
    if bytes.len() != 3 {
        bail!("{repeated:02x} report returned {} bytes", bytes.len());
    }
    debug!("{repeated:02x} report: {bytes:02x?}");
    Ok([bytes[0], bytes[1], bytes[2]])
}

/* Enter the vendor command mode via the reset-wrap knock. */
pub async fn enter_command_mode<P: Ps2Port + ?Sized>(io: &mut P) -> Result<[u8; 3]> {
    rpt_cmd(io, None, cmd::RESET_WRAP)
        .await
        .context("failed to enter command mode")
}

/* Back to streaming mode. Safe to call when not in command mode. */
pub async fn exit_command_mode<P: Ps2Port + ?Sized>(io: &mut P) -> Result<()> {
    command(io, cmd::SET_STREAM_MODE)
        .await
        .context("failed to exit command mode")
}

/* Transmit one nibble via its lookup entry. */
async fn send_nibble<P: Ps2Port + ?Sized>(io: &mut P, set: NibbleSet, nibble: u8) -> Result<()> {
    debug_assert!(nibble <= 0xf);
    let entry = &nibble_table(set)[usize::from(nibble & 0xf)];

    let mut steps = vec![Step::Command((entry.command & 0xff) as u8)];
    let send = (entry.command >> 12) & 0xf;
    let receive = (entry.command >> 8) & 0xf;
    if send > 0 {
        steps.push(Step::Command(entry.data));
    }
    for _ in 0..receive {
        steps.push(Step::Read);
    }

    io.submit(&steps)
        .await
        .with_context(|| format!("nibble {nibble:x} failed"))?;
    Ok(())
}

/* Announce a register address, most significant nibble first. */
async fn set_addr<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile, addr: u16) -> Result<()> {
    command(io, profile.addr_command)
        .await
        .context("address command failed")?;

    for shift in [12u16, 8, 4, 0] {
        let nibble = ((addr >> shift) & 0xf) as u8;
        send_nibble(io, profile.nibble_set, nibble).await?;
    }
    Ok(())
}

/* Read a register. The addressed register is echoed in the first two
 * result bytes and must match. */
pub async fn read_reg<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile, addr: u16) -> Result<u8> {
    set_addr(io, profile, addr).await?;

    let bytes = status_report(io)
        .await
        .with_context(|| format!("register {addr:#06x} read failed"))?;

    let echoed = (u16::from(bytes[0]) << 8) | u16::from(bytes[1]);
    if echoed != addr {
        bail!("register read echoed {echoed:#06x}, expected {addr:#06x}");
    }

    Ok(bytes[2])
}

/* Write a value to the currently addressed register. */
pub async fn write_reg_value<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    value: u8,
) -> Result<()> {
    send_nibble(io, profile.nibble_set, (value >> 4) & 0xf).await?;
    send_nibble(io, profile.nibble_set, value & 0xf).await
}

/* Address a register and write it. */
pub async fn write_reg<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    addr: u16,
    value: u8,
) -> Result<()> {
    set_addr(io, profile, addr).await?;
    write_reg_value(io, profile, value).await
}

/* Word-oriented monitor mode, used by V6 only. Words go out low nibble
 * first. */
async fn monitor_mode_send_word<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    word: u16,
) -> Result<()> {
    for shift in [0u16, 4, 8] {
        send_nibble(io, profile.nibble_set, ((word >> shift) & 0xf) as u8).await?;
    }
    Ok(())
}

async fn monitor_mode_write_reg<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    addr: u16,
    value: u16,
) -> Result<()> {
    command(io, cmd::ENABLE).await?;
    monitor_mode_send_word(io, profile, 0x0a0).await?;
    monitor_mode_send_word(io, profile, addr).await?;
    monitor_mode_send_word(io, profile, value).await?;
    command(io, cmd::SET_DEFAULTS_AND_DISABLE).await
}

async fn monitor_mode<P: Ps2Port + ?Sized>(io: &mut P, enable: bool) -> Result<()> {
    if !enable {
        return command(io, cmd::RESET_WRAP).await;
    }

    command(io, cmd::RESET_WRAP).await?;
    status_report(io)
        .await
        .context("monitor mode info read failed")?;
    command(io, cmd::SET_DEFAULTS_AND_DISABLE).await?;
    command(io, cmd::SET_DEFAULTS_AND_DISABLE).await?;
    command(io, cmd::SET_SCALING_2TO1).await?;
    command(io, cmd::SET_SCALING_1TO1).await?;
    command(io, cmd::SET_SCALING_2TO1).await?;
    status_report(io)
        .await
        .context("monitor mode info read failed")?;
    Ok(())
}

async fn absolute_mode_v6<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    monitor_mode(io, true).await?;
    monitor_mode_write_reg(io, profile, 0x000, 0x181).await?;
    monitor_mode(io, false).await
}

/* F5 status report. */
pub async fn get_status<P: Ps2Port + ?Sized>(io: &mut P) -> Result<[u8; 3]> {
    rpt_cmd(io, None, cmd::SET_DEFAULTS_AND_DISABLE).await
}

/* Toggle hardware tapping: E9 F5 F5 F3 0A to enable, E9 F5 F5 E8 00 to
 * disable, verified with a follow-up status read. */
pub async fn tap_mode<P: Ps2Port + ?Sized>(io: &mut P, enable: bool) -> Result<()> {
    let (c, arg) = if enable {
        (cmd::SET_SAMPLE_RATE, 0x0a)
    } else {
        (cmd::SET_RESOLUTION, 0x00)
    };

    io.submit(&[
        Step::Command(cmd::GET_INFO),
        Step::Read,
        Step::Read,
        Step::Read,
        Step::Command(cmd::SET_DEFAULTS_AND_DISABLE),
        Step::Command(cmd::SET_DEFAULTS_AND_DISABLE),
        Step::Command(c),
        Step::Command(arg),
    ])
    .await
    .context("tap mode sequence failed")?;

    get_status(io).await.map(drop)
}

/* V2-era passthrough toggle: three scaling commands plus a disable. */
async fn passthrough_mode_v2<P: Ps2Port + ?Sized>(io: &mut P, enable: bool) -> Result<()> {
    let c = if enable {
        cmd::SET_SCALING_2TO1
    } else {
        cmd::SET_SCALING_1TO1
    };
    io.submit(&[
        Step::Command(c),
        Step::Command(c),
        Step::Command(c),
        Step::Command(cmd::SET_DEFAULTS_AND_DISABLE),
    ])
    .await
    .context("passthrough toggle failed")?;
    Ok(())
}

async fn absolute_mode_v1_v2<P: Ps2Port + ?Sized>(io: &mut P) -> Result<()> {
    for _ in 0..4 {
        command(io, cmd::SET_DEFAULTS_AND_DISABLE).await?;
    }
    command(io, cmd::ENABLE).await?;

    /* Poll (remote) mode keeps motion data out of the way during the
     * rest of the bring-up. */
    command(io, cmd::SET_POLL).await
}

async fn hw_init_v1_v2<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    if profile.caps.passthrough {
        passthrough_mode_v2(io, true).await?;
    }

    tap_mode(io, true).await.context("failed to enable tapping")?;

    absolute_mode_v1_v2(io)
        .await
        .context("failed to enable absolute mode")?;

    if profile.caps.passthrough {
        passthrough_mode_v2(io, false).await?;
    }

    /* stream mode, or the pad won't report at all */
    command(io, cmd::SET_STREAM_MODE).await
}

async fn hw_init_v6<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    /* passthrough lets the trackpoint enter 6-byte raw mode */
    passthrough_mode_v2(io, true).await?;

    command(io, cmd::SET_SCALING_1TO1).await?;
    command(io, cmd::SET_SCALING_1TO1).await?;
    command(io, cmd::SET_SCALING_1TO1).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0xc8).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x14).await?;

    passthrough_mode_v2(io, false).await?;

    absolute_mode_v6(io, profile).await
}

/* V3-era passthrough: bit 0 of the port register. Command mode is
 * always exited, pass or fail. */
async fn passthrough_mode_v3<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    reg_base: u16,
    enable: bool,
) -> Result<()> {
    enter_command_mode(io).await?;

    let result = async {
        let reg_val = read_reg(io, profile, reg_base + 0x0008).await?;
        let new_val = if enable { reg_val | 0x01 } else { reg_val & !0x01 };
        write_reg_value(io, profile, new_val).await
    }
    .await;

    let exit = exit_command_mode(io).await;
    result.and(exit)
}

/* Must already be in command mode. */
async fn absolute_mode_v3<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    let reg_val = read_reg(io, profile, 0x0004).await?;
    write_reg_value(io, profile, reg_val | 0x06).await
}

/* Probe the trackstick-presence bit. Always exits command mode. */
pub async fn probe_trackstick_v3_v7<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    reg_base: u16,
) -> Result<bool> {
    enter_command_mode(io).await?;

    let result = read_reg(io, profile, reg_base + 0x08).await;
    let exit = exit_command_mode(io).await;

    let reg_val = result?;
    exit?;

    /* bit 7: trackstick is present */
    Ok(reg_val & 0x80 != 0)
}

/* Bring the trackstick behind the passthrough port into the packet
 * format this driver understands. `Ok(false)` means the E7 probe saw
 * no stick after all. */
async fn setup_trackstick_v3<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    reg_base: u16,
) -> Result<bool> {
    passthrough_mode_v3(io, profile, reg_base, true).await?;

    let result: Result<bool> = async {
        /* E7 report for the trackstick itself. A failure here means the
         * presence bit lied; carry on without a stick. */
        if rpt_cmd(io, None, cmd::SET_SCALING_2TO1).await.is_err() {
            warn!("trackstick E7 report failed, assuming no trackstick");
            return Ok(false);
        }

        /* Magic scaling knock; without it the touchpad stops working
         * and the stick emits plain PS/2 packets. */
        io.submit(&[
            Step::Command(cmd::SET_SCALING_1TO1),
            Step::Command(cmd::SET_SCALING_1TO1),
            Step::Command(cmd::SET_SCALING_1TO1),
        ])
        .await
        .context("magic E6 scaling sequence failed")?;
        send_nibble(io, profile.nibble_set, 0x9).await?;
        send_nibble(io, profile.nibble_set, 0x4).await?;
        debug!("sent magic E6 sequence");

        /* Bit 1 selects the packet format this driver parses. */
        enter_command_mode(io).await?;
        write_reg(io, profile, reg_base + 0x0008, 0x82).await?;
        exit_command_mode(io).await?;

        Ok(true)
    }
    .await;

    let restore = passthrough_mode_v3(io, profile, reg_base, false).await;
    let present = result?;
    restore?;
    Ok(present)
}

async fn hw_init_v3<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    if profile.caps.dualpoint {
        setup_trackstick_v3(io, profile, REG_BASE_PINNACLE)
            .await
            .context("trackstick setup failed")?;
    }

    let result = async {
        enter_command_mode(io).await?;
        absolute_mode_v3(io, profile)
            .await
            .context("failed to enter absolute mode")?;

        let reg_val = read_reg(io, profile, 0x0006).await?;
        write_reg_value(io, profile, reg_val | 0x01).await?;

        let reg_val = read_reg(io, profile, 0x0007).await?;
        write_reg_value(io, profile, reg_val | 0x01).await?;

        read_reg(io, profile, 0x0144).await?;
        write_reg_value(io, profile, 0x04).await?;

        read_reg(io, profile, 0x0159).await?;
        write_reg_value(io, profile, 0x03).await?;

        read_reg(io, profile, 0x0163).await?;
        write_reg(io, profile, 0x0163, 0x03).await?;

        read_reg(io, profile, 0x0162).await?;
        write_reg(io, profile, 0x0162, 0x04).await
    }
    .await;

    let exit = exit_command_mode(io).await;
    result.and(exit)?;

    /* set rate and enable data reporting */
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x28).await?;
    command(io, cmd::ENABLE).await
}

async fn hw_init_rushmore_v3<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    if profile.caps.dualpoint {
        setup_trackstick_v3(io, profile, REG_BASE_RUSHMORE)
            .await
            .context("trackstick setup failed")?;
    }

    let result = async {
        enter_command_mode(io).await?;
        read_reg(io, profile, 0xc2d9).await?;
        write_reg(io, profile, 0xc2cb, 0x00).await?;

        let reg_val = read_reg(io, profile, 0xc2c6).await?;
        write_reg_value(io, profile, reg_val & 0xfd).await?;

        write_reg(io, profile, 0xc2c9, 0x64).await?;

        /* enter absolute mode */
        let reg_val = read_reg(io, profile, 0xc2c4).await?;
        write_reg_value(io, profile, reg_val | 0x02).await
    }
    .await;

    let exit = exit_command_mode(io).await;
    result.and(exit)?;

    command(io, cmd::ENABLE).await
}

/* Must already be in command mode. */
async fn absolute_mode_v4<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    let reg_val = read_reg(io, profile, 0x0004).await?;
    write_reg_value(io, profile, reg_val | 0x02).await
}

async fn hw_init_v4<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    let result = async {
        enter_command_mode(io).await?;

        absolute_mode_v4(io, profile)
            .await
            .context("failed to enter absolute mode")?;

        write_reg(io, profile, 0x0007, 0x8c).await?;
        write_reg(io, profile, 0x0149, 0x03).await?;
        write_reg(io, profile, 0x0160, 0x03).await?;
        write_reg(io, profile, 0x017f, 0x15).await?;
        write_reg(io, profile, 0x0151, 0x01).await?;
        write_reg(io, profile, 0x0168, 0x03).await?;
        write_reg(io, profile, 0x014a, 0x03).await?;
        write_reg(io, profile, 0x0161, 0x03).await
    }
    .await;

    let exit = exit_command_mode(io).await;
    result.and(exit)?;

    /* switch the output from a 9-byte to an 8-byte format */
    command_arg(io, cmd::SET_SAMPLE_RATE, 0xc8).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x64).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x50).await?;
    command(io, cmd::GET_ID).await?;

    /* set rate and enable data reporting */
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x64).await?;
    command(io, cmd::ENABLE).await
}

/* OTP information reads used to pick SS4 defaults. */
async fn get_otp_values_ss4<P: Ps2Port + ?Sized>(io: &mut P, index: u8) -> Result<[u8; 3]> {
    let mode_cmd = match index {
        0 => cmd::SET_STREAM_MODE,
        _ => cmd::SET_POLL,
    };

    let bytes = io
        .submit(&[
            Step::Command(mode_cmd),
            Step::Command(mode_cmd),
            Step::Command(cmd::GET_INFO),
            Step::Read,
            Step::Read,
            Step::Read,
        ])
        .await
        .context("OTP read failed")?;
    if bytes.len() != 3 {
        bail!("OTP read returned {} bytes", bytes.len());
    }
    Ok([bytes[0], bytes[1], bytes[2]])
}

pub async fn set_defaults_ss4<P: Ps2Port + ?Sized>(io: &mut P) -> Result<()> {
    get_otp_values_ss4(io, 0).await?;
    get_otp_values_ss4(io, 1).await?;
    Ok(())
}

/* Query the Dolphin electrode counts and derive the coordinate space. */
pub async fn dolphin_get_device_area<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &mut Profile,
) -> Result<()> {
    const COUNT_PER_ELECTRODE: i32 = 64;
    const PROFILE_XOFFSET: i32 = 8;
    const PROFILE_YOFFSET: i32 = 1;

    enter_command_mode(io).await?;

    let result = async {
        command(io, cmd::RESET_WRAP).await?;
        command(io, cmd::SET_POLL).await?;
        command(io, cmd::SET_POLL).await?;
        command_arg(io, cmd::SET_SAMPLE_RATE, 0x0a).await?;
        command_arg(io, cmd::SET_SAMPLE_RATE, 0x0a).await?;

        let bytes = io
            .submit(&[Step::Command(cmd::GET_INFO), Step::Read, Step::Read, Step::Read])
            .await
            .context("device area read failed")?;
        if bytes.len() != 3 {
            bail!("device area read returned {} bytes", bytes.len());
        }

        let num_x_electrode = PROFILE_XOFFSET + i32::from(bytes[2] & 0x0f);
        let num_y_electrode = PROFILE_YOFFSET + i32::from((bytes[2] >> 4) & 0x0f);
        profile.x_bits = num_x_electrode;
        profile.y_bits = num_y_electrode;
        profile.x_max = (num_x_electrode - 1) * COUNT_PER_ELECTRODE;
        profile.y_max = (num_y_electrode - 1) * COUNT_PER_ELECTRODE;
        Ok(())
    }
    .await;

    let exit = exit_command_mode(io).await;
    result.and(exit)
}

async fn hw_init_dolphin<P: Ps2Port + ?Sized>(io: &mut P) -> Result<()> {
    command(io, cmd::SET_STREAM_MODE).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x64).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x28).await?;
    command(io, cmd::ENABLE).await
}

/* Read the pitch/electrode registers and derive units-per-mm. Must be
 * in command mode. */
pub async fn get_v3_v7_resolution<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &mut Profile,
    reg_pitch: u16,
) -> Result<()> {
    let reg = read_reg(io, profile, reg_pitch).await?;

    /* lower/upper nibbles are signed offsets, in 0.1 mm units */
    let x_pitch = 50 + 2 * i32::from((reg << 4) as i8 >> 4);
    let y_pitch = 36 + 2 * i32::from(reg as i8 >> 4);

    let reg = read_reg(io, profile, reg_pitch + 1).await?;

    let x_electrode = 17 + i32::from((reg << 4) as i8 >> 4);
    let y_electrode = 13 + i32::from(reg as i8 >> 4);

    let x_phys = x_pitch * (x_electrode - 1);
    let y_phys = y_pitch * (y_electrode - 1);
    if x_phys <= 0 || y_phys <= 0 {
        bail!("nonsensical pitch registers: {x_phys}x{y_phys}");
    }

    profile.x_res = (profile.x_max * 10 / x_phys) as u32;
    profile.y_res = (profile.y_max * 10 / y_phys) as u32;

    debug!(
        "pitch {x_pitch}x{y_pitch} electrodes {x_electrode}x{y_electrode} res {}x{} units/mm",
        profile.x_res, profile.y_res
    );
    Ok(())
}

async fn hw_init_v7<P: Ps2Port + ?Sized>(io: &mut P, profile: &mut Profile) -> Result<()> {
    let result = async {
        enter_command_mode(io).await?;

        read_reg(io, profile, 0xc2d9).await?;
        get_v3_v7_resolution(io, profile, 0xc397).await?;
        write_reg(io, profile, 0xc2c9, 0x64).await?;

        let reg_val = read_reg(io, profile, 0xc2c4).await?;
        write_reg_value(io, profile, reg_val | 0x02).await
    }
    .await;

    let exit = exit_command_mode(io).await;
    result.and(exit)?;

    command_arg(io, cmd::SET_SAMPLE_RATE, 0x28).await?;
    command(io, cmd::ENABLE).await
}

async fn hw_init_ss4<P: Ps2Port + ?Sized>(io: &mut P, profile: &Profile) -> Result<()> {
    /* enter absolute mode */
    command(io, cmd::SET_STREAM_MODE).await?;
    command(io, cmd::SET_STREAM_MODE).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x64).await?;
    command_arg(io, cmd::SET_SAMPLE_RATE, 0x28).await?;

    /* lower the noise packet count */
    exit_command_mode(io).await?;
    enter_command_mode(io).await?;
    let result = write_reg(io, profile, 0x001d, 0x20).await;
    let exit = exit_command_mode(io).await;
    result.and(exit)?;

    command(io, cmd::ENABLE).await
}

/* Run the bring-up sequence for the bound protocol. On failure the
 * device is reset and left disabled; the sequence is never retried. */
pub async fn initialize<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &mut Profile,
) -> Result<(), DriverError> {
    info!("bringing up {} touchpad", profile.version);

    let result = match profile.version {
        ProtocolVersion::V1 | ProtocolVersion::V2 => hw_init_v1_v2(io, profile).await,
        ProtocolVersion::V3 => hw_init_v3(io, profile).await,
        ProtocolVersion::V3Rushmore => hw_init_rushmore_v3(io, profile).await,
        ProtocolVersion::V4 => hw_init_v4(io, profile).await,
        ProtocolVersion::V5 => hw_init_dolphin(io).await,
        ProtocolVersion::V6 => hw_init_v6(io, profile).await,
        ProtocolVersion::V7 => hw_init_v7(io, profile).await,
        ProtocolVersion::V8 => hw_init_ss4(io, profile).await,
    };

    if let Err(err) = result {
        warn!("hardware initialization failed, touchpad left disabled: {err:#}");
        if let Err(reset_err) = reset(io).await {
            warn!("post-failure reset also failed: {reset_err:#}");
        }
        return Err(DriverError::HardwareInit(format!("{err:#}")));
    }

    Ok(())
}
