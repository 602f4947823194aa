/* Device identification.
 *
 * Three fixed probes (E6 resolution, E7 scaling, EC reset-wrap) yield
 * three status reports. The E6 report gates the whole family; the
 * E7/EC pair either hits the static signature table or one of the
 * hand-ordered heuristic patterns for the newer generations. */

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::bringup::{
    self, REG_BASE_PINNACLE, REG_BASE_RUSHMORE, REG_BASE_V7, exit_command_mode, rpt_cmd,
};
use crate::device::{DeviceCaps, NibbleSet, Profile, ProtocolVersion};
use crate::device_table;
use crate::error::DriverError;
use crate::transport::{Ps2Port, cmd};

/* Outcome of the probe sequence: enough to bind a protocol profile. */
#[derive(Debug, Clone)]
pub struct Identity {
    pub version: ProtocolVersion,
    pub e7: [u8; 3],
    pub ec: [u8; 3],
    /* table hit, when the E7/EC pair matched a known model */
    pub model: Option<&'static device_table::ModelInfo>,
}

/* Issue the identification probes and classify the device. A device
 * that fails here simply isn't claimed by this driver. */
pub async fn identify<P: Ps2Port + ?Sized>(io: &mut P) -> Result<Identity, DriverError> {
    probe(io).await.map_err(|e| {
        warn!("identification failed: {e:#}");
        DriverError::Identification(format!("{e:#}"))
    })
}

async fn probe<P: Ps2Port + ?Sized>(io: &mut P) -> Result<Identity> {
    /* E6 report: 0,0,10 or 0,0,100 with no buttons pressed; bits 0-2
     * of the first byte reflect held buttons. */
    let e6 = rpt_cmd(io, Some(0x00), cmd::SET_SCALING_1TO1)
        .await
        .context("error getting E6 report")?;

    if (e6[0] & 0xf8) != 0 || e6[1] != 0 || (e6[2] != 10 && e6[2] != 100) {
        anyhow::bail!("invalid E6 report {e6:02x?}");
    }

    /* The E7 and EC reports uniquely identify most ALPS touchpads. */
    let e7 = rpt_cmd(io, Some(0x00), cmd::SET_SCALING_2TO1)
        .await
        .context("error getting E7 report")?;
    let ec = rpt_cmd(io, Some(0x00), cmd::RESET_WRAP)
        .await
        .context("error getting EC report")?;
    exit_command_mode(io).await?;

    if let Some(model) = device_table::lookup(&e7, &ec) {
        info!("found an ALPS {} touchpad (table match)", model.version);
        return Ok(Identity {
            version: model.version,
            e7,
            ec,
            model: Some(model),
        });
    }

    /* Heuristic fallbacks, in fixed priority order. */
    let version = if e7 == [0x73, 0x03, 0x50] && ec[0] == 0x73 && (ec[1] == 0x01 || ec[1] == 0x02) {
        ProtocolVersion::V5
    } else if ec[0] == 0x88 && ((ec[1] & 0xf0) == 0xb0 || (ec[1] & 0xf0) == 0xc0) {
        ProtocolVersion::V7
    } else if ec[0] == 0x88 && ec[1] == 0x08 {
        ProtocolVersion::V3Rushmore
    } else if ec[0] == 0x88 && ec[1] == 0x07 && (0x90..=0x9d).contains(&ec[2]) {
        ProtocolVersion::V3
    } else if e7 == [0x73, 0x03, 0x14] && ec[1] == 0x02 {
        ProtocolVersion::V8
    } else if e7 == [0x73, 0x03, 0x28] && ec[1] == 0x01 {
        /* Flare */
        ProtocolVersion::V8
    } else {
        anyhow::bail!("unrecognized device: E7={e7:02x?} EC={ec:02x?}");
    };

    info!("found an ALPS {version} touchpad: E7={e7:02x?} EC={ec:02x?}");
    Ok(Identity {
        version,
        e7,
        ec,
        model: None,
    })
}

/* Bind the protocol profile for an identified device. Runs the
 * version-specific capability probes (trackstick presence, Dolphin
 * device area, SS4 OTP defaults), so the port must still be held
 * exclusively. Idempotent: re-running after a device restart binds the
 * same profile again. */
pub async fn bind_profile<P: Ps2Port + ?Sized>(
    io: &mut P,
    identity: &Identity,
) -> Result<Profile> {
    debug!(
        "binding {} profile for E7={:02x?} EC={:02x?}",
        identity.version, identity.e7, identity.ec
    );

    let mut profile = Profile {
        version: identity.version,
        byte0: 0x8f,
        mask0: 0x8f,
        fw_ver: identity.ec,
        caps: DeviceCaps::dualpoint(),
        x_max: 2000,
        y_max: 1400,
        x_bits: 15,
        y_bits: 11,
        x_res: 0,
        y_res: 0,
        nibble_set: NibbleSet::V3,
        addr_command: cmd::RESET_WRAP,
    };

    match identity.version {
        ProtocolVersion::V1 | ProtocolVersion::V2 => {
            profile.x_max = 1023;
            profile.y_max = 767;
        }
        ProtocolVersion::V3 => {
            if !trackstick_present(io, &profile, REG_BASE_PINNACLE).await {
                profile.caps.dualpoint = false;
            } else {
                info!("trackstick detected");
            }
        }
        ProtocolVersion::V3Rushmore => {
            profile.x_bits = 16;
            profile.y_bits = 12;

            if !trackstick_present(io, &profile, REG_BASE_RUSHMORE).await {
                profile.caps.dualpoint = false;
            } else {
                info!("trackstick detected");
            }
        }
        ProtocolVersion::V4 => {
            profile.nibble_set = NibbleSet::V4;
            profile.addr_command = cmd::SET_DEFAULTS_AND_DISABLE;
        }
        ProtocolVersion::V5 => {
            profile.byte0 = 0xc8;
            profile.mask0 = 0xc8;
            profile.caps = DeviceCaps::none();
            profile.x_bits = 23;
            profile.y_bits = 12;

            bringup::dolphin_get_device_area(io, &mut profile)
                .await
                .context("dolphin device area query failed")?;
        }
        ProtocolVersion::V6 => {
            profile.nibble_set = NibbleSet::V6;
            profile.byte0 = 0xc8;
            profile.mask0 = 0xc8;
            profile.caps = DeviceCaps::none();
            profile.x_max = 2047;
            profile.y_max = 1535;
        }
        ProtocolVersion::V7 => {
            profile.byte0 = 0x48;
            profile.mask0 = 0x48;
            profile.x_max = 0xfff;
            profile.y_max = 0x7ff;

            /* only the 0xba firmware line has physical buttons */
            if identity.ec[1] != 0xba {
                profile.caps.buttonpad = true;
                info!("buttonpad detected");
            }

            if !trackstick_present(io, &profile, REG_BASE_V7).await {
                profile.caps.dualpoint = false;
            } else {
                info!("trackstick detected (V7 stick motion stays disabled)");
            }
        }
        ProtocolVersion::V8 => {
            profile.byte0 = 0x18;
            profile.mask0 = 0x18;
            profile.caps = DeviceCaps::none();

            bringup::set_defaults_ss4(io)
                .await
                .context("SS4 OTP read failed")?;

            if identity.ec[1] == 0x01 {
                /* buttons and trackstick */
                profile.x_max = 8160;
                profile.y_max = 4080;
                profile.caps.dualpoint = true;
                profile.caps.dualpoint_with_pressure = true;
                info!("trackstick detected (V8 stick motion stays disabled)");
            } else {
                /* buttonless */
                profile.x_max = 8176;
                profile.y_max = 4088;
                profile.caps.buttonpad = true;
                info!("buttonpad detected");
            }
        }
    }

    /* A table entry overrides the defaults with per-model values. */
    if let Some(model) = identity.model {
        profile.caps = model.caps;
        profile.byte0 = model.byte0;
        profile.mask0 = model.mask0;
    }

    Ok(profile)
}

async fn trackstick_present<P: Ps2Port + ?Sized>(
    io: &mut P,
    profile: &Profile,
    reg_base: u16,
) -> bool {
    match bringup::probe_trackstick_v3_v7(io, profile, reg_base).await {
        Ok(present) => present,
        Err(err) => {
            warn!("trackstick probe failed, assuming absent: {err:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_port::ScriptedPort;

    /* Queue the three probe reports (E6, E7, EC). */
    fn queue_probe(port: &mut ScriptedPort, e7: [u8; 3], ec: [u8; 3]) {
        port.push_replies(&[0x00, 0x00, 0x64]);
        port.push_replies(&e7);
        port.push_replies(&ec);
    }

    #[tokio::test]
    async fn rejects_invalid_e6_report() {
        let mut port = ScriptedPort::new();
        port.push_replies(&[0xf8, 0x00, 0x64]);
        match identify(&mut port).await {
            Err(DriverError::Identification(_)) => {}
            other => panic!("expected identification error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn table_match_wins() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x33, 0x02, 0x0a], [0x00, 0x00, 0x00]);

        let identity = identify(&mut port).await.unwrap();
        assert_eq!(identity.version, ProtocolVersion::V1);
        assert!(identity.model.is_some());
    }

    #[tokio::test]
    async fn dolphin_heuristic() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x50], [0x73, 0x01, 0x00]);
        let identity = identify(&mut port).await.unwrap();
        assert_eq!(identity.version, ProtocolVersion::V5);
    }

    #[tokio::test]
    async fn v7_heuristic() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x0a], [0x88, 0xb5, 0x2b]);
        let identity = identify(&mut port).await.unwrap();
        assert_eq!(identity.version, ProtocolVersion::V7);
    }

    #[tokio::test]
    async fn rushmore_and_pinnacle_heuristics() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x02, 0x64], [0x88, 0x08, 0x00]);
        assert_eq!(
            identify(&mut port).await.unwrap().version,
            ProtocolVersion::V3Rushmore
        );

        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x02, 0x64], [0x88, 0x07, 0x9d]);
        assert_eq!(
            identify(&mut port).await.unwrap().version,
            ProtocolVersion::V3
        );
    }

    #[tokio::test]
    async fn v8_heuristics() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x14], [0x52, 0x02, 0x14]);
        assert_eq!(
            identify(&mut port).await.unwrap().version,
            ProtocolVersion::V8
        );

        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x28], [0x52, 0x01, 0x14]);
        assert_eq!(
            identify(&mut port).await.unwrap().version,
            ProtocolVersion::V8
        );
    }

    #[tokio::test]
    async fn unknown_signature_is_identification_error() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x12, 0x34, 0x56], [0x12, 0x34, 0x56]);
        match identify(&mut port).await {
            Err(DriverError::Identification(_)) => {}
            other => panic!("expected identification error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn v7_profile_binds_buttonpad_and_trackstick() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x0a], [0x88, 0xb5, 0x2b]);
        let identity = identify(&mut port).await.unwrap();

        /* trackstick probe: knock report + register read with the
         * presence bit set */
        port.push_replies(&[0x88, 0xb5, 0x2b]);
        port.push_replies(&[0xc2, 0xc8, 0x80]);

        let profile = bind_profile(&mut port, &identity).await.unwrap();
        assert_eq!(profile.byte0, 0x48);
        assert_eq!(profile.x_max, 0xfff);
        assert!(profile.caps.buttonpad);
        assert!(profile.caps.dualpoint);
        assert_eq!(profile.fw_ver, [0x88, 0xb5, 0x2b]);
    }

    #[tokio::test]
    async fn v7_trackstick_probe_failure_clears_dualpoint() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x0a], [0x88, 0xb5, 0x2b]);
        let identity = identify(&mut port).await.unwrap();

        /* knock report, then presence bit clear */
        port.push_replies(&[0x88, 0xb5, 0x2b]);
        port.push_replies(&[0xc2, 0xc8, 0x00]);

        let profile = bind_profile(&mut port, &identity).await.unwrap();
        assert!(!profile.caps.dualpoint);
    }

    #[tokio::test]
    async fn v8_profile_selects_geometry_from_firmware() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x28], [0x52, 0x01, 0x14]);
        let identity = identify(&mut port).await.unwrap();

        /* two OTP reads */
        port.push_replies(&[0x00, 0x00, 0x00]);
        port.push_replies(&[0x00, 0x00, 0x00]);

        let profile = bind_profile(&mut port, &identity).await.unwrap();
        assert_eq!((profile.x_max, profile.y_max), (8160, 4080));
        assert!(profile.caps.dualpoint);

        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x73, 0x03, 0x14], [0x52, 0x02, 0x14]);
        let identity = identify(&mut port).await.unwrap();
        port.push_replies(&[0x00, 0x00, 0x00]);
        port.push_replies(&[0x00, 0x00, 0x00]);

        let profile = bind_profile(&mut port, &identity).await.unwrap();
        assert_eq!((profile.x_max, profile.y_max), (8176, 4088));
        assert!(profile.caps.buttonpad);
    }

    #[tokio::test]
    async fn table_entry_overrides_mask_and_caps() {
        let mut port = ScriptedPort::new();
        queue_probe(&mut port, [0x62, 0x02, 0x14], [0x00, 0x00, 0x00]);
        let identity = identify(&mut port).await.unwrap();

        let profile = bind_profile(&mut port, &identity).await.unwrap();
        assert_eq!(profile.byte0, 0xcf);
        assert!(profile.caps.ps2_interleaved);
        assert_eq!(profile.x_max, 1023);
    }
}
