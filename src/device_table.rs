/* Static hardware signature table.
 *
 * Many (but not all) ALPS touchpads can be identified by the values
 * returned in the "E7 report" and/or the "EC report". Each entry maps
 * an exact E7 signature (and, when non-zero, the final EC byte, which
 * distinguishes firmware minor versions) to a protocol version plus the
 * first-byte validation pair and baseline capability flags. */

use crate::device::{DeviceCaps, ProtocolVersion};

#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    /* E7 response to match */
    pub signature: [u8; 3],
    /* final byte of the EC response; 0 means "don't care" */
    pub command_mode_resp: u8,
    pub version: ProtocolVersion,
    pub byte0: u8,
    pub mask0: u8,
    pub caps: DeviceCaps,
}

const fn model(
    signature: [u8; 3],
    command_mode_resp: u8,
    version: ProtocolVersion,
    byte0: u8,
    mask0: u8,
    caps: DeviceCaps,
) -> ModelInfo {
    ModelInfo {
        signature,
        command_mode_resp,
        version,
        byte0,
        mask0,
        caps,
    }
}

const fn pass_dualpoint() -> DeviceCaps {
    let mut caps = DeviceCaps::none();
    caps.passthrough = true;
    caps.dualpoint = true;
    caps
}

const fn pass_dualpoint_interleaved() -> DeviceCaps {
    let mut caps = pass_dualpoint();
    caps.ps2_interleaved = true;
    caps
}

const fn with_wheel() -> DeviceCaps {
    let mut caps = DeviceCaps::none();
    caps.wheel = true;
    caps
}

const fn with_fw_bk_1() -> DeviceCaps {
    let mut caps = DeviceCaps::none();
    caps.fw_bk_1 = true;
    caps
}

const fn with_fw_bk_2() -> DeviceCaps {
    let mut caps = DeviceCaps::none();
    caps.fw_bk_2 = true;
    caps
}

const fn with_four_buttons() -> DeviceCaps {
    let mut caps = DeviceCaps::none();
    caps.four_buttons = true;
    caps
}

pub const MODEL_TABLE: &[ModelInfo] = &[
    /* Toshiba Satellite Pro M10 */
    model([0x32, 0x02, 0x14], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, pass_dualpoint()),
    /* UMAX-530T */
    model([0x33, 0x02, 0x0a], 0x00, ProtocolVersion::V1, 0x88, 0xf8, DeviceCaps::none()),
    model([0x53, 0x02, 0x0a], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    model([0x53, 0x02, 0x14], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    /* HP ze1115 */
    model([0x60, 0x03, 0xc8], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    model([0x63, 0x02, 0x0a], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    model([0x63, 0x02, 0x14], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    /* Fujitsu Siemens S6010 */
    model([0x63, 0x02, 0x28], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, with_fw_bk_2()),
    /* Toshiba Satellite S2400-103 */
    model([0x63, 0x02, 0x3c], 0x00, ProtocolVersion::V2, 0x8f, 0x8f, with_wheel()),
    /* NEC Versa L320 */
    model([0x63, 0x02, 0x50], 0x00, ProtocolVersion::V2, 0xef, 0xef, with_fw_bk_1()),
    model([0x63, 0x02, 0x64], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    /* Dell Latitude D800 */
    model([0x63, 0x03, 0xc8], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, pass_dualpoint()),
    /* ThinkPad R61 8918-5QG */
    model([0x73, 0x00, 0x0a], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::dualpoint()),
    model([0x73, 0x02, 0x0a], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, DeviceCaps::none()),
    /* Ahtec Laptop */
    model([0x73, 0x02, 0x14], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, with_fw_bk_2()),
    model([0x20, 0x02, 0x0e], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, pass_dualpoint()),
    model([0x22, 0x02, 0x0a], 0x00, ProtocolVersion::V2, 0xf8, 0xf8, pass_dualpoint()),
    /* Dell Latitude D600 */
    model([0x22, 0x02, 0x14], 0x00, ProtocolVersion::V2, 0xff, 0xff, pass_dualpoint()),
    /* Dell Latitude E5500, E6400, E6500, Precision M4400 */
    model([0x62, 0x02, 0x14], 0x00, ProtocolVersion::V2, 0xcf, 0xcf, pass_dualpoint_interleaved()),
    /* Dell Vostro 1400 */
    model([0x73, 0x02, 0x50], 0x00, ProtocolVersion::V2, 0xcf, 0xcf, with_four_buttons()),
    /* Toshiba Tecra A11-11L */
    model([0x52, 0x01, 0x14], 0x00, ProtocolVersion::V2, 0xff, 0xff, pass_dualpoint_interleaved()),
];

/* Find a table entry for an E7/EC report pair. */
pub fn lookup(e7: &[u8; 3], ec: &[u8; 3]) -> Option<&'static ModelInfo> {
    MODEL_TABLE.iter().find(|model| {
        model.signature == *e7
            && (model.command_mode_resp == 0 || model.command_mode_resp == ec[2])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_exact_signature() {
        let info = lookup(&[0x33, 0x02, 0x0a], &[0x00, 0x00, 0x00]).expect("UMAX-530T");
        assert_eq!(info.version, ProtocolVersion::V1);
        assert_eq!(info.byte0, 0x88);
        assert_eq!(info.mask0, 0xf8);
    }

    #[test]
    fn lookup_ignores_ec_when_dont_care() {
        /* command_mode_resp == 0 matches any EC tail */
        assert!(lookup(&[0x53, 0x02, 0x0a], &[0x88, 0x07, 0x9d]).is_some());
    }

    #[test]
    fn lookup_unknown_signature() {
        assert!(lookup(&[0x73, 0x03, 0x50], &[0x73, 0x01, 0x00]).is_none());
    }

    #[test]
    fn interleaved_models_flagged() {
        let info = lookup(&[0x62, 0x02, 0x14], &[0, 0, 0]).unwrap();
        assert!(info.caps.ps2_interleaved);
        assert!(info.caps.passthrough);
        assert!(info.caps.dualpoint);
    }
}
