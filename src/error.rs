use thiserror::Error;

/* Driver-level error taxonomy.
 *
 * Only `Identification` and `HardwareInit` ever reach the session
 * boundary. Frame-sync and bitmap problems are absorbed where they
 * occur (framer drop counter, single-touch fallback) and exist here
 * so diagnostics can name them. */
#[derive(Debug, Error)]
pub enum DriverError {
    /* The device did not answer the E6/E7/EC probes like an ALPS pad.
     * Non-fatal to the host: this hardware simply isn't claimed. */
    #[error("not an ALPS touchpad: {0}")]
    Identification(String),

    /* A bring-up command sequence failed. The device is left reset and
     * disabled; the sequence is not retried. */
    #[error("hardware initialization failed: {0}")]
    HardwareInit(String),

    /* A byte run failed validation and one packet slot was discarded. */
    #[error("frame sync lost at byte {index}: {reason}")]
    FrameSync { index: usize, reason: &'static str },

    /* A bitmap packet carried an empty occupancy map on one axis. */
    #[error("empty occupancy bitmap")]
    BitmapUnderflow,
}
