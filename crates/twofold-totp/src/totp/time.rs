//! Drift-corrected time source.
//!
//! All code generation reads the clock through a [`TimeSource`], which
//! carries a millisecond offset between the local clock and real time.
//! The offset can be measured once against an SNTP server; if the query
//! fails for any reason the source falls back to the uncorrected local
//! clock and the failure is logged, never surfaced.

use std::net::UdpSocket;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the unix epoch.
const NTP_UNIX_DELTA: u64 = 2_208_988_800;

/// Timeout for a single SNTP round trip.
const SNTP_TIMEOUT: Duration = Duration::from_secs(3);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TimeSource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A clock with an optional correction offset applied on top of the
/// local system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSource {
    /// Milliseconds to add to the local clock (may be negative).
    offset_ms: i64,
}

impl TimeSource {
    /// Uncorrected local system clock.
    pub fn system() -> Self {
        Self { offset_ms: 0 }
    }

    /// A source with a fixed offset, mainly for tests.
    pub fn with_offset_ms(offset_ms: i64) -> Self {
        Self { offset_ms }
    }

    /// Build a source by measuring the local clock against an SNTP
    /// server, e.g. `"pool.ntp.org:123"`. Best effort: on any failure
    /// the offset stays zero.
    pub fn synced(server: &str) -> Self {
        match query_sntp_offset_ms(server) {
            Ok(offset_ms) => {
                log::info!("clock offset vs {}: {}ms", server, offset_ms);
                Self { offset_ms }
            }
            Err(e) => {
                log::warn!("time sync with {} failed, using local clock: {}", server, e);
                Self { offset_ms: 0 }
            }
        }
    }

    /// Measured offset in milliseconds.
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Corrected unix time in whole seconds.
    pub fn now_unix(&self) -> u64 {
        let local_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let corrected = (local_ms + self.offset_ms).max(0);
        (corrected / 1000) as u64
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SNTP query
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single SNTP exchange: returns server-time minus local-time in ms.
fn query_sntp_offset_ms(server: &str) -> std::io::Result<i64> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(SNTP_TIMEOUT))?;
    socket.set_write_timeout(Some(SNTP_TIMEOUT))?;
    socket.connect(server)?;

    // LI=0, VN=3, Mode=3 (client); rest of the packet zeroed.
    let mut packet = [0u8; 48];
    packet[0] = 0x1b;
    socket.send(&packet)?;

    let mut response = [0u8; 48];
    let n = socket.recv(&mut response)?;
    if n < 48 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "short SNTP response",
        ));
    }

    let local_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        .as_millis() as i64;

    // Transmit timestamp: seconds at offset 40, fraction at offset 44.
    let secs = u32::from_be_bytes([response[40], response[41], response[42], response[43]]) as u64;
    let frac = u32::from_be_bytes([response[44], response[45], response[46], response[47]]) as u64;
    if secs < NTP_UNIX_DELTA {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "SNTP timestamp before unix epoch",
        ));
    }
    let server_ms = ((secs - NTP_UNIX_DELTA) * 1000 + (frac * 1000 >> 32)) as i64;

    Ok(server_ms - local_ms)
}
