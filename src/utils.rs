//! Shared helpers
//!
//! Human-readable rendering of the quantities the miner logs: dataset
//! sizes, hash rates, and context uptime.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, 0 if the clock is before it
pub fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Render a byte count with a binary-unit suffix.
///
/// Dataset sizes are powers of two, so the binary units keep the common
/// cases exact ("1.00 GiB" at epoch 0).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let exponent = ((63 - bytes.leading_zeros() as u64) / 10).min(UNITS.len() as u64 - 1);
    let scaled = bytes as f64 / (1u64 << (10 * exponent)) as f64;
    format!("{:.2} {}", scaled, UNITS[exponent as usize])
}

/// Render a hash rate with a decimal-unit suffix
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const STEPS: [(f64, &str); 5] = [
        (1e15, "PH/s"),
        (1e12, "TH/s"),
        (1e9, "GH/s"),
        (1e6, "MH/s"),
        (1e3, "KH/s"),
    ];

    for (scale, unit) in STEPS {
        if hashes_per_sec >= scale {
            return format!("{:.2} {}", hashes_per_sec / scale, unit);
        }
    }
    format!("{:.2} H/s", hashes_per_sec)
}

/// Render a duration in the two most significant units
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
