/// Utility functions and helpers
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Credential presented on proxy admin calls.
///
/// Hex of the first 16 bytes of SHA-256 over `Codis-XAuth-[seg]...`, the
/// format proxies expect in their admin URLs.
pub fn xauth(segments: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"Codis-XAuth");
    for seg in segments {
        hasher.update(format!("-[{}]", seg).as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Format duration for human-readable output
pub fn format_duration(duration: std::time::Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
