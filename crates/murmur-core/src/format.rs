//! Presentation helpers
//!
//! Pure formatting utilities for frontends: no rendering, no locale state.

use crate::{PeerId, Timestamp};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Human-friendly age of a timestamp relative to `now`
///
/// Anything older than a day renders as a UTC clock time.
pub fn relative_time(ts: Timestamp, now: Timestamp) -> String {
    let diff = (now.as_millis() - ts.as_millis()).max(0);

    if diff < MINUTE_MS {
        "just now".to_string()
    } else if diff < HOUR_MS {
        format!("{}m ago", diff / MINUTE_MS)
    } else if diff < DAY_MS {
        format!("{}h ago", diff / HOUR_MS)
    } else {
        let day_secs = (ts.as_millis().max(0) / 1000) % 86_400;
        format!("{:02}:{:02}", day_secs / 3600, (day_secs % 3600) / 60)
    }
}

/// Up to two uppercase initials from a display name
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Avatar color palette, bucketed by peer ID
const AVATAR_COLORS: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FD9", "#85C1E2",
];

/// Stable avatar color for a peer
pub fn avatar_color(peer: PeerId) -> &'static str {
    let bucket: u64 = peer.0.to_le_bytes().iter().map(|b| *b as u64).sum();
    AVATAR_COLORS[(bucket % AVATAR_COLORS.len() as u64) as usize]
}
