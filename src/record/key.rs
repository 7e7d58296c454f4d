//! Blob key generation.

use chrono::{DateTime, Utc};

/// Timestamp prefix of a generated key. `%I` is the 12-hour clock hour.
const KEY_TIME_FORMAT: &str = "%Y_%m_%d_%I_%M_%S_%3f";

/// Build the blob key for an upload at `now`.
///
/// Format: `<yyyy_MM_dd_hh_mm_ss_SSS>_<epoch seconds>_<original name>`.
pub fn generate_key(now: DateTime<Utc>, original_name: &str) -> String {
    format!(
        "{}_{}_{}",
        now.format(KEY_TIME_FORMAT),
        now.timestamp(),
        original_name
    )
}

/// Extract a usable filename from a client-supplied name.
///
/// Only the final path component is kept. Returns `None` when nothing usable
/// remains.
pub fn original_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return None;
    }
    Some(name.to_string())
}
