//! Line-oriented logging with timestamps, source locations, and ANSI colour.
//!
//! Provides the [`tlog!`] macro for consistent log output in the format:
//!
//! ```text
//! 2026-08-25 14:02:07.113 - src/server/handlers/friends.rs:31 - friends: request 12 sent
//! ```
//!
//! When stderr is a terminal, output is colour-coded: timestamps and source
//! locations are dimmed, and user IDs get a consistent colour derived from
//! their content so the same user is easy to spot across lines.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize the logging system. Call once at startup before any logging.
/// Detects whether stderr supports ANSI colours; `NO_COLOR` disables them.
pub fn init() {
    let want_colour =
        std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    COLOUR_ENABLED.store(want_colour, Ordering::Relaxed);
}

/// Returns whether ANSI colour output is enabled.
pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

// ANSI escape codes
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

/// Colour palette for ID hashing.
const ID_COLOURS: &[&str] = &[
    "\x1b[91m", // bright red
    "\x1b[92m", // bright green
    "\x1b[93m", // bright yellow
    "\x1b[94m", // bright blue
    "\x1b[95m", // bright magenta
    "\x1b[96m", // bright cyan
    "\x1b[31m", // red
    "\x1b[32m", // green
    "\x1b[33m", // yellow
    "\x1b[34m", // blue
    "\x1b[35m", // magenta
    "\x1b[36m", // cyan
];

/// Pick a deterministic colour for the given string.
fn hash_colour(id: &str) -> &'static str {
    let hash: u32 = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    ID_COLOURS[(hash as usize) % ID_COLOURS.len()]
}

const LOG_ID_TRUNCATE_LEN: usize = 8;

fn truncate_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(LOG_ID_TRUNCATE_LEN)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

/// Format a user ID with consistent colour and truncation.
///
/// User IDs are UUIDs, far too long for a log line; the first eight
/// characters are plenty to tell accounts apart in a session.
/// Returns e.g. `u-7f3c91aa` (plain) or `\x1b[96mu-7f3c91aa\x1b[0m` (colour).
pub fn user_id(id: &str) -> String {
    let short = truncate_id(id);
    if colour_enabled() {
        let colour = hash_colour(id);
        format!("{colour}u-{short}{RESET}")
    } else {
        format!("u-{short}")
    }
}

const REQ_ID_COLOUR: &str = "\x1b[93m"; // bright yellow

/// Format a friend-request row ID for log output.
pub fn request_id(id: i64) -> String {
    if colour_enabled() {
        format!("{REQ_ID_COLOUR}r-{id}{RESET}")
    } else {
        format!("r-{id}")
    }
}

/// Format the current wall-clock time as `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn format_timestamp() -> String {
    let now = SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    // Civil date from days since epoch (Howard Hinnant's algorithm).
    let days = (secs / 86400) as i64;
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        y, m, d, hours, minutes, seconds, millis
    )
}

/// Write a single log line to stderr.
///
/// Called by the [`tlog!`] macro; not intended for direct use.
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    if colour_enabled() {
        eprintln!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}");
    } else {
        eprintln!("{ts} - {file}:{line} - {msg}");
    }
}

/// Emit a log line to stderr with timestamp and source location.
///
/// # Usage
///
/// ```ignore
/// tlog!("friends: request {} sent", logging::request_id(id));
/// tlog!("auth: session issued for {}", logging::user_id(&uid));
/// ```
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
