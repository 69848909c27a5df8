// src/sanitize.rs
//! Pager-bound message formatting.
//!
//! The pager channel only renders plain text, so pictographs, emoji, flags
//! and the joiners/selectors that glue emoji sequences together are removed.
//! Every other code point (including non-Latin scripts) passes through.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::notice::Notice;

/// Sent instead of the formatted notice if formatting fails.
pub const FALLBACK_MESSAGE: &str = "NOTAM received (message could not be formatted)";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M %Z";

fn unsupported_re() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| {
        Regex::new(concat!(
            "[",
            r"\x{1F000}-\x{1FAFF}", // mahjong..symbols & pictographs ext-A, incl. regional indicators
            r"\x{2600}-\x{27BF}",   // misc symbols, dingbats
            r"\x{2300}-\x{23FF}",   // misc technical (watch, hourglass, ...)
            r"\x{2B00}-\x{2BFF}",   // arrows/stars used as emoji
            r"\x{1F1E6}-\x{1F1FF}", // flags
            r"\x{E0020}-\x{E007F}", // tag sequences
            r"\x{FE00}-\x{FE0F}",   // variation selectors
            r"\x{200D}",            // zero-width joiner
            r"\x{20E3}",            // combining keycap
            "]",
        ))
    })
    .context("compiling unsupported-char pattern")
}

fn blank_lines_re() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| Regex::new(r"\n{3,}"))
        .context("compiling blank-line pattern")
}

/// Remove code points the pager transport cannot carry.
pub fn strip_unsupported(s: &str) -> Result<String> {
    Ok(unsupported_re()?.replace_all(s, "").into_owned())
}

/// Format `notice` for the pager, stamped with the current local time.
pub fn clean(notice: &Notice, location_code: &str) -> String {
    clean_at(notice, location_code, Local::now())
}

/// Like [`clean`] with an explicit receive time. Never fails: on any
/// internal error [`FALLBACK_MESSAGE`] is returned.
pub fn clean_at(notice: &Notice, location_code: &str, received: DateTime<Local>) -> String {
    or_fallback(notice, try_clean(notice, location_code, received))
}

fn or_fallback(notice: &Notice, formatted: Result<String>) -> String {
    match formatted {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(id = %notice.id, error = format!("{e:#}"), "sanitize failed, using fallback");
            FALLBACK_MESSAGE.to_string()
        }
    }
}

fn try_clean(notice: &Notice, location_code: &str, received: DateTime<Local>) -> Result<String> {
    let mut out = String::with_capacity(notice.text.len() + 64);
    out.push_str(location_code.trim());
    out.push_str(" NOTAM\n");
    if let Some(num) = notice.number.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        out.push('#');
        out.push_str(num);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&notice.text.replace("\r\n", "\n"));
    out.push_str("\n\nReceived: ");
    out.push_str(&received.format(TIMESTAMP_FORMAT).to_string());

    let stripped = strip_unsupported(&out)?;
    let collapsed = blank_lines_re()?.replace_all(&stripped, "\n\n");
    Ok(collapsed.trim().to_string())
}
