//! Idempotent `KEY=VALUE` rewriting for `config.txt`-style files.
//!
//! A patch runs in two passes over the lines of the file:
//!
//! 1. every active `KEY=...` line (leading whitespace tolerated) is reverted to
//!    the bare disabled form `#KEY=`;
//! 2. when a value is given, the first `#KEY=...` line becomes `KEY=value`.
//!
//! Keys that have no line at all are never appended. Raspberry Pi OS ships the
//! keys we touch as commented-out placeholders, and the first pass keeps one in
//! place for later runs.

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// `KEY=value` is now in effect.
    Set,
    /// Active statements were commented out.
    Disabled,
    /// Nothing matched the key; content is unchanged.
    Untouched,
}

pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::msg(format!(
            "config key '{key}' is invalid (allowed: a-zA-Z0-9_)"
        )));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::msg(format!("empty value for config key '{key}'")));
    }
    if value.contains(['\n', '\r']) {
        return Err(Error::msg(format!(
            "value for config key '{key}' must be a single line"
        )));
    }
    Ok(())
}

fn split_line(seg: &str) -> (&str, &str) {
    if let Some(body) = seg.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = seg.strip_suffix('\n') {
        (body, "\n")
    } else {
        (seg, "")
    }
}

/// Pure form of [`set_config_value`]: rewrites `content` and reports what happened.
pub fn patch_config_text(
    content: &str,
    key: &str,
    value: Option<&str>,
) -> Result<(String, PatchOutcome)> {
    validate_key(key)?;
    if let Some(v) = value {
        validate_value(key, v)?;
    }

    let escaped = regex::escape(key);
    let active = Regex::new(&format!(r"^\s*{escaped}=.*$"))
        .map_err(|e| Error::msg(format!("bad pattern for key '{key}': {e}")))?;
    let disabled = Regex::new(&format!(r"^\s*#{escaped}=.*$"))
        .map_err(|e| Error::msg(format!("bad pattern for key '{key}': {e}")))?;

    let mut lines: Vec<(String, &str)> = content
        .split_inclusive('\n')
        .map(|seg| {
            let (body, eol) = split_line(seg);
            (body.to_string(), eol)
        })
        .collect();

    let mut reverted = 0usize;
    for (body, _) in lines.iter_mut() {
        if active.is_match(body) {
            *body = format!("#{key}=");
            reverted += 1;
        }
    }

    let outcome = match value {
        Some(v) => match lines.iter_mut().find(|(body, _)| disabled.is_match(body)) {
            Some((body, _)) => {
                *body = format!("{key}={v}");
                PatchOutcome::Set
            }
            None => PatchOutcome::Untouched,
        },
        None if reverted > 0 => PatchOutcome::Disabled,
        None => PatchOutcome::Untouched,
    };

    let mut out = String::with_capacity(content.len() + key.len() + 8);
    for (body, eol) in &lines {
        out.push_str(body);
        out.push_str(eol);
    }
    Ok((out, outcome))
}

/// Sets `key` to `value` in the file at `path`, or comments it out when `value` is `None`.
///
/// The file must already exist and be writable. It is rewritten exactly once,
/// through a temp file in the same directory.
pub fn set_config_value(path: &Path, key: &str, value: Option<&str>) -> Result<PatchOutcome> {
    util::require_writable_file(path)?;
    let original = util::read_text(path)?;
    let (patched, outcome) = patch_config_text(&original, key, value)?;
    util::write_atomic(path, patched.as_bytes())?;
    let changed = patched != original;
    debug!(path = %path.display(), key, ?outcome, changed, "patched config key");
    Ok(outcome)
}

/// Current value of the active `key=` line, if any. Last active line wins.
pub fn active_value(content: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}=");
    content
        .lines()
        .filter_map(|l| l.trim_start().strip_prefix(&prefix))
        .last()
        .map(|v| v.trim_end_matches('\r').to_string())
}
