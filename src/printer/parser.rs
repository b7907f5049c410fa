//! Response text parsers.
//!
//! Every parser is best effort: a field whose pattern does not match is left
//! out of the result instead of raising an error.

use super::types::ParsedResult;
use tracing::trace;

/// Parse an `M115` response into `key: value` fields.
pub(crate) fn parse_info(text: &str) -> ParsedResult {
    let mut info = ParsedResult::new();

    for line in text.split('\n') {
        if !line.contains(':') || line.contains("CMD") || has_token(line, "ok") {
            continue;
        }
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        info.insert(key.trim(), value.trim());
    }

    info
}

/// Parse an `M105` response: `T0:<current> /<target> B:<current> /<target>`.
pub(crate) fn parse_temperature(text: &str) -> ParsedResult {
    let mut temps = ParsedResult::new();

    let (current, target) = temperature_pair(text, "T0:");
    if let Some(v) = current {
        temps.insert("current_temperature", v);
    }
    if let Some(v) = target {
        temps.insert("target_temperature", v);
    }

    let (current, target) = temperature_pair(text, "B:");
    if let Some(v) = current {
        temps.insert("bed_current_temperature", v);
    }
    if let Some(v) = target {
        temps.insert("bed_target_temperature", v);
    }

    temps
}

/// Parse an `M114` response: `X:<x> Y:<y> Z:<z> ...`.
pub(crate) fn parse_position(text: &str) -> ParsedResult {
    let mut position = ParsedResult::new();

    for (label, key) in [("X:", "x"), ("Y:", "y"), ("Z:", "z")] {
        if let Some(v) = labelled_number(text, label) {
            position.insert(key, v);
        }
    }

    position
}

/// Parse an `M27` response: `<printed>/<total>` byte counters.
pub(crate) fn parse_progress(text: &str) -> ParsedResult {
    let mut progress = ParsedResult::new();

    let Some((current, total)) = byte_counters(text) else {
        trace!("No byte counters in progress response");
        return progress;
    };

    progress.insert("current_byte", current);
    progress.insert("total_bytes", total);
    if let Some(pct) = percentage(current, total) {
        progress.insert("percentage", pct);
    }

    progress
}

/// Parse an `M119` response. The decoded text is always kept under `raw_response`.
pub(crate) fn parse_status(text: &str) -> ParsedResult {
    let mut status = ParsedResult::new();

    for line in text.split('\n') {
        let relevant =
            line.to_lowercase().contains("endstop") || line.contains("TRIGGERED") || line.contains("open");
        if !relevant {
            continue;
        }
        let parts: Vec<&str> = line.trim().split(':').collect();
        if let [key, value] = parts.as_slice() {
            status.insert(key.trim(), value.trim());
        }
    }

    status.insert("raw_response", text);
    status
}

/// `current / total * 100`, rounded to two decimals. `None` for a zero total.
pub(crate) fn percentage(current: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let pct = current as f64 / total as f64 * 100.0;
    Some((pct * 100.0).round() / 100.0)
}

/// Whether `line` contains `token` as a standalone alphanumeric word.
fn has_token(line: &str, token: &str) -> bool {
    line.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == token)
}

/// Text following each occurrence of `label` that starts a word.
fn after_label<'a>(text: &'a str, label: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    text.match_indices(label).filter_map(move |(idx, _)| {
        let at_boundary = text[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        at_boundary.then(|| &text[idx + label.len()..])
    })
}

/// First number that directly follows `label`.
fn labelled_number<'a>(text: &'a str, label: &'a str) -> Option<&'a str> {
    after_label(text, label).find_map(|rest| take_number(rest).map(|(n, _)| n))
}

/// Current and target value of a `label:<current> /<target>` group.
fn temperature_pair<'a>(text: &'a str, label: &'a str) -> (Option<&'a str>, Option<&'a str>) {
    let Some((current, rest)) = after_label(text, label).find_map(take_number) else {
        return (None, None);
    };
    let target = rest
        .trim_start()
        .strip_prefix('/')
        .and_then(|r| take_number(r.trim_start()))
        .map(|(n, _)| n);
    (Some(current), target)
}

/// Split a leading `-?[0-9.]+` number (with at least one digit) off `s`.
fn take_number(s: &str) -> Option<(&str, &str)> {
    let sign = usize::from(s.starts_with('-'));
    let len = s[sign..]
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len() - sign);
    let number = &s[..sign + len];
    if !number[sign..].bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((number, &s[sign + len..]))
}

/// First `<digits>/<digits>` pair in the text.
fn byte_counters(text: &str) -> Option<(u64, u64)> {
    text.match_indices('/').find_map(|(idx, _)| {
        let before = &text[..idx];
        let after = &text[idx + 1..];
        let start = before
            .char_indices()
            .rev()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(0, |(i, c)| i + c.len_utf8());
        let end = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
        let current = before[start..].parse::<u64>().ok()?;
        let total = after[..end].parse::<u64>().ok()?;
        Some((current, total))
    })
}
