use chrono::{DateTime, Utc};

pub const ARCHIVE_EXTENSION: &str = "warc";

const MAX_LABEL_BYTES: usize = 80;

/// Deterministic, filesystem-safe session name: `{locality}_{YYYYMMDD}_{HHMMSS}`.
///
/// Two sessions only collide if they start within the same second.
pub fn session_basename(locality: &str, started: &DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        sanitize_label(locality),
        started.format("%Y%m%d_%H%M%S")
    )
}

/// `{session_basename}.warc`
pub fn archive_filename(locality: &str, started: &DateTime<Utc>) -> String {
    format!("{}.{ARCHIVE_EXTENSION}", session_basename(locality, started))
}

/// Maps a free-form label (a locality name) onto something every common
/// filesystem accepts. Never returns an empty string.
pub fn sanitize_label(input: &str) -> String {
    let mut collapsed = String::with_capacity(input.len());
    for c in input.chars() {
        let c = if is_forbidden(c) || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    let mut label = collapsed.trim_matches(&['_', '.'][..]).to_string();
    if label.is_empty() {
        label.push_str("unnamed");
    }
    if label.len() > MAX_LABEL_BYTES {
        let end = (0..=MAX_LABEL_BYTES)
            .rev()
            .find(|&idx| label.is_char_boundary(idx))
            .unwrap_or(0);
        label.truncate(end);
    }
    if is_reserved_device_name(&label) {
        label.push('_');
    }
    label
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// DOS device names that Windows refuses as file names.
fn is_reserved_device_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            let bytes = upper.as_bytes();
            bytes.len() == 4
                && (upper.starts_with("COM") || upper.starts_with("LPT"))
                && (b'1'..=b'9').contains(&bytes[3])
        }
    }
}
