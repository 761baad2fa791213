use std::fmt;

/// Feed timestamps look like `2018-03-13T11:27:29.123Z`.
const RAW_LEN: usize = 24;
const SEPARATORS: [(usize, u8); 7] = [
    (4, b'-'),
    (7, b'-'),
    (10, b'T'),
    (13, b':'),
    (16, b':'),
    (19, b'.'),
    (23, b'Z'),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed timestamp {raw:?}: expected YYYY-MM-DDTHH:MM:SS.fffZ")]
pub struct MalformedTimestamp {
    pub raw: String,
}

/// Second-precision UTC date as written into archive headers
/// (`YYYY-MM-DDTHH:MM:SSZ`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedDate(String);

impl NormalizedDate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates the fixed-width feed timestamp layout and drops fractional
/// seconds. Only the structure is checked, not the calendar.
pub fn normalize(raw: &str) -> Result<NormalizedDate, MalformedTimestamp> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == RAW_LEN
        && bytes.iter().enumerate().all(|(idx, byte)| {
            match SEPARATORS.iter().find(|(pos, _)| *pos == idx) {
                Some((_, expected)) => byte == expected,
                None => byte.is_ascii_digit(),
            }
        });
    if !well_formed {
        return Err(MalformedTimestamp {
            raw: raw.to_string(),
        });
    }
    // All bytes are ASCII here, so slicing at 19 is a char boundary.
    Ok(NormalizedDate(format!("{}Z", &raw[..19])))
}
