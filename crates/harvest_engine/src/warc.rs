use chrono::{DateTime, Utc};
use harvest_core::{normalize, MalformedTimestamp, Provenance, ThreadSnapshot};
use uuid::Uuid;

use crate::digest::payload_digest;

pub const WARC_VERSION: &str = "WARC/1.0";
pub const RESPONSE_CONTENT_TYPE: &str = "application/http; msgtype=response";
pub const INFO_CONTENT_TYPE: &str = "application/warc-fields";
/// Marks the HTTP envelope as synthesized by the harvester rather than captured.
pub const SYNTHESIZED_HEADER: &str = "X-Harvest-Synthesized";

const CRLF: &[u8] = b"\r\n";
const BLOCK_SEPARATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Timestamp(#[from] MalformedTimestamp),
    #[error("failed to serialize thread: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("malformed record at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },
    #[error("{name} must be a single line, got {value:?}")]
    MultiLineField { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Warcinfo,
    Response,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Warcinfo => "warcinfo",
            RecordType::Response => "response",
        }
    }
}

/// One archived unit: named header fields plus a content block.
///
/// `Content-Length` is never stored; it is derived from the block when the
/// record is serialized, so the two cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    headers: Vec<(String, String)>,
    block: Vec<u8>,
}

impl WarcRecord {
    fn new(record_type: RecordType) -> Self {
        Self {
            headers: vec![("WARC-Type".to_string(), record_type.as_str().to_string())],
            block: Vec::new(),
        }
    }

    fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    fn with_block(mut self, block: Vec<u8>) -> Self {
        self.block = block;
        self
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn record_type(&self) -> Option<RecordType> {
        match self.header("WARC-Type")? {
            "warcinfo" => Some(RecordType::Warcinfo),
            "response" => Some(RecordType::Response),
            _ => None,
        }
    }

    pub fn block(&self) -> &[u8] {
        &self.block
    }

    /// For a response record, the bytes after the HTTP envelope's headers.
    pub fn http_payload(&self) -> Option<&[u8]> {
        find(&self.block, BLOCK_SEPARATOR).map(|idx| &self.block[idx + BLOCK_SEPARATOR.len()..])
    }

    /// Appends the framed record, including its trailing blank lines.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(WARC_VERSION.as_bytes());
        out.extend_from_slice(CRLF);
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}").as_bytes());
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(format!("Content-Length: {}", self.block.len()).as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(CRLF);
        out.extend_from_slice(&self.block);
        out.extend_from_slice(BLOCK_SEPARATOR);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.block.len() + 512);
        self.write_to(&mut out);
        out
    }
}

/// Software and operator identity written into each session's info record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcInfo {
    software: String,
    operator: Option<String>,
    locality: String,
}

impl WarcInfo {
    /// Fails if `locality` or `operator` would spill into further fields.
    pub fn new(locality: impl Into<String>, operator: Option<String>) -> Result<Self, RecordError> {
        let locality = locality.into();
        single_line("locality", &locality)?;
        if let Some(operator) = operator.as_deref() {
            single_line("operator", operator)?;
        }
        Ok(Self {
            software: concat!("harvest_engine/", env!("CARGO_PKG_VERSION")).to_string(),
            operator,
            locality,
        })
    }

    pub fn software(&self) -> &str {
        &self.software
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn locality(&self) -> &str {
        &self.locality
    }

    fn to_fields(&self) -> Vec<u8> {
        let mut fields = vec![
            ("software", self.software.as_str()),
            ("format", "WARC File Format 1.0"),
            (
                "conformsTo",
                "http://bibnum.bnf.fr/WARC/WARC_ISO_28500_version1_latestdraft.pdf",
            ),
        ];
        if let Some(operator) = self.operator.as_deref() {
            fields.push(("operator", operator));
        }
        fields.push(("locality", self.locality.as_str()));

        let mut out = Vec::new();
        for (name, value) in fields {
            out.extend_from_slice(format!("{name}: {value}").as_bytes());
            out.extend_from_slice(CRLF);
        }
        out
    }
}

/// Formats a session start time the way record dates are written.
pub fn warc_date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Header and warc-fields values are line based; a CR or LF would start a new field.
fn single_line<'a>(name: &str, value: &'a str) -> Result<&'a str, RecordError> {
    if value.contains(['\r', '\n']) {
        return Err(RecordError::MultiLineField {
            name: name.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

/// The leading record of every session file.
pub fn build_info_record(started: &DateTime<Utc>, info: &WarcInfo) -> WarcRecord {
    WarcRecord::new(RecordType::Warcinfo)
        .with_header("WARC-Date", warc_date(started))
        .with_header("WARC-Record-ID", record_id())
        .with_header("Content-Type", INFO_CONTENT_TYPE)
        .with_block(info.to_fields())
}

/// Frames a fetched thread as a `response` record.
///
/// The thread is serialized with the provenance block injected and a single
/// trailing newline; the payload digest covers exactly those bytes. Nothing is
/// built if the thread's timestamp is malformed or its target URI is not a
/// single line.
pub fn build_response_record(
    snapshot: &ThreadSnapshot,
    provenance: &Provenance,
) -> Result<WarcRecord, RecordError> {
    let date = normalize(snapshot.updated_at().unwrap_or_default())?;
    let target_uri = single_line("WARC-Target-URI", &provenance.share_url)?;

    let mut payload = serde_json::to_vec(&snapshot.with_provenance(provenance))?;
    payload.push(b'\n');
    let digest = payload_digest(&payload);

    let mut block = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\n{SYNTHESIZED_HEADER}: 1\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    block.extend_from_slice(&payload);

    Ok(WarcRecord::new(RecordType::Response)
        .with_header("WARC-Target-URI", target_uri)
        .with_header("WARC-Date", date.as_str())
        .with_header("WARC-Payload-Digest", digest)
        .with_header("WARC-Record-ID", record_id())
        .with_header("Content-Type", RESPONSE_CONTENT_TYPE)
        .with_block(block))
}

/// Splits a container byte stream back into records.
pub fn read_records(bytes: &[u8]) -> Result<Vec<WarcRecord>, RecordError> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        let header_end = find(rest, BLOCK_SEPARATOR)
            .ok_or_else(|| malformed(offset, "unterminated header block"))?;
        let header_text = std::str::from_utf8(&rest[..header_end])
            .map_err(|_| malformed(offset, "header block is not UTF-8"))?;
        let mut lines = header_text.split("\r\n");
        if lines.next() != Some(WARC_VERSION) {
            return Err(malformed(offset, "missing version line"));
        }

        let mut headers = Vec::new();
        let mut content_length = None;
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(offset, "header line without colon"))?;
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| malformed(offset, "bad Content-Length"))?,
                );
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }
        let length = content_length.ok_or_else(|| malformed(offset, "missing Content-Length"))?;

        let block_start = header_end + BLOCK_SEPARATOR.len();
        let (block_end, record_end) = block_start
            .checked_add(length)
            .and_then(|end| Some((end, end.checked_add(BLOCK_SEPARATOR.len())?)))
            .ok_or_else(|| malformed(offset, "bad Content-Length"))?;
        if rest.len() < record_end || &rest[block_end..record_end] != BLOCK_SEPARATOR {
            return Err(malformed(offset, "block is truncated or not followed by a blank line"));
        }

        records.push(WarcRecord {
            headers,
            block: rest[block_start..block_end].to_vec(),
        });
        offset += record_end;
    }
    Ok(records)
}

/// Recomputes a response record's payload digest and compares it with the
/// one in its header. Records without a digest header yield `None`.
pub fn verify_payload_digest(record: &WarcRecord) -> Option<bool> {
    let declared = record.header("WARC-Payload-Digest")?;
    let payload = record.http_payload()?;
    Some(payload_digest(payload) == declared)
}

fn malformed(offset: usize, message: &str) -> RecordError {
    RecordError::Malformed {
        offset,
        message: message.to_string(),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
