use data_encoding::BASE32;
use sha1::{Digest, Sha1};

/// Algorithm label used in `WARC-*-Digest` headers.
pub const DIGEST_ALGORITHM: &str = "sha1";

/// SHA-1 of `bytes`, base32 encoded (RFC 4648, upper case).
pub fn sha1_base32(bytes: &[u8]) -> String {
    BASE32.encode(&Sha1::digest(bytes))
}

/// Digest as embedded in a record header: `sha1:<base32>`.
pub fn payload_digest(bytes: &[u8]) -> String {
    format!("{DIGEST_ALGORITHM}:{}", sha1_base32(bytes))
}
