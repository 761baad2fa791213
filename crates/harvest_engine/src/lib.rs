//! Harvest engine: feed access, archive serialization and effect execution.
mod delegate;
mod digest;
mod engine;
mod feed;
mod filename;
mod pacer;
mod persist;
mod session;
mod types;
mod warc;

pub use delegate::{
    write_url_list, AssetFetchDelegate, CommandDelegate, DelegateError, MediaHandoff,
};
pub use digest::{payload_digest, sha1_base32, DIGEST_ALGORITHM};
pub use engine::{HarvestError, HarvestSettings, Harvester, RunSummary, POST_ID_PLACEHOLDER};
pub use feed::{FeedClient, FeedSettings, HttpFeedClient};
pub use filename::{archive_filename, sanitize_label, session_basename, ARCHIVE_EXTENSION};
pub use pacer::{Pacer, SystemPacer};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use session::ArchiveSession;
pub use types::{FeedError, FeedFailureKind};
pub use warc::{
    build_info_record, build_response_record, read_records, verify_payload_digest, warc_date,
    RecordError, RecordType, WarcInfo, WarcRecord, INFO_CONTENT_TYPE, RESPONSE_CONTENT_TYPE,
    SYNTHESIZED_HEADER, WARC_VERSION,
};
